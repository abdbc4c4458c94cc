//! Error types for Strata.

use thiserror::Error;

/// Result type alias using StrataError.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Errors that can occur in Strata operations.
///
/// A missing key is not an error: lookups report it as `None`.
#[derive(Debug, Error)]
pub enum StrataError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Page store errors
    #[error("Block {block_id} out of range (block count {block_count})")]
    BlockOutOfRange { block_id: u64, block_count: u64 },

    #[error("Block id {0} does not fit in a 4-byte page pointer")]
    PointerOverflow(u64),

    // Structural errors
    #[error("Page corrupted: {block_id}, reason: {reason}")]
    PageCorrupted { block_id: u64, reason: String },

    #[error("Malformed cell at offset {offset}")]
    MalformedCell { offset: usize },

    // Caller errors
    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

impl StrataError {
    /// Shorthand for a corruption error on a given block.
    pub fn corrupted(block_id: u64, reason: impl Into<String>) -> Self {
        StrataError::PageCorrupted {
            block_id,
            reason: reason.into(),
        }
    }

    /// Returns true if this error indicates on-disk structural damage.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StrataError::PageCorrupted { .. } | StrataError::MalformedCell { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: StrataError = io_err.into();
        assert!(matches!(err, StrataError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_block_out_of_range_display() {
        let err = StrataError::BlockOutOfRange {
            block_id: 9,
            block_count: 4,
        };
        assert_eq!(err.to_string(), "Block 9 out of range (block count 4)");
    }

    #[test]
    fn test_page_corrupted_display() {
        let err = StrataError::corrupted(100, "invalid node kind 7");
        assert_eq!(
            err.to_string(),
            "Page corrupted: 100, reason: invalid node kind 7"
        );
        assert!(err.is_corruption());
    }

    #[test]
    fn test_malformed_cell_is_corruption() {
        let err = StrataError::MalformedCell { offset: 4095 };
        assert_eq!(err.to_string(), "Malformed cell at offset 4095");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_value_too_large_display() {
        let err = StrataError::ValueTooLarge {
            size: 5000,
            max: 1000,
        };
        assert_eq!(err.to_string(), "Value too large: 5000 bytes (max 1000)");
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_pointer_overflow_display() {
        let err = StrataError::PointerOverflow(1 << 33);
        assert_eq!(
            err.to_string(),
            "Block id 8589934592 does not fit in a 4-byte page pointer"
        );
    }

    #[test]
    fn test_config_errors_display() {
        let err = StrataError::ConfigError("missing path".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing path");

        let err = StrataError::InvalidParameter {
            name: "cache_blocks".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: cache_blocks = 0");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(StrataError::ConfigError("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StrataError>();
    }
}
