//! Strata common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Strata components.

pub mod block;
pub mod config;
pub mod error;

pub use block::{Block, BlockId, NodeKind, BLOCK_SIZE, INVALID_BLOCK};
pub use config::{IndexKind, StoreConfig};
pub use error::{Result, StrataError};
