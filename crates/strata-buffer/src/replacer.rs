//! Block replacement policies for the cache.

use crate::frame::FrameId;
use parking_lot::Mutex;

/// Trait for block replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction and stops tracking it.
    ///
    /// Returns None if no frames are tracked.
    fn evict(&self) -> Option<FrameId>;

    /// Removes a frame from the replacer.
    fn remove(&self, frame_id: FrameId);

    /// Returns the number of tracked frames.
    fn size(&self) -> usize;
}

/// Sentinel for "no neighbour" in the recency list.
const NIL: usize = usize::MAX;

/// Least-recently-used replacement.
///
/// Frames form a doubly linked recency list threaded through a slot array
/// indexed by frame id, so every operation is O(1):
///
/// ```text
///   head (most recent) <-> ... <-> tail (least recent, next victim)
/// ```
pub struct LruReplacer {
    /// Internal state protected by mutex.
    inner: Mutex<LruInner>,
}

#[derive(Clone, Copy)]
struct Slot {
    prev: usize,
    next: usize,
    linked: bool,
}

struct LruInner {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
    len: usize,
}

impl LruInner {
    fn unlink(&mut self, idx: usize) {
        let Slot { prev, next, .. } = self.slots[idx];
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx] = Slot {
            prev: NIL,
            next: NIL,
            linked: false,
        };
        self.len -= 1;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx] = Slot {
            prev: NIL,
            next: self.head,
            linked: true,
        };
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
        self.len += 1;
    }
}

impl LruReplacer {
    /// Creates a new LRU replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                slots: vec![
                    Slot {
                        prev: NIL,
                        next: NIL,
                        linked: false,
                    };
                    num_frames
                ],
                head: NIL,
                tail: NIL,
                len: 0,
            }),
        }
    }

    /// Returns the total capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl Replacer for LruReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let idx = frame_id.index();
        if idx >= inner.slots.len() {
            return;
        }
        if inner.slots[idx].linked {
            if inner.head == idx {
                return;
            }
            inner.unlink(idx);
        }
        inner.push_front(idx);
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.tail == NIL {
            return None;
        }
        let victim = inner.tail;
        inner.unlink(victim);
        Some(FrameId(victim as u32))
    }

    fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let idx = frame_id.index();
        if idx < inner.slots.len() && inner.slots[idx].linked {
            inner.unlink(idx);
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_new() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_evict_empty() {
        let replacer = LruReplacer::new(10);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lru_replacer_evict_single() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(5));
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.evict(), Some(FrameId(5)));
        assert_eq!(replacer.size(), 0);
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lru_replacer_evicts_in_access_order() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        replacer.record_access(FrameId(2));

        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
    }

    #[test]
    fn test_lru_replacer_access_refreshes() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        replacer.record_access(FrameId(2));

        // Frame 0 becomes most recent
        replacer.record_access(FrameId(0));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lru_replacer_access_head_is_noop() {
        let replacer = LruReplacer::new(4);

        replacer.record_access(FrameId(1));
        replacer.record_access(FrameId(2));
        replacer.record_access(FrameId(2));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(FrameId(1)));
    }

    #[test]
    fn test_lru_replacer_remove() {
        let replacer = LruReplacer::new(10);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        replacer.record_access(FrameId(2));

        replacer.remove(FrameId(1));
        assert_eq!(replacer.size(), 2);

        // Removing an untracked frame is a no-op
        replacer.remove(FrameId(1));
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
    }

    #[test]
    fn test_lru_replacer_out_of_range_ignored() {
        let replacer = LruReplacer::new(2);
        replacer.record_access(FrameId(5));
        replacer.remove(FrameId(5));
        assert_eq!(replacer.size(), 0);
    }
}
