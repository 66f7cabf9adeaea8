//! Download block: one contiguous byte range of the remote resource.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A byte range `[start, end]` (inclusive end) assigned to one worker at a
/// time.
///
/// `start` is the next unread byte and only ever moves forward; it is atomic
/// because the checkpoint exporter and the progress reporter read it while
/// the owning worker advances it. Invariant: `start <= end + 1`, with
/// `start == end + 1` meaning finished.
#[derive(Debug)]
pub struct Block {
    start: AtomicU64,
    end: u64,
    started: AtomicBool,
}

impl Block {
    pub fn new(start: u64, end: u64) -> Self {
        Block {
            start: AtomicU64::new(start),
            end,
            started: AtomicBool::new(false),
        }
    }

    /// Next unread byte.
    pub fn start(&self) -> u64 {
        self.start.load(Ordering::Acquire)
    }

    /// Last byte of the range, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Advance the cursor after `n` bytes were written at the old position.
    pub fn advance(&self, n: u64) {
        self.start.fetch_add(n, Ordering::AcqRel);
    }

    /// Bytes not yet downloaded.
    pub fn uncompleted(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start())
    }

    pub fn is_finished(&self) -> bool {
        self.start() == self.end + 1
    }

    /// Rewind the cursor to zero. Only used when an un-ranged transfer has
    /// to restart from the beginning of the resource.
    pub fn reset(&self) {
        self.start.store(0, Ordering::Release);
    }

    /// Mark as dispatched to a worker. Sticky.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// True when this block covers the entire resource, so a full GET can be
    /// used instead of a ranged one. A zero `total` means the size is
    /// unknown and the block is a stream-to-EOF sentinel.
    pub fn covers_all(&self, total: u64) -> bool {
        self.start() == 0 && (total == 0 || self.end == total - 1)
    }
}
