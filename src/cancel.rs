//! Cancellation token shared by one run of a job.
//!
//! Carries both the user-requested abort flag and the job's wall-clock
//! deadline; everything that can block (body reads, limiter waits, channel
//! ops) polls the same token so `close()` unblocks the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CancelToken {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// New token, optionally bounded by `timeout` (zero means unbounded).
    pub fn new(timeout: Duration) -> Self {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        CancelToken {
            cancelled: AtomicBool::new(false),
            deadline,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.deadline_exceeded()
    }

    /// True when the wall-clock deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        match self.deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }

    /// Time left until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
