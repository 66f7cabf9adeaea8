//! Token-bucket rate limiting shared by all workers of a job.

use crate::cancel::CancelToken;
use crate::error::{DownloadError, Result};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Floor for a configured rate: one copy-buffer per second. Anything lower
/// would stall every read of the 32 KiB scratch buffer.
pub const MIN_RATE: u64 = 32 * 1024;

/// Longest single sleep while waiting for tokens, so cancellation is
/// observed within bounded time.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Classic token bucket: `rate` tokens (bytes) per second, burst equal to
/// one second of rate.
#[derive(Debug)]
pub struct TokenBucket {
    rate: u64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled: Instant,
}

impl TokenBucket {
    pub fn new(rate: u64) -> Self {
        let rate = rate.max(1);
        TokenBucket {
            rate,
            burst: rate as f64,
            state: Mutex::new(BucketState {
                tokens: rate as f64,
                refilled: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Take `n` tokens, sleeping in short slices until they accrue or the
    /// token is cancelled. Requests above the burst are clamped to it.
    pub fn wait_n(&self, n: u64, cancel: &CancelToken) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let need = (n as f64).min(self.burst);
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.refilled).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate as f64).min(self.burst);
                state.refilled = now;
                if state.tokens >= need {
                    state.tokens -= need;
                    return Ok(());
                }
                Duration::from_secs_f64((need - state.tokens) / self.rate as f64)
            };
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            std::thread::sleep(wait.min(WAIT_SLICE));
        }
    }
}

/// Hot-swappable limiter cell shared across a job's workers.
///
/// `set()` replaces the bucket; every later `wait_n` sees the new rate.
/// Workers clone the bucket handle out of the lock, so a swap never blocks
/// behind an in-progress wait.
#[derive(Debug, Default)]
pub struct SpeedLimiter {
    bucket: RwLock<Option<Arc<TokenBucket>>>,
}

impl SpeedLimiter {
    pub fn new(rate: u64) -> Self {
        let limiter = SpeedLimiter::default();
        limiter.set(rate);
        limiter
    }

    /// Install a new rate; zero disables limiting. Rates below [`MIN_RATE`]
    /// are raised to it.
    pub fn set(&self, rate: u64) {
        let bucket = if rate == 0 {
            None
        } else {
            Some(Arc::new(TokenBucket::new(rate.max(MIN_RATE))))
        };
        *self.bucket.write().unwrap() = bucket;
    }

    pub fn is_limited(&self) -> bool {
        self.bucket.read().unwrap().is_some()
    }

    /// Current rate in bytes per second; zero when unlimited.
    pub fn rate(&self) -> u64 {
        self.bucket
            .read()
            .unwrap()
            .as_ref()
            .map(|b| b.rate())
            .unwrap_or(0)
    }

    pub fn wait_n(&self, n: u64, cancel: &CancelToken) -> Result<()> {
        let bucket = self.bucket.read().unwrap().clone();
        match bucket {
            Some(b) => b.wait_n(n, cancel),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new(Duration::ZERO)
    }

    #[test]
    fn burst_is_immediately_available() {
        let bucket = TokenBucket::new(MIN_RATE);
        let started = Instant::now();
        bucket.wait_n(MIN_RATE, &token()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn drained_bucket_paces_refill() {
        let bucket = TokenBucket::new(MIN_RATE);
        bucket.wait_n(MIN_RATE, &token()).unwrap();
        let started = Instant::now();
        bucket.wait_n(MIN_RATE / 4, &token()).unwrap();
        // a quarter of the burst takes roughly a quarter second to accrue
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn cancellation_unblocks_wait() {
        let bucket = Arc::new(TokenBucket::new(MIN_RATE));
        bucket.wait_n(MIN_RATE, &token()).unwrap();
        let cancel = Arc::new(CancelToken::new(Duration::ZERO));
        let c = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            c.cancel();
        });
        let started = Instant::now();
        let err = bucket.wait_n(MIN_RATE, &cancel).unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn limiter_floor_and_disable() {
        let limiter = SpeedLimiter::new(1);
        assert_eq!(limiter.rate(), MIN_RATE);
        limiter.set(0);
        assert!(!limiter.is_limited());
        // unlimited waits return at once
        limiter.wait_n(u64::MAX, &token()).unwrap();
    }

    #[test]
    fn swap_takes_effect_for_later_waits() {
        let limiter = SpeedLimiter::new(MIN_RATE);
        assert!(limiter.is_limited());
        limiter.set(4 * MIN_RATE);
        assert_eq!(limiter.rate(), 4 * MIN_RATE);
    }
}
