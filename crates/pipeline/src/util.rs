//! Rate-limited warning utility
//!
//! Buffer saturation and sink write failures can occur thousands of times
//! per second; this limits the resulting log output to one message per
//! interval, with a count of suppressed occurrences.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default minimum interval between messages
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Rate-limited logger for high-frequency failure paths
#[derive(Debug)]
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a rate-limited logger with the given minimum interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    fn should_log(&self) -> Option<u64> {
        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                *last = Some(now);
                Some(self.suppressed.swap(0, Ordering::Relaxed))
            }
        }
    }

    /// Emit a warning, unless one was emitted within the interval
    ///
    /// Returns true if the message was logged, false if suppressed.
    pub fn warn(&self, message: &str) -> bool {
        match self.should_log() {
            Some(suppressed) => {
                tracing::warn!(suppressed_count = suppressed, "{message}");
                true
            }
            None => false,
        }
    }

    /// Emit an error with its cause, unless one was emitted within the interval
    pub fn error(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        match self.should_log() {
            Some(suppressed) => {
                tracing::error!(error = %error, suppressed_count = suppressed, "{message}");
                true
            }
            None => false,
        }
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
