//! Time source for modification timestamps.
//!
//! Shifted rows have their timestamp column bumped to the transaction time.
//! The transaction time is read once from a [`Clock`] when the transaction
//! begins, so production code uses [`SystemClock`] while tests can swap in a
//! [`FixedClock`] and assert exact values.
//!
//! # Example
//!
//! ```
//! use positioning::{Clock, FixedClock};
//!
//! let clock = FixedClock::new(1000);
//! assert_eq!(clock.now_millis(), 1000);
//! clock.advance(5);
//! assert_eq!(clock.now_millis(), 1005);
//! ```

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A time provider for transaction timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> i64;

    /// Returns the current time as an RFC3339-formatted string.
    fn now_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.now_millis())
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
    }
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually driven clock.
///
/// Unlike the system clock it never moves on its own; call [`advance`](Self::advance)
/// or [`set`](Self::set) between operations to produce distinct timestamps.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    /// Create a clock frozen at `millis`.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: i64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the clock to a specific time in milliseconds.
    pub fn set(&self, ms: i64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}
