//! Time source abstraction
//!
//! Every expiry decision reads the current instant through a [`Clock`] so
//! that the validity window can be exercised to the millisecond in tests.

use std::fmt::Debug;
use std::sync::RwLock;

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Source of the current instant
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, frozen until set or advanced
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Create a clock frozen at the given millisecond epoch timestamp
    pub fn at_millis(millis: i64) -> Self {
        let now = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}
