use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Source of "now" for everything time-sensitive in the core.
///
/// Reconciliation windows, checkpoint timestamps and first-fill times all go
/// through this seam so that backtests and tests can pin time while live
/// deployments use the system clock.
pub trait Clock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The default for live deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and offline runs.
///
/// `advance`/`set` are independent of readers; a poisoned lock is treated as
/// a bug in the test harness and panics.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.write().unwrap();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}
