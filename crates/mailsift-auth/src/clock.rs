//! Injectable time source.

use chrono::{DateTime, Utc};

/// Time source seam so staleness and TTL logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall-clock implementation used outside of tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
