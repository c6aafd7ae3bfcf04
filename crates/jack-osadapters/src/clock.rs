//! The `Clock` capability trait. Kept tiny and swappable so checkpoint
//! retention and backup-file naming are deterministic under test.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// `YYYYMMDD-HHMMSS`, used in config-store backup file names.
    fn backup_stamp(&self) -> String {
        self.now().format("%Y%m%d-%H%M%S").to_string()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
