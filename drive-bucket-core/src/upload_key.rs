//! Timestamped object keys: `<prefix><YYYYmmddHHMMSS><micros>.zip`.
//!
//! Timestamps are rendered in one fixed UTC offset, so lexicographic key order equals
//! chronological order. A generator never hands out the same timestamp twice: when the
//! clock has not moved past the previous key it advances by one microsecond.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";
const ARCHIVE_SUFFIX: &str = ".zip";

/// Source of wall-clock time, injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A generated object-storage key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UploadKey(String);

impl UploadKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UploadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render the key for one instant.
pub fn format_key(prefix: &str, at: DateTime<Utc>, offset: FixedOffset) -> UploadKey {
    let stamp = at.with_timezone(&offset).format(TIMESTAMP_FORMAT);
    UploadKey(format!("{prefix}{stamp}{ARCHIVE_SUFFIX}"))
}

/// Hands out strictly increasing keys for one run.
pub struct UploadKeyGenerator {
    prefix: String,
    offset: FixedOffset,
    clock: Clock,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl UploadKeyGenerator {
    /// Generator on the system clock. Offsets outside +-24h fall back to UTC.
    pub fn new(prefix: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self::with_clock(prefix, utc_offset_minutes, Arc::new(Utc::now))
    }

    pub fn with_clock(prefix: impl Into<String>, utc_offset_minutes: i32, clock: Clock) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(utc_offset_minutes, "Invalid UTC offset for upload keys, using UTC");
                Utc.fix()
            });
        Self {
            prefix: prefix.into(),
            offset,
            clock,
            last: Mutex::new(None),
        }
    }

    pub fn next_key(&self) -> UploadKey {
        let now = (self.clock)();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let at = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(at);
        format_key(&self.prefix, at, self.offset)
    }
}

impl fmt::Debug for UploadKeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadKeyGenerator")
            .field("prefix", &self.prefix)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
