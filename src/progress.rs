use std::sync::Mutex;

use drive_bucket_core::contract::{ProgressObserver, RemoteEntry};
use tracing::info;

/// Logs download progress at every `step` percent boundary.
pub struct LogProgress {
    step: u8,
    last_logged: Mutex<Option<u8>>,
}

impl LogProgress {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.clamp(1, 100),
            last_logged: Mutex::new(None),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressObserver for LogProgress {
    fn file_started(&self, entry: &RemoteEntry) {
        if let Ok(mut last) = self.last_logged.lock() {
            *last = None;
        }
        info!(file = %entry.name, "Download started");
    }

    fn progress(&self, entry: &RemoteEntry, percent: u8) {
        let bucket = percent / self.step;
        let Ok(mut last) = self.last_logged.lock() else {
            return;
        };
        if last.map_or(true, |prev| bucket > prev) {
            *last = Some(bucket);
            info!(file = %entry.name, "Download {}%", percent);
        }
    }

    fn file_finished(&self, entry: &RemoteEntry, bytes: u64) {
        info!(file = %entry.name, bytes, "Download finished");
    }
}
