//! Content fetcher: streams one remote file into an async sink chunk by chunk.
//!
//! Nothing is buffered beyond a single chunk, so arbitrarily large files can be staged
//! to disk.

use std::path::Path;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::contract::{ProgressObserver, RemoteEntry, RemoteStore, Session};
use crate::error::FetchError;

/// Turns byte counts into whole percentages that only ever increase.
#[derive(Debug)]
pub struct ProgressMeter {
    total: Option<u64>,
    received: u64,
    last_reported: Option<u8>,
}

impl ProgressMeter {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total,
            received: 0,
            last_reported: None,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Record `bytes` more and return the new percentage if it advanced.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.received = self.received.saturating_add(bytes);
        match self.total {
            Some(total) if total > 0 => {
                // u128 keeps `received * 100` exact for any u64 total.
                let percent =
                    (u128::from(self.received.min(total)) * 100 / u128::from(total)) as u8;
                self.report(percent)
            }
            _ => None,
        }
    }

    /// Mark the transfer complete; yields 100 unless it was already reported.
    pub fn finish(&mut self) -> Option<u8> {
        self.report(100)
    }

    fn report(&mut self, percent: u8) -> Option<u8> {
        if self.last_reported.map_or(true, |last| percent > last) {
            self.last_reported = Some(percent);
            Some(percent)
        } else {
            None
        }
    }
}

/// Download `entry` into `sink`, reporting progress to `observer`.
///
/// `sink_path` only labels I/O errors. Returns the number of bytes written.
pub async fn fetch_file<S, W>(
    store: &S,
    session: &Session,
    entry: &RemoteEntry,
    sink: &mut W,
    sink_path: &Path,
    observer: &dyn ProgressObserver,
) -> Result<u64, FetchError>
where
    S: RemoteStore + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let mut media = store.open_media(session, entry).await?;
    let total = media.total_size.or(entry.size);
    let mut meter = ProgressMeter::new(total);
    observer.file_started(entry);
    debug!(file = %entry.name, file_id = %entry.id, total_size = ?total, "Fetching file");

    while let Some(chunk) = media.chunks.next().await {
        let chunk = chunk.map_err(|e| {
            error!(file = %entry.name, received = meter.received(), error = %e, "Chunk transfer failed");
            e
        })?;
        sink.write_all(&chunk).await.map_err(|source| FetchError::Io {
            path: sink_path.to_path_buf(),
            source,
        })?;
        if let Some(percent) = meter.advance(chunk.len() as u64) {
            observer.progress(entry, percent);
        }
    }

    sink.flush().await.map_err(|source| FetchError::Io {
        path: sink_path.to_path_buf(),
        source,
    })?;

    if let Some(expected) = total {
        if meter.received() < expected {
            return Err(FetchError::Truncated {
                file_id: entry.id.clone(),
                received: meter.received(),
                expected,
            });
        }
    }

    if let Some(percent) = meter.finish() {
        observer.progress(entry, percent);
    }
    observer.file_finished(entry, meter.received());
    Ok(meter.received())
}
