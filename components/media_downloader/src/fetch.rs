// components/media_downloader/src/fetch.rs
//! Moves one candidate's bytes to disk.
//!
//! Bytes land in a partial file next to the destination and are moved into
//! place only once the transfer is complete, so the destination is either
//! absent or whole. Interrupted transfers resume from the bytes already on
//! disk when the source honours ranged requests, and restart otherwise.

use crate::config::DownloaderConfig;
use crate::error::{FetchError, TransferError};
use crate::resource::{ResourceGate, ResourcePolicy};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::types::SourceCandidate;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub retry: RetryPolicy,
    pub chunk_size: usize,
    pub throttled_chunk_size: usize,
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub max_pause: Option<Duration>,
}

impl From<&DownloaderConfig> for FetchSettings {
    fn from(config: &DownloaderConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            chunk_size: config.chunk_size,
            throttled_chunk_size: config.throttled_chunk_size,
            poll_interval: config.poll_interval,
            read_timeout: config.read_timeout,
            max_pause: config.max_pause,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes_written: u64,
    /// Hex SHA-256 of the published file; only set when `completed`
    pub sha256: Option<String>,
    pub completed: bool,
    pub attempts: u32,
    /// Why the candidate was given up on
    pub failure: Option<String>,
}

enum Interrupt {
    Cancelled,
    Transfer(TransferError),
}

impl From<TransferError> for Interrupt {
    fn from(error: TransferError) -> Self {
        Self::Transfer(error)
    }
}

struct PartialFile {
    file: File,
    written: u64,
    hasher: Sha256,
}

impl PartialFile {
    async fn append(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| TransferError::Fatal(format!("writing partial file: {e}")))?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn truncate(&mut self) -> Result<(), TransferError> {
        let local = |e: std::io::Error| TransferError::Fatal(format!("truncating partial file: {e}"));
        self.file.set_len(0).await.map_err(local)?;
        self.file.seek(SeekFrom::Start(0)).await.map_err(local)?;
        self.hasher = Sha256::new();
        self.written = 0;
        Ok(())
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    gate: Arc<dyn ResourceGate>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, gate: Arc<dyn ResourceGate>, settings: FetchSettings) -> Self {
        Self {
            transport,
            gate,
            settings,
        }
    }

    /// Fetch `candidate` to `destination`.
    ///
    /// Exhausting the retry budget or hitting a fatal error is not an `Err`:
    /// the outcome comes back with `completed == false` and the destination
    /// untouched. `Err` is reserved for cancellation and local setup failures.
    pub async fn fetch(
        &self,
        candidate: &SourceCandidate,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Removed on drop unless persisted
        let partial_path = tempfile::Builder::new()
            .prefix(".fetch-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| FetchError::io("create partial file", e))?
            .into_temp_path();
        let file = OpenOptions::new()
            .write(true)
            .open(&partial_path)
            .await
            .map_err(|e| FetchError::io("open partial file", e))?;

        let mut partial = PartialFile {
            file,
            written: 0,
            hasher: Sha256::new(),
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let error = match self.transfer_once(candidate, &mut partial, cancel).await {
                Ok(()) => break,
                Err(Interrupt::Cancelled) => {
                    debug!(candidate = %candidate.id, written = partial.written, "transfer cancelled");
                    return Err(FetchError::Cancelled);
                }
                Err(Interrupt::Transfer(error)) => error,
            };

            let retries_done = attempts - 1;
            if !error.is_transient() || !self.settings.retry.allows_retry(retries_done) {
                warn!(candidate = %candidate.id, attempts, %error, "giving up on candidate");
                return Ok(FetchOutcome {
                    bytes_written: partial.written,
                    sha256: None,
                    completed: false,
                    attempts,
                    failure: Some(error.to_string()),
                });
            }

            let delay = self.settings.retry.delay_for(attempts);
            warn!(
                candidate = %candidate.id,
                attempt = attempts,
                offset = partial.written,
                ?delay,
                %error,
                "transfer failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let PartialFile {
            mut file,
            written,
            hasher,
        } = partial;
        file.flush().await.map_err(|e| FetchError::io("flush partial file", e))?;
        file.sync_all().await.map_err(|e| FetchError::io("sync partial file", e))?;
        drop(file);

        partial_path
            .persist(destination)
            .map_err(|e| FetchError::io("move partial file into place", e.error))?;

        let sha256 = hex::encode(hasher.finalize());
        info!(candidate = %candidate.id, bytes = written, attempts, "transfer complete");

        Ok(FetchOutcome {
            bytes_written: written,
            sha256: Some(sha256),
            completed: true,
            attempts,
            failure: None,
        })
    }

    async fn transfer_once(
        &self,
        candidate: &SourceCandidate,
        partial: &mut PartialFile,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        let offset = partial.written;
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            opened = self.transport.open(&candidate.locator, offset) => opened?,
        };

        if body.start_offset != offset {
            if body.start_offset != 0 {
                return Err(TransferError::Fatal(format!(
                    "asked for offset {offset}, source answered from {}",
                    body.start_offset
                ))
                .into());
            }
            debug!(candidate = %candidate.id, offset, "source ignored range request, restarting");
            partial.truncate().await?;
        }

        // Chunked responses announce no size; yt-dlp's exact size stands in
        let expected = body.total_len.or(candidate.size_hint);
        let mut reader = body.reader;
        let mut buffer = vec![0u8; self.settings.chunk_size.max(self.settings.throttled_chunk_size).max(1)];

        loop {
            let chunk = self.wait_for_capacity(candidate, cancel).await?;
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                read = tokio::time::timeout(self.settings.read_timeout, reader.read(&mut buffer[..chunk])) => read,
            };

            let n = match read {
                Err(_) => {
                    return Err(TransferError::Transient(format!(
                        "no data for {:?}",
                        self.settings.read_timeout
                    ))
                    .into())
                }
                Ok(Err(e)) => return Err(TransferError::Transient(e.to_string()).into()),
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
            };
            partial.append(&buffer[..n]).await?;
        }

        match expected {
            Some(total) if partial.written < total => Err(TransferError::Transient(format!(
                "body ended at {} of {total} bytes",
                partial.written
            ))
            .into()),
            Some(total) if partial.written > total => Err(TransferError::Fatal(format!(
                "received {} bytes, source announced {total}",
                partial.written
            ))
            .into()),
            _ => Ok(()),
        }
    }

    /// Block while the gate says pause; returns the chunk size to use next
    async fn wait_for_capacity(&self, candidate: &SourceCandidate, cancel: &CancellationToken) -> Result<usize, Interrupt> {
        let mut paused_at: Option<Instant> = None;

        loop {
            let chunk = match self.gate.assess() {
                ResourcePolicy::Proceed => self.settings.chunk_size,
                ResourcePolicy::Throttle => self.settings.throttled_chunk_size,
                ResourcePolicy::Pause => {
                    let since = *paused_at.get_or_insert_with(|| {
                        info!(candidate = %candidate.id, "resources low, pausing transfer");
                        Instant::now()
                    });
                    if let Some(limit) = self.settings.max_pause {
                        if since.elapsed() >= limit {
                            return Err(TransferError::Fatal(format!("paused for longer than {limit:?}")).into());
                        }
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                    continue;
                }
            };

            if paused_at.is_some() {
                info!(candidate = %candidate.id, "resuming transfer");
            }
            return Ok(chunk.max(1));
        }
    }
}
