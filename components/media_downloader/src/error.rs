// components/media_downloader/src/error.rs
use audio_tags::{RemuxError, TagError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Required dependency not found: {0}")]
    DependencyNotFound(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Playlist error: {0}")]
    PlaylistError(String),

    #[error("Could not build HTTP client: {0}")]
    HttpClient(String),

    #[error("IO error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// A failed attempt to move bytes from a source
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Worth retrying: timeouts, dropped connections, 5xx, short bodies
    #[error("transient transfer failure: {0}")]
    Transient(String),

    #[error("transfer failed: {0}")]
    Fatal(String),
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transfer cancelled")]
    Cancelled,

    #[error("IO error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Remux(#[from] RemuxError),

    #[error("tagging failed: {0}")]
    Tagging(#[from] TagError),

    #[error("tags in {path} did not verify: {reason}")]
    Verification { path: PathBuf, reason: String },

    #[error("tagging task failed: {0}")]
    Task(String),

    #[error("IO error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl AssembleError {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}
