// components/media_downloader/src/config.rs
use crate::resource::ResourceThresholds;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const KIB: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Where finished tracks are published
    pub destination_dir: PathBuf,
    /// Per-job staging directories live here. Defaults to `temp` under
    /// the destination, see [`DownloaderConfig::temp_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Maximum |candidate duration - expected duration|
    pub duration_tolerance: Duration,
    pub retry: RetryPolicy,
    pub chunk_size: usize,
    /// Chunk size while resources are low
    pub throttled_chunk_size: usize,
    /// How often a paused transfer re-checks resources
    pub poll_interval: Duration,
    /// A transfer with no data for this long counts as a transient failure
    pub read_timeout: Duration,
    /// Give up on a candidate after pausing this long. `None` waits forever.
    pub max_pause: Option<Duration>,
    pub max_concurrent: usize,
    pub artwork_max_dimension: u32,
    pub artwork_max_bytes: usize,
    /// Candidates requested from the search provider per track
    pub search_results: usize,
    pub thresholds: ResourceThresholds,
    pub sample_interval: Duration,
    /// Staging leftovers older than this are removed at startup
    pub stale_after: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self::new("downloads")
    }
}

impl DownloaderConfig {
    pub fn new(destination_dir: impl AsRef<Path>) -> Self {
        let destination_dir = destination_dir.as_ref().to_path_buf();
        Self {
            destination_dir,
            temp_dir: None,
            duration_tolerance: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            chunk_size: 512 * KIB,
            throttled_chunk_size: 256 * KIB,
            poll_interval: Duration::from_secs(2),
            read_timeout: Duration::from_secs(30),
            max_pause: None,
            max_concurrent: 1,
            artwork_max_dimension: 800,
            artwork_max_bytes: 10 * KIB * KIB,
            search_results: 3,
            thresholds: ResourceThresholds::default(),
            sample_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.destination_dir.join("temp"))
    }
}
