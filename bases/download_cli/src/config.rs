// bases/download_cli/src/config.rs
use crate::args::CliArgs;
use media_downloader::{extract_playlist_id, DownloadError, DownloaderConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Resolved run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub playlist_id: String,
    pub playlist_dir: PathBuf,
    pub downloader: DownloaderConfig,
    pub verbose: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, DownloadError> {
        let playlist_id = extract_playlist_id(&args.playlist)?;

        let mut downloader = DownloaderConfig::new(&args.output_dir);
        downloader.temp_dir = args.temp_dir;
        downloader.max_concurrent = args.max_concurrent.max(1);
        downloader.duration_tolerance = Duration::from_secs(args.tolerance);
        downloader.retry.max_retries = args.retries;
        downloader.artwork_max_dimension = args.artwork_size.max(1);
        downloader.search_results = args.search_results.max(1);

        Ok(Self {
            playlist_id,
            playlist_dir: args.playlist_dir,
            downloader,
            verbose: args.verbose,
        })
    }
}
