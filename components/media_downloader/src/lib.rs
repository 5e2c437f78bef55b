// components/media_downloader/src/lib.rs
//! Playlist downloading: find audio for each track, fetch the best encoding
//! that matches, tag it and publish it into a music directory.

mod assemble;
mod config;
mod error;
mod events;
mod fetch;
mod job;
mod library;
mod pipeline;
mod playlist;
mod rank;
mod resource;
mod retry;
mod runner;
mod staging;
mod transport;
mod types;
mod ytdlp;

use audio_tags::{FfmpegRemuxer, NoRemuxer, Remuxer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use assemble::{tag_set_for, AssembleOutcome, Assembler, FetchedAudio, MetadataAssembler};
pub use config::DownloaderConfig;
pub use error::{AssembleError, DownloadError, FetchError, TransferError};
pub use events::{BroadcastSink, EventSink, Fanout, NoopSink, TrackEvent};
pub use fetch::{FetchOutcome, FetchSettings, Fetcher};
pub use job::{DownloadJob, InvalidTransition, JobStatus};
pub use library::{file_stem, Library, Reservation};
pub use pipeline::{Collaborators, TrackPipeline};
pub use playlist::{extract_playlist_id, JsonPlaylistSource, MetadataSource, Playlist};
pub use rank::rank;
pub use resource::{
    AlwaysProceed, BatteryState, ResourceGate, ResourceMonitor, ResourcePolicy, ResourceProbe, ResourceSnapshot,
    ResourceThresholds, SystemProbe,
};
pub use retry::RetryPolicy;
pub use runner::{PlaylistRunner, PlaylistSummary};
pub use staging::StagingArea;
pub use transport::{fetch_bytes, HttpTransport, TransferBody, Transport};
pub use types::{
    Bitrate, DownloadResult, FailureKind, Locator, QualityTier, SourceCandidate, TrackMetadata, ARTIST_SEPARATOR,
};
pub use ytdlp::{SearchProvider, SearchQuery, YtDlpSearch};

/// Everything needed to download playlists, wired from one configuration
pub struct MediaDownloader {
    config: DownloaderConfig,
    runner: PlaylistRunner,
    monitor: Option<Arc<ResourceMonitor>>,
}

impl MediaDownloader {
    /// Wire the system collaborators: yt-dlp search, HTTP transport, the
    /// device resource monitor and ffmpeg when it is installed
    pub async fn new(config: DownloaderConfig, sink: Arc<dyn EventSink>) -> Result<Self, DownloadError> {
        let search = Arc::new(YtDlpSearch);
        search.check_available().await?;

        let remuxer: Arc<dyn Remuxer> = match FfmpegRemuxer::detect() {
            Some(ffmpeg) => Arc::new(ffmpeg),
            None => {
                tracing::warn!("ffmpeg not found, sources that need remuxing will fail to assemble");
                Arc::new(NoRemuxer)
            }
        };

        let probe = SystemProbe::detect().watching([config.destination_dir.clone(), config.temp_dir()]);
        let monitor = Arc::new(ResourceMonitor::new(Arc::new(probe), config.thresholds));
        monitor.refresh().await;

        let library = Arc::new(Library::new(&config.destination_dir));
        let collaborators = Collaborators {
            search,
            transport: Arc::new(HttpTransport::new(config.read_timeout)?),
            gate: monitor.clone(),
            assembler: Arc::new(MetadataAssembler::new(library, remuxer, config.artwork_max_dimension)),
            sink,
        };

        let mut downloader = Self::with_collaborators(config, collaborators).await?;
        downloader.monitor = Some(monitor);
        Ok(downloader)
    }

    /// Wire caller-supplied collaborators
    pub async fn with_collaborators(
        config: DownloaderConfig,
        collaborators: Collaborators,
    ) -> Result<Self, DownloadError> {
        tokio::fs::create_dir_all(&config.destination_dir)
            .await
            .map_err(|e| DownloadError::io(format!("create {}", config.destination_dir.display()), e))?;

        let staging = StagingArea::prepare(config.temp_dir()).await?;
        staging.sweep_stale(config.stale_after).await?;

        let gate = Arc::clone(&collaborators.gate);
        let pipeline = TrackPipeline::new(&config, staging, collaborators);
        let runner = PlaylistRunner::new(pipeline, gate, config.poll_interval);

        Ok(Self {
            config,
            runner,
            monitor: None,
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Download `tracks` in order. Resource sampling runs for the duration
    /// of the call.
    pub async fn download(&self, tracks: Vec<TrackMetadata>, cancel: &CancellationToken) -> Vec<DownloadResult> {
        let sampler_stop = cancel.child_token();
        let sampler = self
            .monitor
            .as_ref()
            .map(|monitor| monitor.spawn_sampler(self.config.sample_interval, sampler_stop.clone()));

        let results = self.runner.run(tracks, self.config.max_concurrent, cancel).await;

        sampler_stop.cancel();
        if let Some(handle) = sampler {
            let _ = handle.await;
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assemble::stub::AssemblerStub;
    use audio_tags::AudioCodec;
    use pipeline::fixtures::{candidate, track};
    use std::fs;
    use tempfile::TempDir;
    use transport::stub::{Scripted, TransportStub};
    use ytdlp::stub::SearchStub;

    fn collaborators(search: SearchStub, transport: TransportStub) -> Collaborators {
        Collaborators {
            search: Arc::new(search),
            transport: Arc::new(transport),
            gate: Arc::new(AlwaysProceed),
            assembler: Arc::new(AssemblerStub::default()),
            sink: Arc::new(NoopSink),
        }
    }

    #[tokio::test]
    async fn test_downloader_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config = DownloaderConfig::new(temp_dir.path().join("music"));

        let downloader =
            MediaDownloader::with_collaborators(config, collaborators(SearchStub::new(), TransportStub::new())).await;

        assert!(
            downloader.is_ok(),
            "Downloader creation failed with error: {:?}",
            downloader.err()
        );

        let temp_path = temp_dir.path().join("music").join("temp");
        match fs::metadata(&temp_path) {
            Ok(_) => (),
            Err(e) => panic!("Temp directory '{}' was not created: {}", temp_path.display(), e),
        }
    }

    #[tokio::test]
    async fn test_download() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DownloaderConfig::new(temp_dir.path());
        config.max_concurrent = 2;
        let url = "https://cdn.example/a";
        let search = SearchStub::new().with("Test Song", vec![candidate(url, AudioCodec::Flac, 180)]);
        let transport = TransportStub::new().script(url, [Scripted::serve(&[0u8; 256])]);

        let downloader = MediaDownloader::with_collaborators(config, collaborators(search, transport))
            .await
            .unwrap();
        let results = downloader
            .download(
                vec![track("t1", "Test Song", 181), track("t2", "Other Song", 181)],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
    }
}
