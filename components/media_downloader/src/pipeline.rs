// components/media_downloader/src/pipeline.rs
use crate::assemble::{AssembleOutcome, Assembler, FetchedAudio};
use crate::config::DownloaderConfig;
use crate::error::FetchError;
use crate::events::{EventSink, TrackEvent};
use crate::fetch::{FetchSettings, Fetcher};
use crate::job::{DownloadJob, JobStatus};
use crate::rank::rank;
use crate::resource::ResourceGate;
use crate::staging::StagingArea;
use crate::transport::{fetch_bytes, Transport};
use crate::types::{DownloadResult, FailureKind, Locator, TrackMetadata};
use crate::ytdlp::{SearchProvider, SearchQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The pipeline's external collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub transport: Arc<dyn Transport>,
    pub gate: Arc<dyn ResourceGate>,
    pub assembler: Arc<dyn Assembler>,
    pub sink: Arc<dyn EventSink>,
}

struct Failure {
    kind: FailureKind,
    reason: String,
}

impl Failure {
    fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }
}

/// Drives one track from search to a tagged file
pub struct TrackPipeline {
    search: Arc<dyn SearchProvider>,
    transport: Arc<dyn Transport>,
    assembler: Arc<dyn Assembler>,
    sink: Arc<dyn EventSink>,
    fetcher: Fetcher,
    staging: StagingArea,
    duration_tolerance: Duration,
    search_results: usize,
    artwork_max_bytes: usize,
    artwork_timeout: Duration,
}

impl TrackPipeline {
    pub fn new(config: &DownloaderConfig, staging: StagingArea, collaborators: Collaborators) -> Self {
        let Collaborators {
            search,
            transport,
            gate,
            assembler,
            sink,
        } = collaborators;

        Self {
            fetcher: Fetcher::new(Arc::clone(&transport), gate, FetchSettings::from(config)),
            search,
            transport,
            assembler,
            sink,
            staging,
            duration_tolerance: config.duration_tolerance,
            search_results: config.search_results,
            artwork_max_bytes: config.artwork_max_bytes,
            artwork_timeout: config.read_timeout,
        }
    }

    pub async fn run(&self, track: TrackMetadata, cancel: &CancellationToken) -> DownloadResult {
        let mut job = DownloadJob::new(track);
        info!(track = %job.track().id, title = %job.track().title, "starting track");

        match self.drive(&mut job, cancel).await {
            Ok(outcome) => {
                self.advance(&mut job, JobStatus::Done);
                let track_id = job.track().id.clone();
                info!(
                    track = %track_id,
                    tier = %outcome.tier,
                    attempts = job.transfer_attempts(),
                    bytes = job.bytes_transferred(),
                    "track done"
                );
                self.sink.notify(&TrackEvent::Done {
                    track_id: track_id.clone(),
                    path: outcome.final_path.clone(),
                    tier: outcome.tier,
                });
                DownloadResult::Downloaded {
                    track_id,
                    path: outcome.final_path,
                    tier: outcome.tier,
                }
            }
            Err(failure) => self.fail(&mut job, failure),
        }
    }

    /// Result for a track that was never started
    pub fn skip_cancelled(&self, track: TrackMetadata) -> DownloadResult {
        let mut job = DownloadJob::new(track);
        self.fail(&mut job, Failure::new(FailureKind::Cancelled, "cancelled before start"))
    }

    async fn drive(&self, job: &mut DownloadJob, cancel: &CancellationToken) -> Result<AssembleOutcome, Failure> {
        let track = job.track().clone();
        if cancel.is_cancelled() {
            return Err(Failure::cancelled());
        }

        let query = SearchQuery::for_track(&track, self.search_results);
        let found = tokio::select! {
            _ = cancel.cancelled() => return Err(Failure::cancelled()),
            found = self.search.search(&query) => found,
        };
        let candidates = found.unwrap_or_else(|error| {
            warn!(track = %track.id, %error, "search failed");
            Vec::new()
        });

        let found_count = candidates.len();
        let ranked = rank(candidates, track.expected_duration(), self.duration_tolerance);
        if ranked.is_empty() {
            return Err(Failure::new(
                FailureKind::NoUsableSource,
                format!("none of {found_count} candidates matched the expected duration"),
            ));
        }
        debug!(track = %track.id, found = found_count, usable = ranked.len(), "candidates ranked");

        self.advance(job, JobStatus::Fetching);
        let job_dir = self
            .staging
            .job_dir(&track.id)
            .map_err(|e| Failure::new(FailureKind::NoUsableSource, e.to_string()))?;

        let mut fetched = None;
        for candidate in ranked {
            if cancel.is_cancelled() {
                return Err(Failure::cancelled());
            }

            let destination = job_dir.path().join(format!("audio.{}", candidate.extension()));
            self.sink.notify(&TrackEvent::CandidateStarted {
                track_id: track.id.clone(),
                candidate: candidate.id.clone(),
                tier: candidate.tier(),
            });
            job.begin_candidate(candidate.clone());

            let reason = match self.fetcher.fetch(&candidate, &destination, cancel).await {
                Ok(outcome) => {
                    job.record_fetch(&outcome);
                    if outcome.completed {
                        fetched = Some(FetchedAudio {
                            path: destination,
                            codec: candidate.codec,
                            container: candidate.container,
                        });
                        break;
                    }
                    outcome.failure.unwrap_or_else(|| "transfer incomplete".to_string())
                }
                Err(FetchError::Cancelled) => return Err(Failure::cancelled()),
                Err(error) => error.to_string(),
            };

            warn!(track = %track.id, candidate = %candidate.id, %reason, "candidate failed, trying next");
            self.sink.notify(&TrackEvent::CandidateFailed {
                track_id: track.id.clone(),
                candidate: candidate.id.clone(),
                kind: FailureKind::TransferFailed,
                reason,
            });
        }

        let audio = fetched.ok_or_else(|| {
            Failure::new(
                FailureKind::NoUsableSource,
                format!("all {} candidates failed to transfer", job.candidates_tried()),
            )
        })?;

        self.advance(job, JobStatus::Assembling);
        let artwork = self.fetch_artwork(&track, cancel).await;
        if cancel.is_cancelled() {
            return Err(Failure::cancelled());
        }

        let outcome = self
            .assembler
            .assemble(audio, &track, artwork)
            .await
            .map_err(|e| Failure::new(FailureKind::AssemblyFailed, e.to_string()))?;

        // Early returns drop the staging dir as well
        drop(job_dir);
        Ok(outcome)
    }

    async fn fetch_artwork(&self, track: &TrackMetadata, cancel: &CancellationToken) -> Option<Vec<u8>> {
        let url = track.artwork_url.as_deref()?;
        let locator = match Locator::parse(url) {
            Ok(locator) => locator,
            Err(error) => {
                warn!(track = %track.id, %error, "ignoring artwork url");
                return None;
            }
        };

        let download = tokio::time::timeout(
            self.artwork_timeout,
            fetch_bytes(self.transport.as_ref(), &locator, self.artwork_max_bytes),
        );
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = download => result,
        };

        match result {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(error)) => {
                warn!(track = %track.id, %error, "artwork download failed");
                None
            }
            Err(_) => {
                warn!(track = %track.id, "artwork download timed out");
                None
            }
        }
    }

    fn fail(&self, job: &mut DownloadJob, failure: Failure) -> DownloadResult {
        self.advance(job, JobStatus::Failed);
        let track_id = job.track().id.clone();
        let candidates_tried = job.candidates_tried();

        let last_candidate = job.current_candidate().map(|c| c.id.as_str()).unwrap_or("none");
        match failure.kind {
            FailureKind::Cancelled => info!(track = %track_id, last_candidate, "track cancelled"),
            kind => warn!(
                track = %track_id,
                %kind,
                candidates_tried,
                last_candidate,
                reason = %failure.reason,
                "track failed"
            ),
        }

        self.sink.notify(&TrackEvent::Failed {
            track_id: track_id.clone(),
            kind: failure.kind,
            candidates_tried,
        });
        DownloadResult::Failed {
            track_id,
            kind: failure.kind,
            candidates_tried,
            reason: failure.reason,
        }
    }

    /// Terminal states are reported by `run`/`fail` with their own events
    fn advance(&self, job: &mut DownloadJob, next: JobStatus) {
        match job.advance(next) {
            Ok(from) if !next.is_terminal() => self.sink.notify(&TrackEvent::Transition {
                track_id: job.track().id.clone(),
                from,
                to: next,
            }),
            Ok(_) => {}
            Err(invalid) => error!(track = %job.track().id, %invalid, "ignored job transition"),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::{Bitrate, SourceCandidate};
    use audio_tags::{AudioCodec, Container};

    pub fn track(id: &str, title: &str, secs: u64) -> TrackMetadata {
        TrackMetadata {
            id: id.to_string(),
            title: title.to_string(),
            artists: vec!["Artist".to_string()],
            album: "Album".to_string(),
            album_artist: None,
            track_number: 1,
            disc_number: None,
            release_date: "2021".to_string(),
            duration_ms: secs * 1000,
            genre: None,
            isrc: None,
            artwork_url: None,
        }
    }

    pub fn candidate(url: &str, codec: AudioCodec, secs: u64) -> SourceCandidate {
        SourceCandidate {
            id: url.rsplit('/').next().unwrap_or(url).to_string(),
            codec,
            container: match codec {
                AudioCodec::Flac => Container::Flac,
                AudioCodec::Mp3 => Container::Mp3,
                AudioCodec::Aac => Container::Mp4,
                _ => Container::WebM,
            },
            bitrate: if codec.is_lossless() {
                Bitrate::Lossless
            } else {
                Bitrate::Kbps(160)
            },
            locator: Locator::parse(url).unwrap(),
            duration: Duration::from_secs(secs),
            size_hint: None,
        }
    }

    pub fn config() -> DownloaderConfig {
        let mut config = DownloaderConfig::new("/unused");
        config.chunk_size = 1024;
        config.throttled_chunk_size = 512;
        config
    }
}
