// components/media_downloader/src/ytdlp.rs
use crate::error::DownloadError;
use crate::types::{Bitrate, Locator, SourceCandidate, TrackMetadata, ARTIST_SEPARATOR};
use async_trait::async_trait;
use audio_tags::{AudioCodec, Container};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// What a track is searched by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub artists: Vec<String>,
    pub duration_hint: Duration,
    pub max_results: usize,
}

impl SearchQuery {
    pub fn for_track(track: &TrackMetadata, max_results: usize) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artists.clone(),
            duration_hint: track.expected_duration(),
            max_results,
        }
    }

    pub fn text(&self) -> String {
        if self.artists.is_empty() {
            return self.title.clone();
        }
        format!("{} - {}", self.artists.join(ARTIST_SEPARATOR), self.title)
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn check_available(&self) -> Result<(), DownloadError>;

    /// Candidates for the query, unranked
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceCandidate>, DownloadError>;
}

/// Searches YouTube through `yt-dlp` and lists each result's audio-only streams
pub struct YtDlpSearch;

#[async_trait]
impl SearchProvider for YtDlpSearch {
    async fn check_available(&self) -> Result<(), DownloadError> {
        which::which("yt-dlp")
            .map(|_| ())
            .map_err(|_| DownloadError::DependencyNotFound("yt-dlp"))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceCandidate>, DownloadError> {
        let target = format!("ytsearch{}:{}", query.max_results.max(1), query.text());
        tracing::debug!(%target, "searching");

        let output = Command::new("yt-dlp")
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(&target)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DownloadError::io("run yt-dlp", e))?;

        if !output.status.success() {
            return Err(DownloadError::SearchFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let candidates = parse_search_output(&output.stdout);
        tracing::debug!(query = %query.text(), found = candidates.len(), "search finished");
        Ok(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    filesize: Option<u64>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl YtDlpFormat {
    fn is_audio_only(&self) -> bool {
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");
        let no_video = self.vcodec.as_deref().map_or(true, |c| c == "none");
        has_audio && no_video
    }

    fn is_plain_http(&self) -> bool {
        matches!(self.protocol.as_deref(), Some("http" | "https") | None)
    }
}

/// One JSON document per line; lines that fail to parse are skipped
fn parse_search_output(stdout: &[u8]) -> Vec<SourceCandidate> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable search result");
                None
            }
        })
        .flat_map(candidates_from_entry)
        .collect()
}

fn candidates_from_entry(entry: YtDlpEntry) -> Vec<SourceCandidate> {
    let Some(duration) = entry.duration.filter(|d| d.is_finite() && *d > 0.0) else {
        tracing::debug!(id = %entry.id, "search result without duration");
        return Vec::new();
    };
    let duration = Duration::from_secs_f64(duration);

    entry
        .formats
        .into_iter()
        .filter(|f| f.is_audio_only() && f.is_plain_http())
        .filter_map(|format| {
            let url = Url::parse(format.url.as_deref()?).ok()?;
            let codec = AudioCodec::from_label(format.acodec.as_deref().unwrap_or_default());
            let container = Container::from_extension(format.ext.as_deref().unwrap_or_default());
            let bitrate = if codec.is_lossless() {
                Bitrate::Lossless
            } else {
                format
                    .abr
                    .filter(|abr| abr.is_finite() && *abr > 0.0)
                    .map_or(Bitrate::Unknown, |abr| Bitrate::Kbps(abr.round() as u32))
            };

            Some(SourceCandidate {
                id: format!("{}/{}", entry.id, format.format_id),
                codec,
                container,
                bitrate,
                locator: Locator {
                    url,
                    headers: format.http_headers.into_iter().collect(),
                },
                duration,
                size_hint: format.filesize,
            })
        })
        .collect()
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns canned candidates keyed by track title
    #[derive(Default)]
    pub struct SearchStub {
        results: HashMap<String, Vec<SourceCandidate>>,
        delays: HashMap<String, Duration>,
        queries: Mutex<Vec<SearchQuery>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl SearchStub {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, title: &str, candidates: Vec<SourceCandidate>) -> Self {
            self.results.insert(title.to_string(), candidates);
            self
        }

        pub fn delayed(mut self, title: &str, delay: Duration) -> Self {
            self.delays.insert(title.to_string(), delay);
            self
        }

        pub fn queries(&self) -> Vec<SearchQuery> {
            self.queries.lock().clone()
        }

        /// Most searches observed running at once
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for SearchStub {
        async fn check_available(&self) -> Result<(), DownloadError> {
            Ok(())
        }

        async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceCandidate>, DownloadError> {
            self.queries.lock().push(query.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(&query.title) {
                tokio::time::sleep(*delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.results.get(&query.title) {
                Some(candidates) => Ok(candidates.clone()),
                None => Err(DownloadError::SearchFailed(format!("no results for {}", query.title))),
            }
        }
    }
}
