// components/media_downloader/src/playlist.rs
use crate::error::DownloadError;
use crate::types::TrackMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const PLAYLIST_ID_LEN: usize = 22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub tracks: Vec<TrackMetadata>,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// The playlist's tracks, in playlist order
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, DownloadError>;
}

/// Reads exported playlists stored as `<dir>/<playlist id>.json`
pub struct JsonPlaylistSource {
    dir: PathBuf,
}

impl JsonPlaylistSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dunce::simplified(dir.as_ref()).to_path_buf(),
        }
    }
}

#[async_trait]
impl MetadataSource for JsonPlaylistSource {
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, DownloadError> {
        let path = self.dir.join(format!("{playlist_id}.json"));
        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| DownloadError::io(format!("read playlist {}", path.display()), e))?;

        let mut playlist: Playlist = serde_json::from_slice(&contents)
            .map_err(|e| DownloadError::PlaylistError(format!("{}: {e}", path.display())))?;

        let before = playlist.tracks.len();
        playlist.tracks.retain(|t| !t.title.trim().is_empty() && t.duration_ms > 0);
        if playlist.tracks.len() < before {
            tracing::warn!(
                playlist = %playlist_id,
                skipped = before - playlist.tracks.len(),
                "skipping tracks without title or duration"
            );
        }

        tracing::info!(playlist = %playlist_id, name = %playlist.name, tracks = playlist.tracks.len(), "playlist loaded");
        Ok(playlist)
    }
}

/// Accepts `https://open.spotify.com/playlist/<id>?...`, `spotify:playlist:<id>`
/// or a bare id
pub fn extract_playlist_id(input: &str) -> Result<String, DownloadError> {
    let input = input.trim();
    let invalid = || DownloadError::PlaylistError(format!("not a playlist link or id: {input}"));

    let candidate = if let Some(rest) = input.strip_prefix("spotify:playlist:") {
        rest.to_string()
    } else if input.contains("://") {
        let url = Url::parse(input).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        let mut segments = url.path_segments().ok_or_else(invalid)?;
        segments
            .by_ref()
            .find(|segment| *segment == "playlist")
            .ok_or_else(invalid)?;
        segments.next().ok_or_else(invalid)?.to_string()
    } else {
        input.to_string()
    };

    let valid = candidate.len() == PLAYLIST_ID_LEN && candidate.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(candidate)
    } else {
        Err(invalid())
    }
}
