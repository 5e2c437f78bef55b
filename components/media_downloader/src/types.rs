// components/media_downloader/src/types.rs
use audio_tags::{AudioCodec, Container};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Separator used when several artists are written into one tag
pub const ARTIST_SEPARATOR: &str = ", ";

const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Descriptive facts about one track, as reported by the metadata source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    /// Ordered, primary artist first
    pub artists: Vec<String>,
    pub album: String,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: Option<u32>,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    #[serde(default)]
    pub release_date: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

impl TrackMetadata {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn joined_artists(&self) -> String {
        if self.artists.is_empty() {
            return UNKNOWN_ARTIST.to_string();
        }
        self.artists.join(ARTIST_SEPARATOR)
    }

    pub fn expected_duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Coarse quality class of a codec. Lower tiers are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    Lossless,
    HighEfficiencyLossy,
    AdvancedLossy,
    StandardLossy,
    Unknown,
}

impl QualityTier {
    pub fn of(codec: AudioCodec) -> Self {
        match codec {
            AudioCodec::Flac | AudioCodec::Alac | AudioCodec::Pcm => Self::Lossless,
            AudioCodec::Opus => Self::HighEfficiencyLossy,
            AudioCodec::Aac | AudioCodec::Vorbis => Self::AdvancedLossy,
            AudioCodec::Mp3 => Self::StandardLossy,
            AudioCodec::Other => Self::Unknown,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Lossless => "lossless",
            Self::HighEfficiencyLossy => "high-efficiency lossy",
            Self::AdvancedLossy => "advanced lossy",
            Self::StandardLossy => "standard lossy",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Bitrate of a candidate. Ordered from worst to best, so `Lossless` sorts
/// above any nominal bitrate and an unknown bitrate below all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bitrate {
    Unknown,
    Kbps(u32),
    Lossless,
}

/// Where a candidate's bytes can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub url: Url,
    /// Extra request headers the source requires
    pub headers: Vec<(String, String)>,
}

impl Locator {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn parse(url: &str) -> Result<Self, crate::DownloadError> {
        Url::parse(url)
            .map(Self::new)
            .map_err(|e| crate::DownloadError::InvalidUrl(format!("{url}: {e}")))
    }
}

/// One concrete audio stream that could be fetched for a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub id: String,
    pub codec: AudioCodec,
    pub container: Container,
    pub bitrate: Bitrate,
    pub locator: Locator,
    pub duration: Duration,
    pub size_hint: Option<u64>,
}

impl SourceCandidate {
    pub fn tier(&self) -> QualityTier {
        QualityTier::of(self.codec)
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension_for(self.codec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoUsableSource,
    /// Reported per candidate; at track level it folds into `NoUsableSource`
    TransferFailed,
    AssemblyFailed,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoUsableSource => "no usable source",
            Self::TransferFailed => "transfer failed",
            Self::AssemblyFailed => "assembly failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Final outcome for one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Downloaded {
        track_id: String,
        path: PathBuf,
        tier: QualityTier,
    },
    Failed {
        track_id: String,
        kind: FailureKind,
        candidates_tried: usize,
        reason: String,
    },
}

impl DownloadResult {
    pub fn track_id(&self) -> &str {
        match self {
            Self::Downloaded { track_id, .. } | Self::Failed { track_id, .. } => track_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn track(artists: &[&str]) -> TrackMetadata {
        TrackMetadata {
            id: "t1".to_string(),
            title: "Song".to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: "Album".to_string(),
            album_artist: None,
            track_number: 1,
            disc_number: None,
            release_date: "2020".to_string(),
            duration_ms: 200_000,
            genre: None,
            isrc: None,
            artwork_url: None,
        }
    }

    #[test]
    fn test_artist_helpers() {
        let t = track(&["Daft Punk", "Pharrell Williams"]);
        assert_eq!(t.primary_artist(), "Daft Punk");
        assert_eq!(t.joined_artists(), "Daft Punk, Pharrell Williams");

        let nobody = track(&[]);
        assert_eq!(nobody.primary_artist(), "Unknown Artist");
        assert_eq!(nobody.joined_artists(), "Unknown Artist");
    }

    #[rstest]
    #[case(AudioCodec::Flac, QualityTier::Lossless)]
    #[case(AudioCodec::Alac, QualityTier::Lossless)]
    #[case(AudioCodec::Opus, QualityTier::HighEfficiencyLossy)]
    #[case(AudioCodec::Aac, QualityTier::AdvancedLossy)]
    #[case(AudioCodec::Mp3, QualityTier::StandardLossy)]
    #[case(AudioCodec::Other, QualityTier::Unknown)]
    fn test_tier_of_codec(#[case] codec: AudioCodec, #[case] expected: QualityTier) {
        assert_eq!(QualityTier::of(codec), expected);
    }

    #[test]
    fn test_orderings() {
        assert!(QualityTier::Lossless < QualityTier::HighEfficiencyLossy);
        assert!(QualityTier::StandardLossy < QualityTier::Unknown);
        assert!(Bitrate::Lossless > Bitrate::Kbps(320));
        assert!(Bitrate::Kbps(256) > Bitrate::Kbps(128));
        assert!(Bitrate::Kbps(1) > Bitrate::Unknown);
    }

    #[test]
    fn test_metadata_from_json() {
        let json = r#"{"id":"x","title":"T","artists":["A"],"album":"B","duration_ms":1000}"#;
        let parsed: TrackMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.expected_duration(), Duration::from_secs(1));
        assert_eq!(parsed.track_number, 0);
        assert_eq!(parsed.artwork_url, None);
    }
}
