use std::fmt;

/// Audio codec carried inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Flac,
    Alac,
    Pcm,
    Opus,
    Vorbis,
    Aac,
    Mp3,
    Other,
}

impl AudioCodec {
    /// Map a codec label as reported by yt-dlp/ffprobe (`opus`, `mp4a.40.2`, ...)
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "flac" => Self::Flac,
            "alac" => Self::Alac,
            "opus" => Self::Opus,
            "vorbis" => Self::Vorbis,
            "mp3" | "mp3float" => Self::Mp3,
            "aac" => Self::Aac,
            l if l.starts_with("mp4a.40.34") || l.starts_with("mp4a.6b") => Self::Mp3,
            l if l.starts_with("mp4a") => Self::Aac,
            l if l.starts_with("pcm") || l == "wav" => Self::Pcm,
            _ => Self::Other,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Alac | Self::Pcm)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flac => "flac",
            Self::Alac => "alac",
            Self::Pcm => "pcm",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// File container holding the audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Flac,
    Mp3,
    Mp4,
    Ogg,
    WebM,
    Wav,
    Unknown,
}

impl Container {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "flac" => Self::Flac,
            "mp3" => Self::Mp3,
            "m4a" | "mp4" | "aac" => Self::Mp4,
            "ogg" | "oga" | "opus" => Self::Ogg,
            "webm" | "weba" => Self::WebM,
            "wav" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    /// File extension for a container, refined by the codec where the
    /// container is shared (Ogg holds both Opus and Vorbis)
    pub fn extension_for(&self, codec: AudioCodec) -> &'static str {
        match (self, codec) {
            (Self::Flac, _) => "flac",
            (Self::Mp3, _) => "mp3",
            (Self::Mp4, _) => "m4a",
            (Self::Ogg, AudioCodec::Opus) => "opus",
            (Self::Ogg, _) => "ogg",
            (Self::WebM, _) => "webm",
            (Self::Wav, _) => "wav",
            (Self::Unknown, _) => "bin",
        }
    }

    /// Containers whose native tag format is written directly
    pub fn is_natively_taggable(&self) -> bool {
        matches!(self, Self::Flac | Self::Mp3 | Self::Mp4 | Self::Ogg)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
            Self::Ogg => "ogg",
            Self::WebM => "webm",
            Self::Wav => "wav",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
