use crate::format::{AudioCodec, Container};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("no remux tool available to convert {0}")]
    Unavailable(PathBuf),

    #[error("failed to run ffmpeg")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg failed for {input}: {stderr}")]
    Failed { input: PathBuf, stderr: String },
}

/// How an untaggable file becomes a taggable one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemuxPlan {
    /// Copy the audio stream untouched into a new container
    Copy { target: Container },
    /// Re-encode losslessly; used when the codec has no native taggable container
    ToFlac,
}

impl RemuxPlan {
    /// `None` when the container can be tagged as it is
    pub fn for_audio(container: Container, codec: AudioCodec) -> Option<Self> {
        if container.is_natively_taggable() {
            return None;
        }

        let plan = match codec {
            AudioCodec::Opus | AudioCodec::Vorbis => Self::Copy { target: Container::Ogg },
            AudioCodec::Aac | AudioCodec::Alac => Self::Copy { target: Container::Mp4 },
            AudioCodec::Mp3 => Self::Copy { target: Container::Mp3 },
            AudioCodec::Flac => Self::Copy { target: Container::Flac },
            AudioCodec::Pcm | AudioCodec::Other => Self::ToFlac,
        };
        Some(plan)
    }

    pub fn output_path(&self, input: &Path, codec: AudioCodec) -> PathBuf {
        let extension = match self {
            Self::Copy { target } => target.extension_for(codec),
            Self::ToFlac => "flac",
        };
        input.with_extension(extension)
    }

    pub fn output_container(&self) -> Container {
        match self {
            Self::Copy { target } => *target,
            Self::ToFlac => Container::Flac,
        }
    }
}

#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, input: &Path, output: &Path, plan: RemuxPlan) -> Result<(), RemuxError>;
}

/// Remuxer backed by the `ffmpeg` binary
pub struct FfmpegRemuxer {
    binary: PathBuf,
}

impl FfmpegRemuxer {
    /// Locate `ffmpeg` on `PATH`
    pub fn detect() -> Option<Self> {
        which::which("ffmpeg").ok().map(|binary| Self { binary })
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, input: &Path, output: &Path, plan: RemuxPlan) -> Result<(), RemuxError> {
        let codec_args: &[&str] = match plan {
            RemuxPlan::Copy { .. } => &["-c:a", "copy"],
            RemuxPlan::ToFlac => &["-c:a", "flac"],
        };

        tracing::debug!(input = %input.display(), output = %output.display(), ?plan, "remuxing");

        let result = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-map_metadata", "-1"])
            .args(codec_args)
            .arg(output)
            .output()
            .await
            .map_err(RemuxError::Spawn)?;

        if !result.status.success() {
            // Leave nothing half-written behind
            let _ = tokio::fs::remove_file(output).await;
            return Err(RemuxError::Failed {
                input: input.to_path_buf(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Fallback used when no remux tool is installed
pub struct NoRemuxer;

#[async_trait]
impl Remuxer for NoRemuxer {
    async fn remux(&self, input: &Path, _output: &Path, _plan: RemuxPlan) -> Result<(), RemuxError> {
        Err(RemuxError::Unavailable(input.to_path_buf()))
    }
}
