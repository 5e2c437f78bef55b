// components/media_downloader/src/assemble.rs
use crate::error::AssembleError;
use crate::library::{file_stem, Library};
use crate::types::{QualityTier, TrackMetadata};
use async_trait::async_trait;
use audio_tags::{prepare_artwork, read_tags, write_tags, AudioCodec, Container, RemuxPlan, Remuxer, TagSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A completely fetched audio file waiting for tags
#[derive(Debug, Clone)]
pub struct FetchedAudio {
    pub path: PathBuf,
    pub codec: AudioCodec,
    pub container: Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOutcome {
    pub final_path: PathBuf,
    pub tier: QualityTier,
    pub artwork_embedded: bool,
}

#[async_trait]
pub trait Assembler: Send + Sync {
    /// Turn fetched audio into a tagged file in the library
    async fn assemble(
        &self,
        audio: FetchedAudio,
        track: &TrackMetadata,
        artwork: Option<Vec<u8>>,
    ) -> Result<AssembleOutcome, AssembleError>;
}

/// The tags written for `track`. Same metadata in, same tags out.
pub fn tag_set_for(track: &TrackMetadata) -> TagSet {
    let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());

    TagSet {
        title: track.title.clone(),
        artist: track.joined_artists(),
        album: track.album.clone(),
        album_artist: track.album_artist.as_deref().and_then(non_empty),
        track_number: Some(track.track_number).filter(|n| *n > 0),
        disc_number: track.disc_number.filter(|n| *n > 0),
        date: non_empty(&track.release_date),
        genre: track.genre.as_deref().and_then(non_empty),
        isrc: track.isrc.as_deref().and_then(non_empty),
        comment: Some(format!("Source track: {}", track.id)),
    }
}

/// Remuxes when needed, embeds tags and artwork, then publishes to the library
pub struct MetadataAssembler {
    library: Arc<Library>,
    remuxer: Arc<dyn Remuxer>,
    artwork_max_dimension: u32,
}

impl MetadataAssembler {
    pub fn new(library: Arc<Library>, remuxer: Arc<dyn Remuxer>, artwork_max_dimension: u32) -> Self {
        Self {
            library,
            remuxer,
            artwork_max_dimension,
        }
    }
}

#[async_trait]
impl Assembler for MetadataAssembler {
    async fn assemble(
        &self,
        audio: FetchedAudio,
        track: &TrackMetadata,
        artwork: Option<Vec<u8>>,
    ) -> Result<AssembleOutcome, AssembleError> {
        let tier = QualityTier::of(audio.codec);

        let (path, container) = match RemuxPlan::for_audio(audio.container, audio.codec) {
            None => (audio.path, audio.container),
            Some(plan) => {
                let output = plan.output_path(&audio.path, audio.codec);
                info!(track = %track.id, from = %audio.container, ?plan, "remuxing before tagging");
                self.remuxer.remux(&audio.path, &output, plan).await?;
                let _ = tokio::fs::remove_file(&audio.path).await;
                (output, plan.output_container())
            }
        };

        let tags = tag_set_for(track);
        let max_dimension = self.artwork_max_dimension;
        let tagged = path.clone();
        let track_id = track.id.clone();

        let artwork_embedded = tokio::task::spawn_blocking(move || {
            let cover = artwork.and_then(|bytes| match prepare_artwork(&bytes, max_dimension) {
                Ok(cover) => Some(cover),
                Err(error) => {
                    warn!(track = %track_id, %error, "skipping artwork");
                    None
                }
            });
            tag_and_verify(&tagged, &tags, cover.as_deref(), &track_id)
        })
        .await
        .map_err(|e| AssembleError::Task(e.to_string()))??;

        let reservation = self.library.reserve(&file_stem(track), container.extension_for(audio.codec));
        let final_path = self
            .library
            .publish(&path, reservation)
            .await
            .map_err(|e| AssembleError::io("publish to library", e))?;

        info!(track = %track.id, path = %final_path.display(), %tier, "track ready");
        Ok(AssembleOutcome {
            final_path,
            tier,
            artwork_embedded,
        })
    }
}

/// Write tags, retrying without the cover if the cover is what failed, then
/// read them back and check the audio stream is still there. Returns whether
/// a cover was embedded.
fn tag_and_verify(path: &Path, tags: &TagSet, cover: Option<&[u8]>, track_id: &str) -> Result<bool, AssembleError> {
    let embedded = match write_tags(path, tags, cover) {
        Ok(()) => cover.is_some(),
        Err(error) if cover.is_some() => {
            warn!(track = %track_id, %error, "tagging with artwork failed, retrying without");
            write_tags(path, tags, None)?;
            false
        }
        Err(error) => return Err(error.into()),
    };

    let written = read_tags(path)?;
    if written.duration.is_zero() {
        return Err(AssembleError::Verification {
            path: path.to_path_buf(),
            reason: "no audio left in the file after tagging".to_string(),
        });
    }
    if written.tags.title != tags.title || written.tags.artist != tags.artist {
        return Err(AssembleError::Verification {
            path: path.to_path_buf(),
            reason: format!(
                "expected '{} / {}', found '{} / {}'",
                tags.artist, tags.title, written.tags.artist, written.tags.title
            ),
        });
    }

    Ok(embedded)
}
