//! Audio container knowledge and tag writing.
//!
//! Tags are written with lofty into each container's native tag format,
//! artwork is normalised with `image`, and containers lofty cannot tag are
//! handed to a [`Remuxer`] first.

mod artwork;
mod flac;
mod format;
mod remux;
mod tags;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

use lofty::LoftyError;
use std::path::PathBuf;
use thiserror::Error;

pub use artwork::{prepare_artwork, ArtworkError};
pub use format::{AudioCodec, Container};
pub use remux::{FfmpegRemuxer, NoRemuxer, RemuxError, RemuxPlan, Remuxer};
pub use tags::{read_tags, tag_fields, write_tags, EmbeddedTags, TagSet};

#[derive(Error, Debug)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lofty error: {0}")]
    Lofty(#[from] LoftyError),

    #[error("No tag found in {0}")]
    NotFound(PathBuf),
}
