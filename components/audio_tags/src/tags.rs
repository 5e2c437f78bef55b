use crate::flac::ensure_padding;
use crate::TagError;
use lofty::{Accessor, AudioFile, ItemKey, Picture, PictureType, Probe, Tag, TagExt, TaggedFileExt};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

/// The full set of text tags written for one track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub title: String,
    /// All artists, already joined into one display string
    pub artist: String,
    pub album: String,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// Release date as given by the source (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`)
    pub date: Option<String>,
    pub genre: Option<String>,
    pub isrc: Option<String>,
    pub comment: Option<String>,
}

/// Tags as read back from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub tags: TagSet,
    pub picture_count: usize,
    /// Length of the audio stream as the container reports it
    pub duration: Duration,
}

/// Replace every tag in `path` with a single tag of the container's primary
/// tag type built from `tags`, optionally carrying one front cover.
///
/// Existing tags of all types are removed first, so writing the same input
/// twice produces the same tag block.
pub fn write_tags(path: impl AsRef<Path>, tags: &TagSet, cover: Option<&[u8]>) -> Result<(), TagError> {
    let path = path.as_ref();
    ensure_padding(path)?;
    let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;
    let tag_type = tagged_file.primary_tag_type();

    let existing: Vec<_> = tagged_file.tags().iter().map(|t| t.tag_type()).collect();
    drop(tagged_file);
    for existing_type in existing {
        existing_type.remove_from_path(path)?;
    }

    let mut tag = Tag::new(tag_type);
    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());

    if let Some(track) = tags.track_number {
        tag.set_track(track);
    }
    if let Some(disc) = tags.disc_number {
        tag.set_disk(disc);
    }
    if let Some(album_artist) = &tags.album_artist {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
    }
    if let Some(date) = &tags.date {
        tag.insert_text(ItemKey::RecordingDate, date.clone());
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(isrc) = &tags.isrc {
        tag.insert_text(ItemKey::Isrc, isrc.clone());
    }
    if let Some(comment) = &tags.comment {
        tag.set_comment(comment.clone());
    }

    if let Some(bytes) = cover {
        let mut picture = Picture::from_reader(&mut Cursor::new(bytes))?;
        picture.set_pic_type(PictureType::CoverFront);
        tag.push_picture(picture);
    }

    tag.save_to_path(path)?;
    tracing::debug!(path = %path.display(), ?tag_type, "wrote tags");
    Ok(())
}

pub fn read_tags(path: impl AsRef<Path>) -> Result<EmbeddedTags, TagError> {
    let path = path.as_ref();
    let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .ok_or_else(|| TagError::NotFound(path.to_path_buf()))?;

    let tags = TagSet {
        title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
        artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
        album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
        album_artist: tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()),
        track_number: tag.track(),
        disc_number: tag.disk(),
        date: tag.get_string(&ItemKey::RecordingDate).map(|s| s.to_string()),
        genre: tag.genre().map(|s| s.to_string()),
        isrc: tag.get_string(&ItemKey::Isrc).map(|s| s.to_string()),
        comment: tag.comment().map(|s| s.to_string()),
    };

    Ok(EmbeddedTags {
        tags,
        picture_count: tag.picture_count() as usize,
        duration: tagged_file.properties().duration(),
    })
}

/// Every tag item in the file keyed by `<tag type>.<item key>`, in stable order
pub fn tag_fields(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>, TagError> {
    let tagged_file = Probe::open(path.as_ref())?.guess_file_type()?.read()?;
    let mut all_fields = BTreeMap::new();

    for tag in tagged_file.tags() {
        let tag_type = format!("{:?}", tag.tag_type());

        for (index, item) in tag.items().enumerate() {
            let key = format!("{}.{:?}#{}", tag_type, item.key(), index);
            let value = item.value().text().unwrap_or("(binary data)").to_string();
            all_fields.insert(key, value);
        }

        for (index, picture) in tag.pictures().iter().enumerate() {
            all_fields.insert(
                format!("{}.picture_{}", tag_type, index),
                format!("{:?}, {} bytes", picture.pic_type(), picture.data().len()),
            );
        }
    }

    Ok(all_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cover_jpeg, empty_flac, flac_frames, minimal_flac, unpadded_flac};
    use tempfile::TempDir;

    fn sample_tags() -> TagSet {
        TagSet {
            title: "Windowlicker".to_string(),
            artist: "Aphex Twin".to_string(),
            album: "Windowlicker".to_string(),
            album_artist: Some("Aphex Twin".to_string()),
            track_number: Some(1),
            disc_number: Some(1),
            date: Some("1999-03-22".to_string()),
            genre: Some("IDM".to_string()),
            isrc: Some("GBBPW9900001".to_string()),
            comment: None,
        }
    }

    fn flac_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("track.flac");
        std::fs::write(&path, minimal_flac()).unwrap();
        path
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = flac_file(&dir);

        write_tags(&path, &sample_tags(), None).unwrap();
        let embedded = read_tags(&path).unwrap();

        assert_eq!(embedded.tags.title, "Windowlicker");
        assert_eq!(embedded.tags.artist, "Aphex Twin");
        assert_eq!(embedded.tags.track_number, Some(1));
        assert_eq!(embedded.tags.genre.as_deref(), Some("IDM"));
        assert_eq!(embedded.picture_count, 0);
        assert_eq!(embedded.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_rewrite_does_not_accumulate() {
        let dir = TempDir::new().unwrap();
        let path = flac_file(&dir);
        let cover = cover_jpeg();

        write_tags(&path, &sample_tags(), Some(&cover)).unwrap();
        let first = tag_fields(&path).unwrap();

        write_tags(&path, &sample_tags(), Some(&cover)).unwrap();
        let second = tag_fields(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(read_tags(&path).unwrap().picture_count, 1);
    }

    #[test]
    fn test_rewrite_replaces_old_values() {
        let dir = TempDir::new().unwrap();
        let path = flac_file(&dir);

        let mut tags = sample_tags();
        write_tags(&path, &tags, None).unwrap();

        tags.genre = None;
        tags.title = "Flim".to_string();
        write_tags(&path, &tags, None).unwrap();

        let embedded = read_tags(&path).unwrap();
        assert_eq!(embedded.tags.title, "Flim");
        assert_eq!(embedded.tags.genre, None);
    }

    #[test]
    fn test_unpadded_flac_keeps_audio_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.flac");
        std::fs::write(&path, unpadded_flac()).unwrap();

        write_tags(&path, &sample_tags(), Some(&cover_jpeg())).unwrap();
        let first = std::fs::read(&path).unwrap();
        assert!(first.ends_with(&flac_frames()));

        write_tags(&path, &sample_tags(), Some(&cover_jpeg())).unwrap();
        assert!(std::fs::read(&path).unwrap().ends_with(&flac_frames()));

        let embedded = read_tags(&path).unwrap();
        assert_eq!(embedded.tags.title, "Windowlicker");
        assert_eq!(embedded.picture_count, 1);
        assert_eq!(embedded.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_reports_empty_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.flac");
        std::fs::write(&path, empty_flac()).unwrap();

        write_tags(&path, &sample_tags(), None).unwrap();
        assert_eq!(read_tags(&path).unwrap().duration, Duration::ZERO);
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_tags("/definitely/not/here.flac");
        assert!(result.is_err());
    }
}
