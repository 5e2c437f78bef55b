// components/media_downloader/src/library.rs
use crate::types::TrackMetadata;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_STEM_CHARS: usize = 150;

/// `<primary artist> - <title>`, made safe for every filesystem we target
pub fn file_stem(track: &TrackMetadata) -> String {
    let raw = format!("{} - {}", track.primary_artist(), track.title.trim());
    let sanitized = sanitize_filename::sanitize_with_options(
        raw,
        sanitize_filename::Options {
            windows: true,
            truncate: false,
            replacement: "_",
        },
    );

    let collapsed = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_STEM_CHARS).collect();
    let stem = truncated.trim().trim_end_matches('.').to_string();

    if stem.is_empty() {
        format!("track-{}", sanitize_filename::sanitize(&track.id))
    } else {
        stem
    }
}

/// The destination directory. Hands out unique file names, including to
/// tracks being published concurrently.
pub struct Library {
    root: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

/// A claimed file name, released when dropped
pub struct Reservation<'a> {
    library: &'a Library,
    path: PathBuf,
}

impl Reservation<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.library.reserved.lock().remove(&self.path);
    }
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim `<stem>.<ext>`, or `<stem> (n).<ext>` with the smallest free `n`
    pub fn reserve(&self, stem: &str, extension: &str) -> Reservation<'_> {
        let mut reserved = self.reserved.lock();
        let mut n = 0u32;
        loop {
            let name = if n == 0 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem} ({n}).{extension}")
            };
            let path = self.root.join(name);
            if !reserved.contains(&path) && !path.exists() {
                reserved.insert(path.clone());
                return Reservation { library: self, path };
            }
            n += 1;
        }
    }

    /// Move `staged` to the reserved name. Falls back to copying when the
    /// staging area is on another filesystem.
    pub async fn publish(&self, staged: &Path, reservation: Reservation<'_>) -> io::Result<PathBuf> {
        let target = reservation.path.clone();

        if let Err(rename_error) = tokio::fs::rename(staged, &target).await {
            debug!(%rename_error, staged = %staged.display(), "rename failed, copying instead");

            let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let partial = target.with_file_name(format!(".{file_name}.part"));
            if let Err(e) = tokio::fs::copy(staged, &partial).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
            if let Err(e) = tokio::fs::rename(&partial, &target).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
            let _ = tokio::fs::remove_file(staged).await;
        }

        drop(reservation);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(artists: &[&str], title: &str) -> TrackMetadata {
        TrackMetadata {
            id: "4uLU6hMCjMI75M1A2tKUQC".to_string(),
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: "Album".to_string(),
            album_artist: None,
            track_number: 1,
            disc_number: None,
            release_date: String::new(),
            duration_ms: 1000,
            genre: None,
            isrc: None,
            artwork_url: None,
        }
    }

    #[test]
    fn test_stem_uses_primary_artist() {
        let stem = file_stem(&track(&["Daft Punk", "Pharrell Williams"], "Get Lucky"));
        assert_eq!(stem, "Daft Punk - Get Lucky");
    }

    #[test]
    fn test_stem_strips_unsafe_characters() {
        let stem = file_stem(&track(&["AC/DC"], "What?  Is: \"This\"*"));
        assert!(!stem.contains(['/', '?', ':', '"', '*']));
        assert!(!stem.contains("  "));
        assert!(stem.starts_with("AC_DC - What_"));
    }

    #[test]
    fn test_stem_is_bounded() {
        let long_title = "x".repeat(400);
        assert_eq!(file_stem(&track(&["A"], &long_title)).chars().count(), 150);
    }

    #[test]
    fn test_reserve_skips_taken_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("A - B.flac"), b"existing").unwrap();
        let library = Library::new(dir.path());

        let first = library.reserve("A - B", "flac");
        let second = library.reserve("A - B", "flac");

        assert_eq!(first.path(), dir.path().join("A - B (1).flac"));
        assert_eq!(second.path(), dir.path().join("A - B (2).flac"));

        drop(first);
        assert_eq!(library.reserve("A - B", "flac").path(), dir.path().join("A - B (1).flac"));
    }

    #[tokio::test]
    async fn test_publish_moves_file() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let staged = staging.path().join("audio.flac");
        std::fs::write(&staged, b"audio").unwrap();
        let library = Library::new(root.path());

        let reservation = library.reserve("A - B", "flac");
        let published = library.publish(&staged, reservation).await.unwrap();

        assert_eq!(published, root.path().join("A - B.flac"));
        assert_eq!(std::fs::read(&published).unwrap(), b"audio");
        assert!(!staged.exists());
        assert!(library.reserved.lock().is_empty());
    }
}
