// components/media_downloader/src/staging.rs
use crate::error::DownloadError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, info};

const JOB_PREFIX: &str = "job-";
/// Entries this crate creates in the staging root; nothing else is swept
const OWNED_PREFIXES: [&str; 2] = [JOB_PREFIX, ".fetch-"];

/// Scratch space for in-progress jobs. Each job gets its own directory that
/// is removed when the job ends, however it ends.
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub async fn prepare(root: impl AsRef<Path>) -> Result<Self, DownloadError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| DownloadError::io(format!("create staging directory {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, track_id: &str) -> Result<TempDir, DownloadError> {
        let label: String = track_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(32)
            .collect();

        tempfile::Builder::new()
            .prefix(&format!("{JOB_PREFIX}{label}-"))
            .tempdir_in(&self.root)
            .map_err(|e| DownloadError::io("create job directory", e))
    }

    /// Remove job directories and partial files from earlier runs that were
    /// last touched more than `max_age` ago. Other entries are never touched.
    /// Returns how many entries were removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize, DownloadError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| DownloadError::io("read staging directory", e))?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DownloadError::io("read staging directory", e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !OWNED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            let path = entry.path();
            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), ?age, "removed stale staging entry");
                    removed += 1;
                }
                Err(e) => debug!(path = %path.display(), error = %e, "could not remove stale staging entry"),
            }
        }

        if removed > 0 {
            info!(removed, "cleaned up stale staging entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_dirs_are_unique_and_cleaned() {
        let root = tempfile::TempDir::new().unwrap();
        let staging = StagingArea::prepare(root.path().join("temp")).await.unwrap();

        let first = staging.job_dir("spotify:track:abc").unwrap();
        let second = staging.job_dir("spotify:track:abc").unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(staging.root()));

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_old_entries() {
        let root = tempfile::TempDir::new().unwrap();
        let staging = StagingArea::prepare(root.path()).await.unwrap();
        std::fs::create_dir(root.path().join("job-old")).unwrap();
        std::fs::write(root.path().join("job-old/audio.webm"), b"partial").unwrap();
        std::fs::write(root.path().join(".fetch-x.part"), b"partial").unwrap();

        // Everything is younger than a day
        assert_eq!(staging.sweep_stale(Duration::from_secs(24 * 3600)).await.unwrap(), 0);
        assert_eq!(staging.sweep_stale(Duration::ZERO).await.unwrap(), 2);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_leaves_foreign_entries() {
        let root = tempfile::TempDir::new().unwrap();
        let staging = StagingArea::prepare(root.path()).await.unwrap();
        std::fs::create_dir(root.path().join("job-old")).unwrap();
        std::fs::create_dir(root.path().join("photos")).unwrap();
        std::fs::write(root.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(staging.sweep_stale(Duration::ZERO).await.unwrap(), 1);
        assert!(root.path().join("photos").is_dir());
        assert_eq!(std::fs::read(root.path().join("notes.txt")).unwrap(), b"keep me");
    }
}
