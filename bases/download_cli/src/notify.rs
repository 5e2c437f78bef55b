// bases/download_cli/src/notify.rs
use media_downloader::{EventSink, TrackEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const NOTIFICATION_ID: &str = "playlist-dl";

/// Posts finished and failed tracks as Android notifications through
/// `termux-notification`
pub struct TermuxNotifier {
    binary: PathBuf,
    titles: HashMap<String, String>,
}

impl TermuxNotifier {
    /// `None` when not running under Termux with the API package installed
    pub fn detect(titles: HashMap<String, String>) -> Option<Self> {
        which::which("termux-notification")
            .ok()
            .map(|binary| Self { binary, titles })
    }

    fn message(&self, event: &TrackEvent) -> Option<(String, String)> {
        let title = |id: &str| self.titles.get(id).cloned().unwrap_or_else(|| id.to_string());
        match event {
            TrackEvent::Done { track_id, tier, .. } => {
                Some(("Downloaded".to_string(), format!("{} ({tier})", title(track_id))))
            }
            TrackEvent::Failed { track_id, kind, .. } => {
                Some(("Download failed".to_string(), format!("{}: {kind}", title(track_id))))
            }
            _ => None,
        }
    }
}

impl EventSink for TermuxNotifier {
    fn notify(&self, event: &TrackEvent) {
        let Some((heading, content)) = self.message(event) else {
            return;
        };

        // Fire and forget; the child is reaped by the runtime
        let spawned = Command::new(&self.binary)
            .args(["--id", NOTIFICATION_ID, "--title", heading.as_str(), "--content", content.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        if let Err(error) = spawned {
            tracing::debug!(%error, "could not post notification");
        }
    }
}
