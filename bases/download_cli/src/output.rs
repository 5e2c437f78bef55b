// bases/download_cli/src/output.rs
use media_downloader::{DownloadResult, FailureKind, JobStatus, PlaylistSummary, TrackEvent};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct OutputHandler {
    verbose: bool,
    titles: Arc<HashMap<String, String>>,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            titles: Arc::new(HashMap::new()),
        }
    }

    /// Track titles used when printing events, keyed by track id
    pub fn with_titles(mut self, titles: HashMap<String, String>) -> Self {
        self.titles = Arc::new(titles);
        self
    }

    fn title<'a>(&'a self, track_id: &'a str) -> &'a str {
        self.titles.get(track_id).map(String::as_str).unwrap_or(track_id)
    }

    pub fn print_playlist_start(&self, name: &str, tracks: usize, destination: &std::path::Path) {
        println!("Downloading {tracks} tracks from '{name}' to {}", destination.display());
    }

    pub fn format_event(&self, event: &TrackEvent) -> Option<String> {
        match event {
            TrackEvent::Transition {
                track_id,
                to: JobStatus::Fetching,
                ..
            } => Some(format!("[fetch]  {}", self.title(track_id))),
            TrackEvent::Transition {
                track_id,
                to: JobStatus::Assembling,
                ..
            } => Some(format!("[tag]    {}", self.title(track_id))),
            TrackEvent::Transition { .. } => None,
            TrackEvent::CandidateStarted {
                track_id,
                candidate,
                tier,
            } if self.verbose => Some(format!("         {} <- {candidate} ({tier})", self.title(track_id))),
            TrackEvent::CandidateFailed {
                track_id,
                candidate,
                reason,
                ..
            } if self.verbose => Some(format!("         {} x {candidate}: {reason}", self.title(track_id))),
            TrackEvent::CandidateStarted { .. } | TrackEvent::CandidateFailed { .. } => None,
            TrackEvent::Done { track_id, path, tier } => Some(format!(
                "[done]   {} ({tier}) -> {}",
                self.title(track_id),
                path.display()
            )),
            TrackEvent::Failed { track_id, kind, .. } => {
                Some(format!("[failed] {}: {kind}", self.title(track_id)))
            }
        }
    }

    pub fn print_event(&self, event: &TrackEvent) {
        if let Some(line) = self.format_event(event) {
            println!("{line}");
        }
    }

    pub fn print_summary(&self, results: &[DownloadResult], summary: &PlaylistSummary) {
        println!();
        println!(
            "Finished: {} downloaded, {} failed",
            summary.succeeded_total(),
            summary.failed_total()
        );
        for (tier, count) in &summary.succeeded {
            println!("  {count} at {tier}");
        }

        let groups = [
            (FailureKind::NoUsableSource, "Skipped, no acceptable source"),
            (FailureKind::AssemblyFailed, "Fetched but tagging failed"),
            (FailureKind::Cancelled, "Cancelled"),
        ];
        for (group, heading) in groups {
            let failed: Vec<_> = results
                .iter()
                .filter_map(|result| match result {
                    DownloadResult::Failed {
                        track_id, kind, reason, ..
                    } if *kind == group
                        || (group == FailureKind::NoUsableSource && *kind == FailureKind::TransferFailed) =>
                    {
                        Some((track_id, reason))
                    }
                    _ => None,
                })
                .collect();
            if failed.is_empty() {
                continue;
            }

            println!("{heading}:");
            for (track_id, reason) in failed {
                if self.verbose {
                    println!("  - {} ({reason})", self.title(track_id));
                } else {
                    println!("  - {}", self.title(track_id));
                }
            }
        }
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        eprintln!("Error: {}", error);

        if self.verbose {
            eprintln!("\nError details:");
            error.chain().skip(1).for_each(|cause| {
                eprintln!("  caused by: {}", cause);
            });
        }
    }
}
