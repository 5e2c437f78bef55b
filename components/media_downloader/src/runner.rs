// components/media_downloader/src/runner.rs
use crate::pipeline::TrackPipeline;
use crate::resource::{ResourceGate, ResourcePolicy};
use crate::types::{DownloadResult, FailureKind, QualityTier, TrackMetadata};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counts of outcomes for a finished playlist run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub succeeded: BTreeMap<QualityTier, usize>,
    pub no_usable_source: usize,
    pub assembly_failed: usize,
    pub cancelled: usize,
}

impl PlaylistSummary {
    pub fn from_results(results: &[DownloadResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result {
                DownloadResult::Downloaded { tier, .. } => *summary.succeeded.entry(*tier).or_default() += 1,
                DownloadResult::Failed { kind, .. } => match kind {
                    FailureKind::NoUsableSource | FailureKind::TransferFailed => summary.no_usable_source += 1,
                    FailureKind::AssemblyFailed => summary.assembly_failed += 1,
                    FailureKind::Cancelled => summary.cancelled += 1,
                },
            }
        }
        summary
    }

    pub fn succeeded_total(&self) -> usize {
        self.succeeded.values().sum()
    }

    pub fn failed_total(&self) -> usize {
        self.no_usable_source + self.assembly_failed + self.cancelled
    }
}

/// Counts a running track while held
struct ActiveSlot<'a>(&'a AtomicUsize);

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs a playlist through a [`TrackPipeline`] with bounded concurrency
pub struct PlaylistRunner {
    pipeline: TrackPipeline,
    gate: Arc<dyn ResourceGate>,
    poll_interval: Duration,
}

impl PlaylistRunner {
    pub fn new(pipeline: TrackPipeline, gate: Arc<dyn ResourceGate>, poll_interval: Duration) -> Self {
        Self {
            pipeline,
            gate,
            poll_interval,
        }
    }

    /// One result per track, in input order. Failures never stop the run.
    pub async fn run(
        &self,
        tracks: Vec<TrackMetadata>,
        max_concurrent: usize,
        cancel: &CancellationToken,
    ) -> Vec<DownloadResult> {
        let max_concurrent = max_concurrent.max(1);
        let active = AtomicUsize::new(0);
        info!(tracks = tracks.len(), max_concurrent, "starting playlist");

        let results: Vec<DownloadResult> = stream::iter(tracks)
            .map(|track| self.run_track(track, &active, cancel))
            .buffered(max_concurrent)
            .collect()
            .await;

        let summary = PlaylistSummary::from_results(&results);
        info!(
            succeeded = summary.succeeded_total(),
            no_usable_source = summary.no_usable_source,
            assembly_failed = summary.assembly_failed,
            cancelled = summary.cancelled,
            "playlist finished"
        );
        results
    }

    async fn run_track(&self, track: TrackMetadata, active: &AtomicUsize, cancel: &CancellationToken) -> DownloadResult {
        match self.admit(active, cancel).await {
            Some(_slot) => self.pipeline.run(track, cancel).await,
            None => self.pipeline.skip_cancelled(track),
        }
    }

    /// Wait until the gate lets a new track start. Under THROTTLE only one
    /// track runs at a time. `None` when cancelled first.
    async fn admit<'a>(&self, active: &'a AtomicUsize, cancel: &CancellationToken) -> Option<ActiveSlot<'a>> {
        let mut waiting = false;
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let admitted = match self.gate.assess() {
                ResourcePolicy::Proceed => {
                    active.fetch_add(1, Ordering::SeqCst);
                    true
                }
                ResourcePolicy::Throttle => active.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst).is_ok(),
                ResourcePolicy::Pause => false,
            };
            if admitted {
                return Some(ActiveSlot(active));
            }

            if !waiting {
                debug!("waiting for resources before starting next track");
                waiting = true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::stub::AssemblerStub;
    use crate::events::stub::RecordingSink;
    use crate::pipeline::fixtures::{candidate, config, track};
    use crate::pipeline::Collaborators;
    use crate::resource::stub::GateStub;
    use crate::staging::StagingArea;
    use crate::transport::stub::{Scripted, TransportStub};
    use crate::ytdlp::stub::SearchStub;
    use audio_tags::AudioCodec;
    use tempfile::TempDir;

    struct Harness {
        runner: PlaylistRunner,
        search: Arc<SearchStub>,
        _temp: TempDir,
    }

    async fn harness(search: SearchStub, transport: TransportStub, gate: Arc<dyn ResourceGate>) -> Harness {
        let temp = TempDir::new().unwrap();
        let staging = StagingArea::prepare(temp.path()).await.unwrap();
        let search = Arc::new(search);
        let pipeline = TrackPipeline::new(
            &config(),
            staging,
            Collaborators {
                search: search.clone(),
                transport: Arc::new(transport),
                gate: gate.clone(),
                assembler: Arc::new(AssemblerStub::default()),
                sink: Arc::new(RecordingSink::default()),
            },
        );

        Harness {
            runner: PlaylistRunner::new(pipeline, gate, Duration::from_secs(2)),
            search,
            _temp: temp,
        }
    }

    fn url(n: usize) -> String {
        format!("https://cdn.example/{n}")
    }

    /// Tracks 0..count, where earlier tracks take longer to search
    fn playlist(count: usize) -> (SearchStub, TransportStub, Vec<TrackMetadata>) {
        let mut search = SearchStub::new();
        let mut transport = TransportStub::new();
        let mut tracks = Vec::new();

        for n in 0..count {
            let title = format!("Song {n}");
            search = search
                .with(&title, vec![candidate(&url(n), AudioCodec::Opus, 200)])
                .delayed(&title, Duration::from_millis(((count - n) * 100) as u64));
            transport = transport.script(&url(n), [Scripted::serve(&[n as u8; 64])]);
            tracks.push(track(&format!("t{n}"), &title, 200));
        }
        (search, transport, tracks)
    }

    fn ids(results: &[DownloadResult]) -> Vec<&str> {
        results.iter().map(|r| r.track_id()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_input_order() {
        let (search, transport, tracks) = playlist(4);
        let h = harness(search, transport, Arc::new(GateStub::always(ResourcePolicy::Proceed))).await;

        let results = h.runner.run(tracks, 3, &CancellationToken::new()).await;

        assert_eq!(ids(&results), ["t0", "t1", "t2", "t3"]);
        assert!(results.iter().all(DownloadResult::is_success));
        assert_eq!(h.search.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_halt_playlist() {
        let (search, transport, mut tracks) = playlist(2);
        tracks.insert(1, track("missing", "Nowhere", 200));
        let h = harness(search, transport, Arc::new(GateStub::always(ResourcePolicy::Proceed))).await;

        let results = h.runner.run(tracks, 1, &CancellationToken::new()).await;

        assert_eq!(ids(&results), ["t0", "missing", "t1"]);
        let summary = PlaylistSummary::from_results(&results);
        assert_eq!(summary.succeeded_total(), 2);
        assert_eq!(summary.no_usable_source, 1);
        assert_eq!(summary.succeeded.get(&QualityTier::HighEfficiencyLossy), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_runs_one_track_at_a_time() {
        let (search, transport, tracks) = playlist(3);
        let h = harness(search, transport, Arc::new(GateStub::always(ResourcePolicy::Throttle))).await;

        let results = h.runner.run(tracks, 3, &CancellationToken::new()).await;

        assert!(results.iter().all(DownloadResult::is_success));
        assert_eq!(h.search.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_delays_start() {
        let (search, transport, tracks) = playlist(1);
        let gate = Arc::new(GateStub::new([ResourcePolicy::Pause, ResourcePolicy::Pause], ResourcePolicy::Proceed));
        let h = harness(search, transport, gate.clone()).await;
        let started = tokio::time::Instant::now();

        let results = h.runner.run(tracks, 1, &CancellationToken::new()).await;

        assert!(results[0].is_success());
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_marks_unstarted_tracks() {
        let (search, transport, tracks) = playlist(3);
        let h = harness(search, transport, Arc::new(GateStub::always(ResourcePolicy::Pause))).await;
        let cancel = CancellationToken::new();

        let (results, _) = tokio::join!(h.runner.run(tracks, 2, &cancel), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });

        assert_eq!(ids(&results), ["t0", "t1", "t2"]);
        assert!(results.iter().all(|r| matches!(
            r,
            DownloadResult::Failed { kind: FailureKind::Cancelled, candidates_tried: 0, .. }
        )));
        assert!(h.search.queries().is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            DownloadResult::Downloaded {
                track_id: "a".to_string(),
                path: "/m/a.flac".into(),
                tier: QualityTier::Lossless,
            },
            DownloadResult::Failed {
                track_id: "b".to_string(),
                kind: FailureKind::AssemblyFailed,
                candidates_tried: 1,
                reason: "tagging failed".to_string(),
            },
            DownloadResult::Failed {
                track_id: "c".to_string(),
                kind: FailureKind::Cancelled,
                candidates_tried: 0,
                reason: "cancelled".to_string(),
            },
        ];

        let summary = PlaylistSummary::from_results(&results);
        assert_eq!(summary.succeeded_total(), 1);
        assert_eq!(summary.assembly_failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.failed_total(), 2);
    }
}
