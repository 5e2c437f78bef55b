// components/media_downloader/src/events.rs
use crate::job::JobStatus;
use crate::types::{FailureKind, QualityTier};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Progress reported while tracks move through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    /// A non-terminal status change
    Transition {
        track_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    CandidateStarted {
        track_id: String,
        candidate: String,
        tier: QualityTier,
    },
    CandidateFailed {
        track_id: String,
        candidate: String,
        kind: FailureKind,
        reason: String,
    },
    Done {
        track_id: String,
        path: PathBuf,
        tier: QualityTier,
    },
    Failed {
        track_id: String,
        kind: FailureKind,
        candidates_tried: usize,
    },
}

impl TrackEvent {
    pub fn track_id(&self) -> &str {
        match self {
            Self::Transition { track_id, .. }
            | Self::CandidateStarted { track_id, .. }
            | Self::CandidateFailed { track_id, .. }
            | Self::Done { track_id, .. }
            | Self::Failed { track_id, .. } => track_id,
        }
    }
}

/// Receives pipeline events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &TrackEvent);
}

pub struct NoopSink;

impl EventSink for NoopSink {
    fn notify(&self, _event: &TrackEvent) {}
}

/// Publishes events on a tokio broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<TrackEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<TrackEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn notify(&self, event: &TrackEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards every event to several sinks
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Fanout {
    fn notify(&self, event: &TrackEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
