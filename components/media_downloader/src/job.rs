// components/media_downloader/src/job.rs
use crate::fetch::FetchOutcome;
use crate::types::{SourceCandidate, TrackMetadata};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Fetching,
    Assembling,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Jobs only move forward; any live job may fail
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Fetching) | (Self::Fetching, Self::Assembling) | (Self::Assembling, Self::Done) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move job from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Per-track bookkeeping while the pipeline works on it
#[derive(Debug)]
pub struct DownloadJob {
    track: TrackMetadata,
    status: JobStatus,
    current: Option<SourceCandidate>,
    candidates_tried: usize,
    transfer_attempts: u32,
    bytes_transferred: u64,
}

impl DownloadJob {
    pub fn new(track: TrackMetadata) -> Self {
        Self {
            track,
            status: JobStatus::Pending,
            current: None,
            candidates_tried: 0,
            transfer_attempts: 0,
            bytes_transferred: 0,
        }
    }

    pub fn track(&self) -> &TrackMetadata {
        &self.track
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn current_candidate(&self) -> Option<&SourceCandidate> {
        self.current.as_ref()
    }

    pub fn candidates_tried(&self) -> usize {
        self.candidates_tried
    }

    pub fn transfer_attempts(&self) -> u32 {
        self.transfer_attempts
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Move to `next`, returning the status left behind
    pub fn advance(&mut self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if !self.status.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.status, next))
    }

    pub fn begin_candidate(&mut self, candidate: SourceCandidate) {
        self.candidates_tried += 1;
        self.current = Some(candidate);
    }

    pub fn record_fetch(&mut self, outcome: &FetchOutcome) {
        self.transfer_attempts += outcome.attempts;
        self.bytes_transferred += outcome.bytes_written;
    }
}
