// components/media_downloader/src/rank.rs
use crate::types::SourceCandidate;
use std::cmp::Reverse;
use std::time::Duration;

/// Drop candidates whose duration is off by more than `tolerance`, then
/// order the rest by quality tier (best first) and bitrate (highest first).
/// Candidates that tie keep their input order.
pub fn rank(candidates: Vec<SourceCandidate>, expected: Duration, tolerance: Duration) -> Vec<SourceCandidate> {
    let mut kept: Vec<SourceCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            let deviation = if candidate.duration > expected {
                candidate.duration - expected
            } else {
                expected - candidate.duration
            };
            let keep = deviation <= tolerance;
            if !keep {
                tracing::debug!(
                    candidate = %candidate.id,
                    ?deviation,
                    "rejected candidate with mismatched duration"
                );
            }
            keep
        })
        .collect();

    kept.sort_by_key(|candidate| (candidate.tier(), Reverse(candidate.bitrate)));
    kept
}
