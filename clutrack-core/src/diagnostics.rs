//! Per-event diagnostics and stage observation.
//!
//! The pipeline never aborts an event for a recoverable condition. Such
//! conditions are collected as [`Diagnostic`] values and also forwarded to a
//! [`PipelineObserver`], which is the hook for debug dumps of intermediate
//! segment and track sets.

use std::fmt;

use crate::error::FitError;
use crate::hit::HitId;
use crate::segment::{Segment, SegmentId};
use crate::track::{FittedTrack, Track};

/// A recoverable condition recorded while reconstructing an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A configured input collection was not present in the event.
    MissingCollection { name: String },
    /// A hit record was rejected before clustering.
    InvalidHit {
        collection: String,
        index: usize,
        reason: String,
    },
    /// Hits of segments that were still contaminated after the last repair
    /// pass; they were released to the unused set.
    UnresolvedContamination { hits: usize },
    /// A segment could not be fitted. Its hits stay claimed.
    FitFailed {
        segment: SegmentId,
        hits: usize,
        error: FitError,
    },
    /// A leftover hit matched a track but is owned by a segment that is not
    /// compatible enough to merge.
    AmbiguousOwnership {
        track_segment: SegmentId,
        owner: SegmentId,
        hit: HitId,
        good_fraction: f64,
    },
    /// A track's best match was one of its own hits.
    SelfMatch {
        segment: SegmentId,
        hit: HitId,
        layer: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCollection { name } => write!(f, "input collection '{name}' not found"),
            Self::InvalidHit {
                collection,
                index,
                reason,
            } => write!(f, "hit {index} of '{collection}' rejected: {reason}"),
            Self::UnresolvedContamination { hits } => {
                write!(f, "{hits} hits left unused after duplicate-layer repair")
            }
            Self::FitFailed {
                segment,
                hits,
                error,
            } => write!(f, "fit of {segment} ({hits} hits) failed: {error}"),
            Self::AmbiguousOwnership {
                track_segment,
                owner,
                hit,
                good_fraction,
            } => write!(
                f,
                "hit {hit} matches {track_segment} but is owned by {owner} \
                 (compatible fraction {good_fraction:.2})"
            ),
            Self::SelfMatch {
                segment,
                hit,
                layer,
            } => write!(
                f,
                "{segment} matched its own hit {hit} on layer {layer}"
            ),
        }
    }
}

/// Points of the pipeline at which intermediate results are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Output of the initial nearest-neighbour clustering.
    InitialClusters,
    /// Segments flagged as contaminated before any repair.
    Contaminated,
    /// Segments produced by a repair pass (0-based).
    RepairPass { pass: usize },
    /// Segments still contaminated after a repair pass.
    StillContaminated { pass: usize },
    /// Segments after rejoining clean pieces.
    Rejoined,
    /// Clean segments handed to the fitter.
    CleanSegments,
    /// First fit of every clean segment.
    SegmentFits,
    /// Segments after leftover-hit reconciliation.
    ReconciledSegments,
    /// Refit of the reconciled segments.
    FinalSegmentTracks,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialClusters => write!(f, "initial-clusters"),
            Self::Contaminated => write!(f, "contaminated"),
            Self::RepairPass { pass } => write!(f, "repair-pass-{pass}"),
            Self::StillContaminated { pass } => write!(f, "still-contaminated-{pass}"),
            Self::Rejoined => write!(f, "rejoined"),
            Self::CleanSegments => write!(f, "clean-segments"),
            Self::SegmentFits => write!(f, "segment-fits"),
            Self::ReconciledSegments => write!(f, "reconciled-segments"),
            Self::FinalSegmentTracks => write!(f, "final-segment-tracks"),
        }
    }
}

/// Receives intermediate results while an event is reconstructed.
///
/// All methods default to doing nothing.
pub trait PipelineObserver {
    /// Called with the segment set at a stage.
    fn on_segments(&mut self, _stage: Stage, _segments: &[&Segment]) {}

    /// Called with the fitted tracks at a stage.
    fn on_tracks(&mut self, _stage: Stage, _tracks: &[FittedTrack]) {}

    /// Called once with the final tracks.
    fn on_merged_tracks(&mut self, _tracks: &[Track]) {}

    /// Called for every diagnostic as it is recorded.
    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Diagnostics of one event, forwarded to an observer as they arrive.
pub struct DiagnosticSink<'a> {
    entries: Vec<Diagnostic>,
    observer: &'a mut dyn PipelineObserver,
}

impl<'a> DiagnosticSink<'a> {
    /// Creates an empty sink forwarding to `observer`.
    pub fn new(observer: &'a mut dyn PipelineObserver) -> Self {
        Self {
            entries: Vec::new(),
            observer,
        }
    }

    /// Records a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("{diagnostic}");
        self.observer.on_diagnostic(&diagnostic);
        self.entries.push(diagnostic);
    }

    /// Reports a segment set to the observer.
    pub fn segments(&mut self, stage: Stage, segments: &[&Segment]) {
        self.observer.on_segments(stage, segments);
    }

    /// Reports a track set to the observer.
    pub fn tracks(&mut self, stage: Stage, tracks: &[FittedTrack]) {
        self.observer.on_tracks(stage, tracks);
    }

    /// Reports the final tracks to the observer.
    pub fn merged_tracks(&mut self, tracks: &[Track]) {
        self.observer.on_merged_tracks(tracks);
    }

    /// Diagnostics recorded so far.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Consumes the sink and returns the recorded diagnostics.
    #[must_use]
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        stages: Vec<Stage>,
        diagnostics: usize,
    }

    impl PipelineObserver for Recorder {
        fn on_segments(&mut self, stage: Stage, _segments: &[&Segment]) {
            self.stages.push(stage);
        }

        fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {
            self.diagnostics += 1;
        }
    }

    #[test]
    fn test_sink_forwards_to_observer() {
        let mut recorder = Recorder::default();
        let mut sink = DiagnosticSink::new(&mut recorder);
        sink.push(Diagnostic::MissingCollection {
            name: "TPCHits".into(),
        });
        sink.segments(Stage::InitialClusters, &[]);
        sink.tracks(Stage::SegmentFits, &[]);
        let entries = sink.into_entries();

        assert_eq!(entries.len(), 1);
        assert_eq!(recorder.diagnostics, 1);
        assert_eq!(recorder.stages, vec![Stage::InitialClusters]);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::SelfMatch {
            segment: SegmentId(3),
            hit: HitId(17),
            layer: 42,
        };
        assert_eq!(d.to_string(), "S3 matched its own hit #17 on layer 42");
        assert_eq!(Stage::RepairPass { pass: 1 }.to_string(), "repair-pass-1");
    }
}
