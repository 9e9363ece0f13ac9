//! clutrack-core: Core types and traits for cluster-based track reconstruction.
//!
//! This crate provides the hit and segment model, the ownership registry,
//! the detector-geometry and track-fitter seams, and the configuration and
//! diagnostics shared by the reconstruction stages.
//!

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod fit;
pub mod geometry;
pub mod hit;
pub mod segment;
pub mod statistics;
pub mod track;

pub use config::{
    Chi2Cut, FitConfig, HelixTolerance, LeftoverConfig, LeftoverStrategy, MergeConfig,
    RadialGate, ReconstructionConfig, RepairConfig, ZBinning,
};
pub use diagnostics::{Diagnostic, DiagnosticSink, NoopObserver, PipelineObserver, Stage};
pub use error::{ClusteringError, Error, FitError, Result};
pub use event::{Event, HitCollection};
pub use fit::TrackFitter;
pub use geometry::{CylindricalLayers, DetectorGeometry};
pub use hit::{wrap_angle, Covariance, Hit, HitId, Position, RawHit};
pub use segment::{Segment, SegmentId, SegmentStore};
pub use statistics::{ReconstructionStatistics, RunStatistics};
pub use track::{CrossingPoints, FitResult, FittedTrack, HelixParameters, HitOrder, Track};
