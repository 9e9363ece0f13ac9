//! clutrack-algorithms: Track reconstruction stages built on clutrack-core.
//!
//! The pipeline runs these stages per event:
//! - **Annotation** - validation, layer ids and longitudinal buckets
//! - **Nearest-neighbour clustering** - union-find over a bucketed sweep
//! - **Duplicate repair** - splits segments with several hits per layer
//! - **Fitting** - hit ordering and parallel segment fits
//! - **Leftover reconciliation** - attaches unused hits to crossing points
//! - **Merging** - joins segment tracks on the same helix
//!
#![warn(missing_docs)]

mod annotate;
mod circle_fit;
mod duplicates;
mod fitter;
mod leftover;
mod merge;
pub mod nn;
mod pipeline;
pub mod predicates;
pub mod truth;

pub use annotate::{annotate_event, AnnotatedEvent};
pub use circle_fit::{CircleHelixFitter, MIN_FIT_HITS};
pub use duplicates::{duplicate_layer_hits, is_contaminated, DuplicateRepair, RepairReport};
pub use fitter::{ordered_hits, FitterAdapter};
pub use leftover::{compatible_fraction, LeftoverReconciler, Reconciliation};
pub use merge::{merge_tracks, unmerged_tracks};
pub use nn::{NearestNeighborClusterer, SweepMode};
pub use pipeline::{reconstruct_event, reconstruct_events, EventReconstruction};
pub use predicates::{chi2_residual, HelixProximity, MergePredicate, ProximityPredicate};
pub use truth::{check_truth, ImpureTrack, SplitParticle, TruthReport};

// Re-export the configuration so callers need only this crate for a run.
pub use clutrack_core::{ReconstructionConfig, ReconstructionStatistics, RunStatistics};
