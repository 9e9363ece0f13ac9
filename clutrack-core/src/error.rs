//! Error types for clutrack-core.

use thiserror::Error;

use crate::hit::HitId;
use crate::segment::SegmentId;

/// Result type alias for clutrack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for clutrack operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A hit record with non-finite coordinates or a non-positive variance.
    #[error("invalid hit {index} in collection '{collection}': {reason}")]
    InvalidHit {
        collection: String,
        index: usize,
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// A requested input collection is absent from the event.
    #[error("missing input collection '{0}'")]
    MissingCollection(String),

    /// Hit id outside the event hit table.
    #[error("unknown hit {0}")]
    UnknownHit(HitId),

    /// Segment id that is not (or no longer) active.
    #[error("unknown or inactive segment {0}")]
    UnknownSegment(SegmentId),

    /// Attempt to claim a hit that already belongs to a segment.
    #[error("hit {hit} is already owned by segment {owner}")]
    AlreadyOwned { hit: HitId, owner: SegmentId },

    /// Clustering error.
    #[error("clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Fit error.
    #[error("fit error: {0}")]
    Fit(#[from] FitError),
}

/// Errors raised by the nearest-neighbour clusterer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusteringError {
    /// Bucket ids and items differ in length.
    #[error("bucket/item count mismatch: {items} items, {buckets} buckets")]
    BucketMismatch { items: usize, buckets: usize },

    /// The gap-terminating sweep was handed input not sorted by bucket.
    #[error("input not sorted by bucket id at position {position}")]
    UnsortedInput { position: usize },
}

/// Errors reported by a track fitter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Not enough hits to constrain a helix.
    #[error("too few hits for a fit: {found} (need {required})")]
    TooFewHits { found: usize, required: usize },

    /// Hit configuration does not define a trajectory (e.g. coincident points).
    #[error("degenerate hit configuration: {0}")]
    Degenerate(String),

    /// The fit did not converge.
    #[error("fit did not converge after {0} iterations")]
    NotConverged(usize),
}
