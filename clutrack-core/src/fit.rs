//! Track fitter interface.

use crate::error::FitError;
use crate::hit::Hit;
use crate::track::{FitResult, HitOrder};

/// Trait for helix fitters.
///
/// The fitter receives hits already ordered in the direction of flight and
/// reports the fitted helix together with the crossing points of the
/// trajectory on every detector layer it reaches.
pub trait TrackFitter: Send + Sync {
    /// Fits the ordered hit sequence.
    ///
    /// # Errors
    /// Returns a [`FitError`] when the hits cannot be fitted (too few hits,
    /// degenerate geometry, no convergence).
    fn fit(&self, hits: &[&Hit], order: HitOrder) -> Result<FitResult, FitError>;

    /// Returns the name of the fitter.
    fn name(&self) -> &'static str;
}
