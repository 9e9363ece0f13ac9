//! Helix parameters, fitted segment tracks and final tracks.

use crate::hit::{HitId, Position};
use crate::segment::SegmentId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Canonical helix parameters of a charged trajectory in a uniform field.
///
/// The signed radius `1/omega` together with `d0` and `phi0` fixes the
/// circle centre at `((r - d0) sin phi0, (d0 - r) cos phi0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HelixParameters {
    /// Signed curvature (1/length).
    pub omega: f64,
    /// Azimuth of the momentum at the point of closest approach.
    pub phi0: f64,
    /// Signed transverse impact parameter.
    pub d0: f64,
    /// Longitudinal impact parameter.
    pub z0: f64,
    /// Slope ds/dz of the helix.
    pub tan_lambda: f64,
}

impl HelixParameters {
    /// Signed radius of curvature.
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f64 {
        1.0 / self.omega
    }

    /// Centre of the transverse circle.
    #[must_use]
    pub fn circle_center(&self) -> (f64, f64) {
        let r = self.radius();
        let (sin, cos) = self.phi0.sin_cos();
        ((r - self.d0) * sin, (self.d0 - r) * cos)
    }
}

/// Traversal order of hits handed to the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitOrder {
    /// Inner layers first.
    #[default]
    Outgoing,
    /// Outer layers first.
    Incoming,
}

/// Predicted crossing points of a trajectory, indexed by layer id.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossingPoints(Vec<Option<Position>>);

impl CrossingPoints {
    /// Creates an empty table for `n_layers` layers.
    #[must_use]
    pub fn with_layers(n_layers: usize) -> Self {
        Self(vec![None; n_layers])
    }

    /// Number of layer slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the table has no layer slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Crossing point for `layer`, if the trajectory reaches it.
    #[must_use]
    pub fn for_layer(&self, layer: usize) -> Option<&Position> {
        self.0.get(layer).and_then(Option::as_ref)
    }

    /// Sets the crossing point for `layer`, growing the table if needed.
    pub fn set(&mut self, layer: usize, point: Position) {
        if layer >= self.0.len() {
            self.0.resize(layer + 1, None);
        }
        self.0[layer] = Some(point);
    }

    /// Removes the crossing point for `layer`.
    pub fn invalidate(&mut self, layer: usize) {
        if let Some(slot) = self.0.get_mut(layer) {
            *slot = None;
        }
    }

    /// Iterates over `(layer, point)` for every present crossing point.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Position)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(layer, p)| p.as_ref().map(|p| (layer, p)))
    }

    /// Number of present crossing points.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().filter(|p| p.is_some()).count()
    }
}

impl FromIterator<(usize, Position)> for CrossingPoints {
    fn from_iter<I: IntoIterator<Item = (usize, Position)>>(iter: I) -> Self {
        let mut points = Self::default();
        for (layer, p) in iter {
            points.set(layer, p);
        }
        points
    }
}

/// Output of a track fitter for one ordered hit sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitResult {
    /// Fitted helix.
    pub parameters: HelixParameters,
    /// Per-layer crossing points of the fitted trajectory.
    pub crossing_points: CrossingPoints,
    /// Number of hits used in the fit.
    pub hit_count: usize,
    /// Total chi-squared.
    pub chi2: f64,
    /// Degrees of freedom.
    pub ndf: u32,
}

impl FitResult {
    /// Chi-squared per degree of freedom (infinite when `ndf == 0`).
    #[must_use]
    pub fn chi2_per_ndf(&self) -> f64 {
        if self.ndf == 0 {
            f64::INFINITY
        } else {
            self.chi2 / f64::from(self.ndf)
        }
    }
}

/// A fitted segment: the fit result plus a handle to the source segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FittedTrack {
    /// Source segment.
    pub segment: SegmentId,
    /// Fit result.
    pub fit: FitResult,
}

impl FittedTrack {
    /// Helix parameters of the fit.
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &HelixParameters {
        &self.fit.parameters
    }

    /// Crossing points of the fit.
    #[inline]
    #[must_use]
    pub fn crossing_points(&self) -> &CrossingPoints {
        &self.fit.crossing_points
    }
}

/// A final reconstructed track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// All hits of the track.
    pub hits: Vec<HitId>,
    /// Helix parameters (from the best member for merged tracks).
    pub parameters: HelixParameters,
    /// Chi-squared of the member the parameters come from.
    pub chi2: f64,
    /// Degrees of freedom of that member.
    pub ndf: u32,
    /// Segments that make up the track.
    pub segments: Vec<SegmentId>,
}

impl Track {
    /// True if the track was built from more than one segment.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.segments.len() > 1
    }
}
