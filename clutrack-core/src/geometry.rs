//! Detector geometry lookup.

use crate::hit::Position;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maps positions to discrete detector layers.
///
/// Implementations must be pure functions of the detector layout: the same
/// position always yields the same layer within an event.
pub trait DetectorGeometry: Send + Sync {
    /// Index of the layer nearest to `position` (uses rho and phi only).
    fn layer_index_of(&self, position: &Position) -> usize;

    /// Number of layers.
    fn layer_count(&self) -> usize;

    /// Nominal radius of a layer, if the layer exists.
    fn layer_radius(&self, layer: usize) -> Option<f64>;
}

/// Uniform cylindrical layers between `r_min` and `r_max`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CylindricalLayers {
    r_min: f64,
    r_max: f64,
    n_layers: usize,
}

impl CylindricalLayers {
    /// Creates a layout with `n_layers` equally spaced rows.
    #[must_use]
    pub fn new(r_min: f64, r_max: f64, n_layers: usize) -> Self {
        Self {
            r_min,
            r_max,
            n_layers: n_layers.max(1),
        }
    }

    /// Radial extent of one layer.
    #[inline]
    #[must_use]
    pub fn pitch(&self) -> f64 {
        (self.r_max - self.r_min) / self.n_layers as f64
    }

    /// Inner radius of the sensitive volume.
    #[must_use]
    pub fn r_min(&self) -> f64 {
        self.r_min
    }

    /// Outer radius of the sensitive volume.
    #[must_use]
    pub fn r_max(&self) -> f64 {
        self.r_max
    }
}

impl Default for CylindricalLayers {
    fn default() -> Self {
        Self::new(385.0, 1705.0, 220)
    }
}

impl DetectorGeometry for CylindricalLayers {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn layer_index_of(&self, position: &Position) -> usize {
        let row = ((position.rho() - self.r_min) / self.pitch()).floor();
        if row <= 0.0 {
            0
        } else {
            (row as usize).min(self.n_layers - 1)
        }
    }

    fn layer_count(&self) -> usize {
        self.n_layers
    }

    fn layer_radius(&self, layer: usize) -> Option<f64> {
        (layer < self.n_layers).then(|| self.r_min + (layer as f64 + 0.5) * self.pitch())
    }
}
