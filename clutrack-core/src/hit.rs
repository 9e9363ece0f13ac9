//! Hit types for tracking detector data.

use std::f64::consts::PI;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position in detector coordinates (length units, typically mm).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate (along the detector axis).
    pub z: f64,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a position from cylindrical coordinates.
    #[inline]
    #[must_use]
    pub fn from_cylindrical(rho: f64, phi: f64, z: f64) -> Self {
        Self {
            x: rho * phi.cos(),
            y: rho * phi.sin(),
            z,
        }
    }

    /// Transverse radius.
    #[inline]
    #[must_use]
    pub fn rho(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Azimuthal angle in (-pi, pi].
    #[inline]
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Computes the squared Euclidean distance to another position.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance to another position.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// True if all coordinates are finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Wraps an angle difference into (-pi, pi].
#[inline]
#[must_use]
pub fn wrap_angle(mut phi: f64) -> f64 {
    while phi <= -PI {
        phi += 2.0 * PI;
    }
    while phi > PI {
        phi -= 2.0 * PI;
    }
    phi
}

/// Position covariance, stored as the lower triangle
/// `[xx, xy, yy, xz, yz, zz]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Covariance(pub [f64; 6]);

impl Covariance {
    /// Builds a diagonal covariance from the r-phi and z resolutions.
    ///
    /// The r-phi variance is split evenly between x and y so that
    /// [`Covariance::sigma_rphi_squared`] returns `sigma_rphi^2`.
    #[must_use]
    pub fn from_resolution(sigma_rphi: f64, sigma_z: f64) -> Self {
        let half = 0.5 * sigma_rphi * sigma_rphi;
        Self([half, 0.0, half, 0.0, 0.0, sigma_z * sigma_z])
    }

    /// Variance in the transverse (r-phi) direction.
    #[inline]
    #[must_use]
    pub fn sigma_rphi_squared(&self) -> f64 {
        self.0[0] + self.0[2]
    }

    /// Variance along z.
    #[inline]
    #[must_use]
    pub fn sigma_z_squared(&self) -> f64 {
        self.0[5]
    }
}

impl Default for Covariance {
    fn default() -> Self {
        Self::from_resolution(0.1, 1.0)
    }
}

/// One measurement as it arrives from an input collection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawHit {
    /// Measured position.
    pub position: Position,
    /// Position uncertainty.
    #[cfg_attr(feature = "serde", serde(default))]
    pub covariance: Covariance,
    /// Simulation particle label, if the record carries truth information.
    #[cfg_attr(feature = "serde", serde(default))]
    pub truth_id: Option<u64>,
}

impl RawHit {
    /// Creates a raw hit with the default covariance.
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Position::new(x, y, z),
            covariance: Covariance::default(),
            truth_id: None,
        }
    }

    /// Sets the covariance.
    #[must_use]
    pub fn with_covariance(mut self, covariance: Covariance) -> Self {
        self.covariance = covariance;
        self
    }

    /// Sets the truth label.
    #[must_use]
    pub fn with_truth(mut self, truth_id: u64) -> Self {
        self.truth_id = Some(truth_id);
        self
    }

    /// Returns a description of the first defect, if the record is unusable.
    #[must_use]
    pub fn defect(&self) -> Option<String> {
        if !self.position.is_finite() {
            return Some(format!("non-finite position {}", self.position));
        }
        let (srphi, sz) = (
            self.covariance.sigma_rphi_squared(),
            self.covariance.sigma_z_squared(),
        );
        if !(srphi.is_finite() && srphi > 0.0) {
            return Some(format!("non-positive r-phi variance {srphi}"));
        }
        if !(sz.is_finite() && sz > 0.0) {
            return Some(format!("non-positive z variance {sz}"));
        }
        None
    }
}

/// Index of a hit in the event hit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitId(pub usize);

impl HitId {
    /// Returns the raw index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for HitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An annotated hit.
///
/// Layer and longitudinal bucket are assigned once by the annotator and are
/// not recomputed later in the event. Ownership by a segment is tracked in
/// the [`SegmentStore`](crate::SegmentStore), not on the hit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Position in the event hit table.
    pub id: HitId,
    /// Measured position.
    pub position: Position,
    /// Position uncertainty.
    pub covariance: Covariance,
    /// Detector layer index.
    pub layer: usize,
    /// Longitudinal bucket used to bound the clustering search window.
    pub z_bucket: i32,
    /// Residual against the best-matching crossing point, once evaluated.
    pub chi2_residual: Option<f64>,
    /// Simulation particle label carried over from the input record.
    pub truth_id: Option<u64>,
    /// Index of the input collection the hit came from.
    pub collection: usize,
}

impl Hit {
    /// Transverse radius of the hit.
    #[inline]
    #[must_use]
    pub fn rho(&self) -> f64 {
        self.position.rho()
    }

    /// Absolute z of the hit.
    #[inline]
    #[must_use]
    pub fn abs_z(&self) -> f64 {
        self.position.z.abs()
    }
}
