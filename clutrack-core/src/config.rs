//! Reconstruction configuration.

use crate::error::{Error, Result};
use crate::hit::Position;
use crate::track::HitOrder;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Linear binning of z into longitudinal buckets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ZBinning {
    /// Number of buckets.
    pub bins: u32,
    /// Lower edge of the binned range.
    pub z_min: f64,
    /// Upper edge of the binned range.
    pub z_max: f64,
}

impl Default for ZBinning {
    fn default() -> Self {
        Self {
            bins: 200,
            z_min: -2750.0,
            z_max: 2750.0,
        }
    }
}

impl ZBinning {
    /// Bucket index of `z`, clamped into `[0, bins)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    #[must_use]
    pub fn bucket_of(&self, z: f64) -> i32 {
        let max = self.bins.saturating_sub(1) as i32;
        let scaled = ((z - self.z_min) / (self.z_max - self.z_min) * f64::from(self.bins)).floor();
        if scaled.is_nan() || scaled <= 0.0 {
            0
        } else if scaled >= f64::from(max) {
            max
        } else {
            scaled as i32
        }
    }
}

/// Inner-region cut that keeps hits out of the initial clustering.
///
/// Hits inside the region (`rho <= r_cut` and `|z| <= z_margin + r_cut`) are
/// only offered to segments during leftover-hit reconciliation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RadialGate {
    /// Radial cut.
    pub r_cut: f64,
    /// Extra half-length added to `r_cut` for the z extent of the region.
    pub z_margin: f64,
}

impl Default for RadialGate {
    fn default() -> Self {
        Self {
            r_cut: 0.0,
            z_margin: 500.0,
        }
    }
}

impl RadialGate {
    /// True if `position` lies inside the gated inner region.
    #[inline]
    #[must_use]
    pub fn is_inner(&self, position: &Position) -> bool {
        position.rho() <= self.r_cut && position.z.abs() <= self.z_margin + self.r_cut
    }

    /// True if `position` takes part in the initial clustering.
    #[inline]
    #[must_use]
    pub fn admits(&self, position: &Position) -> bool {
        !self.is_inner(position)
    }
}

/// Settings of the duplicate-layer repair loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RepairConfig {
    /// Maximum number of split passes.
    pub passes: usize,
    /// Width of a layer range in layers.
    pub row_range_width: usize,
    /// Boundary shift applied per pass, in layers.
    pub row_range_shift: usize,
    /// Re-cluster clean pieces across range boundaries after the last pass.
    pub rejoin: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            passes: 2,
            row_range_width: 10,
            row_range_shift: 5,
            rejoin: true,
        }
    }
}

impl RepairConfig {
    /// Bucket id of `layer` in pass `pass` (0-based).
    ///
    /// Ranges are spaced two ids apart so that the clusterer's "bucket gap of
    /// at most one" rule never links neighbouring ranges.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    #[must_use]
    pub fn row_bucket(&self, layer: usize, pass: usize) -> i32 {
        let width = self.row_range_width.max(1);
        let offset = (pass * self.row_range_shift) % width;
        2 * ((layer + offset) / width) as i32
    }
}

/// Settings of the fitter adapter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FitConfig {
    /// Layer traversal order handed to the fitter.
    pub order: HitOrder,
    /// |z| difference above which the hit sequence is reversed.
    pub reverse_margin: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            order: HitOrder::Outgoing,
            reverse_margin: 3.0,
        }
    }
}

/// How leftover hits are matched to fitted segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LeftoverStrategy {
    /// For every track and crossing point, take the best hit in that layer.
    #[default]
    BestHitPerTrack,
    /// For every leftover hit, take the best track crossing its layer.
    BestTrackPerHit,
}

/// Chi-squared acceptance cut for leftover hits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Chi2Cut {
    /// Same cut for every track.
    Fixed(f64),
    /// `scale * ln(1/|omega|)`, clamped into `[scale, ceiling]`: straighter
    /// tracks get a looser cut.
    CurvatureScaled {
        /// Cut per unit of `ln(1/|omega|)`.
        scale: f64,
        /// Upper bound, also used for straight tracks.
        ceiling: f64,
    },
}

impl Default for Chi2Cut {
    fn default() -> Self {
        Self::CurvatureScaled {
            scale: 2.0,
            ceiling: 1000.0,
        }
    }
}

impl Chi2Cut {
    /// Cut for a track with signed curvature `omega`.
    #[must_use]
    pub fn for_omega(&self, omega: f64) -> f64 {
        match *self {
            Self::Fixed(cut) => cut,
            Self::CurvatureScaled { scale, ceiling } => {
                let w = omega.abs();
                if w == 0.0 || !w.is_finite() {
                    return ceiling;
                }
                (scale * -w.ln()).clamp(scale.min(ceiling), ceiling)
            }
        }
    }
}

/// Settings of the leftover-hit reconciler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LeftoverConfig {
    /// Matching strategy.
    pub strategy: LeftoverStrategy,
    /// Acceptance cut on the best-match residual.
    pub chi2_cut: Chi2Cut,
    /// Residual below which a hit of another segment counts as compatible.
    pub compatibility_chi2: f64,
    /// Compatible fraction above which two segments are merged.
    pub merge_fraction: f64,
    /// Also offer the first and last hit of every fitted segment as match
    /// candidates. Off by default: the pool is unowned hits only.
    pub include_segment_endpoints: bool,
}

impl Default for LeftoverConfig {
    fn default() -> Self {
        Self {
            strategy: LeftoverStrategy::BestHitPerTrack,
            chi2_cut: Chi2Cut::default(),
            compatibility_chi2: 10.0,
            merge_fraction: 0.5,
            include_segment_endpoints: false,
        }
    }
}

/// Tolerances of the helix proximity predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HelixTolerance {
    /// Maximum relative radius difference.
    pub radius: f64,
    /// Maximum relative tan(lambda) difference.
    pub tan_lambda: f64,
    /// Maximum circle-centre distance as a fraction of the radius.
    pub center_distance: f64,
}

impl Default for HelixTolerance {
    fn default() -> Self {
        Self {
            radius: 0.1,
            tan_lambda: 0.2,
            center_distance: 0.1,
        }
    }
}

/// Settings of the final segment merger.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MergeConfig {
    /// Run the merger at all.
    pub enabled: bool,
    /// Helix proximity tolerances.
    pub tolerance: HelixTolerance,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance: HelixTolerance::default(),
        }
    }
}

/// Configuration of the full reconstruction pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconstructionConfig {
    /// Input collections to read; empty means every collection of the event.
    pub input_collections: Vec<String>,
    /// Maximum hit distance for the initial clustering.
    pub distance_cut: f64,
    /// Maximum hit distance when re-clustering during repair.
    pub split_distance_cut: f64,
    /// Minimum number of hits per segment.
    pub min_segment_size: usize,
    /// Allowed fraction of same-layer hits per segment.
    pub duplicate_fraction: f64,
    /// Inner-region gate.
    pub radial_gate: RadialGate,
    /// Longitudinal bucketing.
    pub z_binning: ZBinning,
    /// Duplicate-layer repair.
    pub repair: RepairConfig,
    /// Fitter adapter.
    pub fit: FitConfig,
    /// Leftover-hit reconciliation.
    pub leftover: LeftoverConfig,
    /// Final segment merging.
    pub merge: MergeConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            input_collections: Vec::new(),
            distance_cut: 40.0,
            split_distance_cut: 20.0,
            min_segment_size: 3,
            duplicate_fraction: 0.01,
            radial_gate: RadialGate::default(),
            z_binning: ZBinning::default(),
            repair: RepairConfig::default(),
            fit: FitConfig::default(),
            leftover: LeftoverConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the input collections.
    #[must_use]
    pub fn with_input_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_collections = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initial clustering distance cut.
    #[must_use]
    pub fn with_distance_cut(mut self, cut: f64) -> Self {
        self.distance_cut = cut;
        self
    }

    /// Sets the re-clustering distance cut.
    #[must_use]
    pub fn with_split_distance_cut(mut self, cut: f64) -> Self {
        self.split_distance_cut = cut;
        self
    }

    /// Sets the minimum segment size.
    #[must_use]
    pub fn with_min_segment_size(mut self, size: usize) -> Self {
        self.min_segment_size = size;
        self
    }

    /// Sets the allowed duplicate-layer fraction.
    #[must_use]
    pub fn with_duplicate_fraction(mut self, fraction: f64) -> Self {
        self.duplicate_fraction = fraction;
        self
    }

    /// Sets the radial cut.
    #[must_use]
    pub fn with_r_cut(mut self, r_cut: f64) -> Self {
        self.radial_gate.r_cut = r_cut;
        self
    }

    /// Sets the z binning.
    #[must_use]
    pub fn with_z_binning(mut self, binning: ZBinning) -> Self {
        self.z_binning = binning;
        self
    }

    /// Sets the repair settings.
    #[must_use]
    pub fn with_repair(mut self, repair: RepairConfig) -> Self {
        self.repair = repair;
        self
    }

    /// Sets the row-range width used for splitting.
    #[must_use]
    pub fn with_row_range_width(mut self, width: usize) -> Self {
        self.repair.row_range_width = width;
        self
    }

    /// Sets the fitter adapter settings.
    #[must_use]
    pub fn with_fit(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    /// Sets the leftover-hit settings.
    #[must_use]
    pub fn with_leftover(mut self, leftover: LeftoverConfig) -> Self {
        self.leftover = leftover;
        self
    }

    /// Sets the helix merge tolerances.
    #[must_use]
    pub fn with_merge_tolerance(mut self, tolerance: HelixTolerance) -> Self {
        self.merge.tolerance = tolerance;
        self
    }

    /// Enables or disables the final merger.
    #[must_use]
    pub fn with_merging(mut self, enabled: bool) -> Self {
        self.merge.enabled = enabled;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }
        fn fraction(name: &str, value: f64) -> Result<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!(
                    "{name} must lie in [0, 1], got {value}"
                )))
            }
        }

        positive("distance_cut", self.distance_cut)?;
        positive("split_distance_cut", self.split_distance_cut)?;
        if self.min_segment_size == 0 {
            return Err(Error::InvalidConfig(
                "min_segment_size must be at least 1".into(),
            ));
        }
        fraction("duplicate_fraction", self.duplicate_fraction)?;
        if !(self.radial_gate.r_cut.is_finite() && self.radial_gate.r_cut >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "radial_gate.r_cut must be non-negative, got {}",
                self.radial_gate.r_cut
            )));
        }
        if self.z_binning.bins == 0 || !(self.z_binning.z_max > self.z_binning.z_min) {
            return Err(Error::InvalidConfig(format!(
                "z_binning needs bins > 0 and z_max > z_min, got {:?}",
                self.z_binning
            )));
        }
        if self.repair.row_range_width == 0 {
            return Err(Error::InvalidConfig(
                "repair.row_range_width must be at least 1".into(),
            ));
        }
        if !(self.fit.reverse_margin.is_finite() && self.fit.reverse_margin >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "fit.reverse_margin must be non-negative, got {}",
                self.fit.reverse_margin
            )));
        }
        match self.leftover.chi2_cut {
            Chi2Cut::Fixed(cut) => positive("leftover.chi2_cut", cut)?,
            Chi2Cut::CurvatureScaled { scale, ceiling } => {
                positive("leftover.chi2_cut.scale", scale)?;
                positive("leftover.chi2_cut.ceiling", ceiling)?;
            }
        }
        positive("leftover.compatibility_chi2", self.leftover.compatibility_chi2)?;
        fraction("leftover.merge_fraction", self.leftover.merge_fraction)?;
        positive("merge.tolerance.radius", self.merge.tolerance.radius)?;
        positive("merge.tolerance.tan_lambda", self.merge.tolerance.tan_lambda)?;
        positive(
            "merge.tolerance.center_distance",
            self.merge.tolerance.center_distance,
        )?;
        Ok(())
    }
}
