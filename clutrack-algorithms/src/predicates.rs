//! Merge predicates and residual scores.
//!
//! The set of predicates is small and fixed: hit proximity for clustering and
//! helix proximity for track merging. Both implement [`MergePredicate`] so the
//! nearest-neighbour clusterer can run over either item type. The chi-squared
//! residual is a pure score, not a predicate.

use clutrack_core::{wrap_angle, FittedTrack, HelixTolerance, Hit, Position};

/// Decides whether two items belong to the same group.
///
/// The longitudinal bucket rule (ids differ by at most one) is enforced by the
/// clusterer, so implementations only look at the items themselves.
pub trait MergePredicate<T: ?Sized>: Send + Sync {
    /// True if `a` and `b` should be unioned.
    fn merges(&self, a: &T, b: &T) -> bool;
}

/// Hits closer than a distance cut and on different layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPredicate {
    cut_squared: f64,
}

impl ProximityPredicate {
    /// Creates a predicate with distance cut `cut`.
    #[must_use]
    pub fn new(cut: f64) -> Self {
        Self {
            cut_squared: cut * cut,
        }
    }
}

impl MergePredicate<Hit> for ProximityPredicate {
    #[inline]
    fn merges(&self, a: &Hit, b: &Hit) -> bool {
        a.layer != b.layer && a.position.distance_squared(&b.position) < self.cut_squared
    }
}

/// `2|a - b| / |a + b|`: zero for equal values, infinite when the sum vanishes.
#[must_use]
pub fn relative_difference(a: f64, b: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let sum = (a + b).abs();
    if sum == 0.0 {
        f64::INFINITY
    } else {
        2.0 * (a - b).abs() / sum
    }
}

/// Fitted tracks with close radius, slope and circle centre.
///
/// Radii are signed, so tracks of opposite charge never merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelixProximity {
    tolerance: HelixTolerance,
}

impl HelixProximity {
    /// Creates a predicate with the given tolerances.
    #[must_use]
    pub fn new(tolerance: HelixTolerance) -> Self {
        Self { tolerance }
    }
}

impl MergePredicate<FittedTrack> for HelixProximity {
    fn merges(&self, a: &FittedTrack, b: &FittedTrack) -> bool {
        let (pa, pb) = (a.parameters(), b.parameters());
        let (ra, rb) = (pa.radius(), pb.radius());
        if !(ra.is_finite() && rb.is_finite()) {
            return false;
        }
        if relative_difference(ra, rb) >= self.tolerance.radius {
            return false;
        }
        if relative_difference(pa.tan_lambda, pb.tan_lambda) >= self.tolerance.tan_lambda {
            return false;
        }
        let (xa, ya) = pa.circle_center();
        let (xb, yb) = pb.circle_center();
        (xa - xb).hypot(ya - yb) < self.tolerance.center_distance * ra.abs()
    }
}

/// Chi-squared residual of `hit` against a reference point.
///
/// `(r dphi)^2 / sigma_rphi^2 + dz^2 / sigma_z^2` with `dphi` wrapped into
/// `(-pi, pi]` and `r` the mean transverse radius of the two points, which
/// makes the score independent of argument order.
#[must_use]
pub fn chi2_residual(hit: &Hit, point: &Position) -> f64 {
    let r = 0.5 * (hit.position.rho() + point.rho());
    let drphi = r * wrap_angle(hit.position.phi() - point.phi());
    let dz = hit.position.z - point.z;
    drphi * drphi / hit.covariance.sigma_rphi_squared() + dz * dz / hit.covariance.sigma_z_squared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use clutrack_core::{
        Covariance, CrossingPoints, FitResult, HelixParameters, HitId, SegmentId,
    };

    fn hit_at(position: Position, layer: usize) -> Hit {
        Hit {
            id: HitId(0),
            position,
            covariance: Covariance::from_resolution(0.1, 1.0),
            layer,
            z_bucket: 0,
            chi2_residual: None,
            truth_id: None,
            collection: 0,
        }
    }

    fn track(radius: f64, phi0: f64, d0: f64, tan_lambda: f64) -> FittedTrack {
        FittedTrack {
            segment: SegmentId(0),
            fit: FitResult {
                parameters: HelixParameters {
                    omega: 1.0 / radius,
                    phi0,
                    d0,
                    z0: 0.0,
                    tan_lambda,
                },
                crossing_points: CrossingPoints::default(),
                hit_count: 10,
                chi2: 1.0,
                ndf: 15,
            },
        }
    }

    #[test]
    fn test_proximity() {
        let pred = ProximityPredicate::new(40.0);
        let a = hit_at(Position::new(400.0, 0.0, 0.0), 1);
        let b = hit_at(Position::new(410.0, 10.0, 5.0), 2);
        let c = hit_at(Position::new(410.0, 10.0, 5.0), 1);
        let far = hit_at(Position::new(400.0, 45.0, 0.0), 3);
        assert!(pred.merges(&a, &b));
        // Same layer never merges.
        assert!(!pred.merges(&a, &c));
        assert!(!pred.merges(&a, &far));
        // Exactly at the cut is rejected.
        let edge = hit_at(Position::new(440.0, 0.0, 0.0), 4);
        assert!(!pred.merges(&a, &edge));
    }

    #[test]
    fn test_relative_difference() {
        assert_relative_eq!(relative_difference(500.0, 505.0), 10.0 / 1005.0);
        assert_relative_eq!(relative_difference(0.0, 0.0), 0.0);
        assert!(relative_difference(1.0, -1.0).is_infinite());
    }

    #[test]
    fn test_helix_proximity_merges_close_tracks() {
        let pred = HelixProximity::new(HelixTolerance::default());
        // Centres at (0, -500) and (0, -530): 0.06 r apart.
        let a = track(500.0, 0.0, 0.0, 0.5);
        let b = track(505.0, 0.0, -25.0, 0.52);
        assert!(pred.merges(&a, &b));
        assert!(pred.merges(&b, &a));
    }

    #[test]
    fn test_helix_proximity_rejects() {
        let pred = HelixProximity::new(HelixTolerance::default());
        let a = track(500.0, 0.0, 0.0, 0.5);
        // Radius off by 20 %.
        assert!(!pred.merges(&a, &track(600.0, 0.0, 0.0, 0.5)));
        // Slope off.
        assert!(!pred.merges(&a, &track(500.0, 0.0, 0.0, 0.8)));
        // Same circle size, centre far away.
        assert!(!pred.merges(&a, &track(500.0, 1.0, 0.0, 0.5)));
        // Opposite charge.
        assert!(!pred.merges(&a, &track(-500.0, 0.0, 0.0, 0.5)));
    }

    #[test]
    fn test_chi2_residual() {
        let hit = hit_at(Position::new(500.0, 0.0, 10.0), 0);
        // Pure z offset of 2 with sigma_z = 1.
        assert_relative_eq!(
            chi2_residual(&hit, &Position::new(500.0, 0.0, 12.0)),
            4.0,
            epsilon = 1e-9
        );
        // Pure azimuthal offset: r dphi = 0.1 with sigma_rphi = 0.1.
        let p = Position::from_cylindrical(500.0, 0.1 / 500.0, 10.0);
        assert_relative_eq!(chi2_residual(&hit, &p), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_chi2_residual_symmetric_and_wrapped() {
        let a = Position::from_cylindrical(600.0, 3.1, 5.0);
        let b = Position::from_cylindrical(610.0, -3.1, 7.0);
        let ha = hit_at(a, 0);
        let hb = hit_at(b, 0);
        assert_relative_eq!(chi2_residual(&ha, &b), chi2_residual(&hb, &a), epsilon = 1e-9);
        // The wrapped angle difference is small, not close to 2 pi.
        let dphi = 2.0 * std::f64::consts::PI - 6.2;
        let r = 605.0;
        let expected = (r * dphi).powi(2) / 0.01 + 4.0;
        assert_relative_eq!(chi2_residual(&ha, &b), expected, max_relative = 1e-9);
    }
}
