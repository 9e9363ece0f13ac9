//! Reference helix fitter.
//!
//! Fits a circle to the transverse hit positions (algebraic least squares)
//! and a straight line in the arc-length / z plane, then intersects the
//! helix with every layer cylinder of the detector geometry.

use std::f64::consts::TAU;

use nalgebra::{Matrix3, Vector3};

use clutrack_core::{
    wrap_angle, CrossingPoints, DetectorGeometry, FitError, FitResult, HelixParameters, Hit,
    HitOrder, Position, TrackFitter,
};

/// Minimum number of hits for a helix fit.
pub const MIN_FIT_HITS: usize = 3;

/// Radius above which a circle is treated as a straight line.
const MAX_RADIUS: f64 = 1.0e7;

/// Circle in the transverse plane with the sense of motion along it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Circle {
    xc: f64,
    yc: f64,
    /// Signed radius: positive for clockwise motion.
    r: f64,
}

impl Circle {
    /// Azimuth of `(x, y)` as seen from the centre.
    fn angle_of(&self, x: f64, y: f64) -> f64 {
        (y - self.yc).atan2(x - self.xc)
    }

    /// Turning angle from `from` to `to` along the direction of motion.
    fn turn(&self, from: f64, to: f64) -> f64 {
        if self.r > 0.0 {
            from - to
        } else {
            to - from
        }
    }

    fn parameters(&self, z0: f64, tan_lambda: f64) -> HelixParameters {
        let rho_c = self.xc.hypot(self.yc);
        let (d0, phi0) = if self.r > 0.0 {
            (self.r - rho_c, self.xc.atan2(-self.yc))
        } else {
            (self.r + rho_c, (-self.xc).atan2(self.yc))
        };
        HelixParameters {
            omega: 1.0 / self.r,
            phi0,
            d0,
            z0,
            tan_lambda,
        }
    }

    /// Point of closest approach to the origin.
    fn pca(&self) -> (f64, f64) {
        let rho_c = self.xc.hypot(self.yc);
        let scale = 1.0 - self.r.abs() / rho_c;
        (self.xc * scale, self.yc * scale)
    }
}

/// Algebraic (Kasa) circle fit, centred on the hit mean for conditioning.
fn fit_circle(hits: &[&Hit]) -> Result<(f64, f64, f64), FitError> {
    #[allow(clippy::cast_precision_loss)]
    let n = hits.len() as f64;
    let mx = hits.iter().map(|h| h.position.x).sum::<f64>() / n;
    let my = hits.iter().map(|h| h.position.y).sum::<f64>() / n;

    let mut a = Matrix3::<f64>::zeros();
    let mut b = Vector3::<f64>::zeros();
    for hit in hits {
        let (u, v) = (hit.position.x - mx, hit.position.y - my);
        let w = u * u + v * v;
        let row = Vector3::new(u, v, 1.0);
        a += row * row.transpose();
        b -= row * w;
    }

    let solution = a
        .lu()
        .solve(&b)
        .ok_or_else(|| FitError::Degenerate("singular circle system".into()))?;
    let (uc, vc) = (-0.5 * solution[0], -0.5 * solution[1]);
    let r2 = uc * uc + vc * vc - solution[2];
    let radius = r2.sqrt();
    if !(radius.is_finite() && radius > 0.0 && radius < MAX_RADIUS) {
        return Err(FitError::Degenerate(format!(
            "no finite circle through the hits (r^2 = {r2})"
        )));
    }
    Ok((uc + mx, vc + my, radius))
}

/// Least-squares straight line `z = z0 + slope * s`.
fn fit_line(s: &[f64], z: &[f64]) -> Result<(f64, f64), FitError> {
    #[allow(clippy::cast_precision_loss)]
    let n = s.len() as f64;
    let ms = s.iter().sum::<f64>() / n;
    let mz = z.iter().sum::<f64>() / n;
    let (mut sss, mut ssz) = (0.0, 0.0);
    for (si, zi) in s.iter().zip(z) {
        sss += (si - ms) * (si - ms);
        ssz += (si - ms) * (zi - mz);
    }
    if sss <= f64::EPSILON * n {
        return Err(FitError::Degenerate("hits span no arc length".into()));
    }
    let slope = ssz / sss;
    Ok((mz - slope * ms, slope))
}

/// Reference [`TrackFitter`] for cylindrical layer geometries.
#[derive(Debug, Clone)]
pub struct CircleHelixFitter<G> {
    geometry: G,
}

impl<G: DetectorGeometry> CircleHelixFitter<G> {
    /// Creates a fitter computing crossing points on `geometry`'s layers.
    #[must_use]
    pub fn new(geometry: G) -> Self {
        Self { geometry }
    }

    /// Detector geometry used for crossing points.
    #[must_use]
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// First crossing of the helix with each layer cylinder after the point
    /// of closest approach.
    fn crossing_points(&self, circle: &Circle, z0: f64, tan_lambda: f64) -> CrossingPoints {
        let mut points = CrossingPoints::with_layers(self.geometry.layer_count());
        let rho_c = circle.xc.hypot(circle.yc);
        let radius = circle.r.abs();
        if rho_c == 0.0 {
            return points;
        }
        let (ux, uy) = (circle.xc / rho_c, circle.yc / rho_c);
        let (px, py) = circle.pca();
        let alpha0 = circle.angle_of(px, py);

        for layer in 0..self.geometry.layer_count() {
            let Some(rl) = self.geometry.layer_radius(layer) else {
                continue;
            };
            if rho_c > rl + radius || rho_c < (rl - radius).abs() {
                continue;
            }
            let a = (rl * rl - radius * radius + rho_c * rho_c) / (2.0 * rho_c);
            let h = (rl * rl - a * a).max(0.0).sqrt();
            let candidates = [
                (a * ux - h * uy, a * uy + h * ux),
                (a * ux + h * uy, a * uy - h * ux),
            ];
            let best = candidates
                .iter()
                .map(|&(x, y)| {
                    let psi = circle.turn(alpha0, circle.angle_of(x, y)).rem_euclid(TAU);
                    (psi, x, y)
                })
                .min_by(|l, r| l.0.total_cmp(&r.0));
            if let Some((psi, x, y)) = best {
                points.set(layer, Position::new(x, y, z0 + tan_lambda * radius * psi));
            }
        }
        points
    }
}

impl<G: DetectorGeometry> TrackFitter for CircleHelixFitter<G> {
    fn fit(&self, hits: &[&Hit], _order: HitOrder) -> Result<FitResult, FitError> {
        if hits.len() < MIN_FIT_HITS {
            return Err(FitError::TooFewHits {
                found: hits.len(),
                required: MIN_FIT_HITS,
            });
        }

        let (xc, yc, radius) = fit_circle(hits)?;

        // Sense of rotation from the hit sequence.
        let mut winding = 0.0;
        for pair in hits.windows(2) {
            let (ax, ay) = (pair[0].position.x - xc, pair[0].position.y - yc);
            let (bx, by) = (pair[1].position.x - xc, pair[1].position.y - yc);
            winding += ax * by - ay * bx;
        }
        if xc.hypot(yc) == 0.0 {
            return Err(FitError::Degenerate("circle centred on the axis".into()));
        }
        let circle = Circle {
            xc,
            yc,
            r: if winding > 0.0 { -radius } else { radius },
        };

        // Arc length from the point of closest approach, unwrapped along the
        // hit sequence so loopers keep increasing.
        let (px, py) = circle.pca();
        let alpha0 = circle.angle_of(px, py);
        let mut s = Vec::with_capacity(hits.len());
        let mut previous = alpha0;
        let mut psi = 0.0;
        for hit in hits {
            let alpha = circle.angle_of(hit.position.x, hit.position.y);
            psi += wrap_angle(circle.turn(previous, alpha));
            previous = alpha;
            s.push(radius * psi);
        }
        let z: Vec<f64> = hits.iter().map(|h| h.position.z).collect();
        let (z0, tan_lambda) = fit_line(&s, &z)?;

        let mut chi2 = 0.0;
        for (hit, si) in hits.iter().zip(&s) {
            let dr = (hit.position.x - xc).hypot(hit.position.y - yc) - radius;
            let dz = hit.position.z - (z0 + tan_lambda * si);
            chi2 += dr * dr / hit.covariance.sigma_rphi_squared()
                + dz * dz / hit.covariance.sigma_z_squared();
        }

        #[allow(clippy::cast_possible_truncation)]
        let ndf = (2 * hits.len()).saturating_sub(5) as u32;

        Ok(FitResult {
            parameters: circle.parameters(z0, tan_lambda),
            crossing_points: self.crossing_points(&circle, z0, tan_lambda),
            hit_count: hits.len(),
            chi2,
            ndf,
        })
    }

    fn name(&self) -> &'static str {
        "circle-helix"
    }
}
