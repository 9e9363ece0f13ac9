//! Synthetic events: helices from the origin plus uniform noise.

use std::f64::consts::{FRAC_PI_2, PI};

use clutrack_core::{
    Covariance, CylindricalLayers, DetectorGeometry, Event, HitCollection, RawHit,
};

/// Name of the collection written by [`generate_event`].
pub const COLLECTION: &str = "TPCHits";

/// Transverse and longitudinal resolution of generated hits.
const SIGMA_RPHI: f64 = 0.1;
const SIGMA_Z: f64 = 1.0;

/// Linear congruential generator; identical output on every platform.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.0 = (self.0.wrapping_mul(1_103_515_245).wrapping_add(12345)) & 0x7fff_ffff;
        self.0 as f64 / 2_147_483_648.0
    }

    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Uniform smear with standard deviation `sigma`.
    fn smear(&mut self, sigma: f64) -> f64 {
        sigma * 3f64.sqrt() * self.range(-1.0, 1.0)
    }
}

/// Generates one event with `tracks` helices and `noise` random hits.
///
/// Track hits carry their track index as truth id; noise hits carry none.
pub fn generate_event(
    geometry: &CylindricalLayers,
    rng: &mut Lcg,
    number: u64,
    tracks: usize,
    noise: usize,
) -> Event {
    let covariance = Covariance::from_resolution(SIGMA_RPHI, SIGMA_Z);
    let mut hits = Vec::new();

    for track in 0..tracks {
        let radius = rng.range(600.0, 5000.0);
        let charge = if rng.next_f64() < 0.5 { -1.0 } else { 1.0 };
        let phi0 = rng.range(-PI, PI);
        let tan_lambda = rng.range(-1.2, 1.2);
        let to_centre = phi0 + charge * FRAC_PI_2;

        for layer in 0..geometry.layer_count() {
            let Some(rho) = geometry.layer_radius(layer) else {
                break;
            };
            let half_chord = rho / (2.0 * radius);
            if half_chord >= 0.95 {
                break;
            }
            let phi = to_centre - charge * half_chord.acos() + rng.smear(SIGMA_RPHI) / rho;
            let z = tan_lambda * 2.0 * radius * half_chord.asin() + rng.smear(SIGMA_Z);
            if z.abs() > 2700.0 {
                break;
            }
            hits.push(
                RawHit::new(rho * phi.cos(), rho * phi.sin(), z)
                    .with_covariance(covariance)
                    .with_truth(track as u64),
            );
        }
    }

    for _ in 0..noise {
        let rho = rng.range(geometry.r_min(), geometry.r_max());
        let phi = rng.range(-PI, PI);
        let z = rng.range(-2700.0, 2700.0);
        hits.push(RawHit::new(rho * phi.cos(), rho * phi.sin(), z).with_covariance(covariance));
    }

    Event::new(number).with_collection(HitCollection::new(COLLECTION, hits))
}
