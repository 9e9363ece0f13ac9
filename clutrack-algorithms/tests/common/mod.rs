//! Synthetic events for the integration tests.
#![allow(dead_code, clippy::cast_precision_loss, clippy::unreadable_literal)]

use std::f64::consts::FRAC_PI_2;

use clutrack_core::{CylindricalLayers, DetectorGeometry, Event, HitCollection, RawHit};

/// A helix starting at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Helix {
    /// Unsigned radius of the transverse circle.
    pub radius: f64,
    /// +1 for counter-clockwise, -1 for clockwise.
    pub charge: f64,
    /// Initial azimuth.
    pub phi0: f64,
    pub tan_lambda: f64,
}

impl Helix {
    /// Point where the helix crosses the cylinder of radius `rho`, if it
    /// reaches it.
    pub fn at_rho(&self, rho: f64) -> Option<RawHit> {
        let half_chord = rho / (2.0 * self.radius);
        if half_chord >= 0.95 {
            return None;
        }
        let to_centre = self.phi0 + self.charge * FRAC_PI_2;
        let phi = to_centre - self.charge * half_chord.acos();
        let arc = 2.0 * self.radius * half_chord.asin();
        Some(RawHit::new(
            rho * phi.cos(),
            rho * phi.sin(),
            self.tan_lambda * arc,
        ))
    }

    /// One hit per listed layer.
    pub fn hits(
        &self,
        geometry: &CylindricalLayers,
        layers: impl Iterator<Item = usize>,
    ) -> Vec<RawHit> {
        layers
            .filter_map(|l| geometry.layer_radius(l))
            .filter_map(|rho| self.at_rho(rho))
            .collect()
    }
}

/// Single-collection event.
pub fn event(number: u64, hits: Vec<RawHit>) -> Event {
    Event::new(number).with_collection(HitCollection::new("TPCHits", hits))
}

/// Linear congruential generator, reproducible across platforms.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.0 = (self.0.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fffffff;
        self.0 as f64 / 2147483648.0
    }

    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// `tracks` random helices over every layer plus `noise` uniform hits.
///
/// Track hits carry their track index as truth id.
pub fn random_event(
    geometry: &CylindricalLayers,
    seed: u64,
    tracks: usize,
    noise: usize,
) -> Event {
    let mut rng = Lcg::new(seed);
    let mut hits = Vec::new();
    for t in 0..tracks {
        let helix = Helix {
            radius: rng.range(900.0, 4000.0),
            charge: if rng.next_f64() < 0.5 { -1.0 } else { 1.0 },
            phi0: rng.range(-std::f64::consts::PI, std::f64::consts::PI),
            tan_lambda: rng.range(-1.0, 1.0),
        };
        hits.extend(
            helix
                .hits(geometry, 0..geometry.layer_count())
                .into_iter()
                .map(|h| h.with_truth(t as u64)),
        );
    }
    for _ in 0..noise {
        let rho = rng.range(geometry.r_min(), geometry.r_max());
        let phi = rng.range(-std::f64::consts::PI, std::f64::consts::PI);
        let z = rng.range(-2000.0, 2000.0);
        hits.push(RawHit::new(rho * phi.cos(), rho * phi.sin(), z));
    }
    event(seed, hits)
}
