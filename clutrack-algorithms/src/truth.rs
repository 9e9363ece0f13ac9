//! Truth-based quality check of reconstructed tracks.
//!
//! Only meaningful for simulated events whose hits carry a truth id.

use std::collections::BTreeMap;

use clutrack_core::{Hit, Track};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum fraction of a track's hits that must come from one particle.
pub const PURITY_THRESHOLD: f64 = 0.99;

/// Share range (exclusive) that marks a track as a fragment of a particle.
pub const SPLIT_SHARE_RANGE: (f64, f64) = (0.03, 0.95);

/// A track whose hits come from more than one particle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImpureTrack {
    /// Index into the track list.
    pub track: usize,
    /// Particle contributing the most hits, if any hit had truth.
    pub dominant: Option<u64>,
    /// Fraction of the track's hits from the dominant particle.
    pub purity: f64,
}

/// A particle whose hits are spread over several tracks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SplitParticle {
    /// Particle label.
    pub truth_id: u64,
    /// (track index, share of the particle's reconstructed hits)
    pub shares: Vec<(usize, f64)>,
}

/// Result of [`check_truth`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthReport {
    /// Tracks below the purity threshold.
    pub impure: Vec<ImpureTrack>,
    /// Particles spread over several tracks.
    pub split: Vec<SplitParticle>,
}

impl TruthReport {
    /// True if no track is impure and no particle is split.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.impure.is_empty() && self.split.is_empty()
    }
}

/// Compares tracks against the truth ids of their hits.
///
/// Hits without a truth id count against purity but belong to no particle.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn check_truth(hits: &[Hit], tracks: &[Track]) -> TruthReport {
    let mut report = TruthReport::default();
    // particle -> track -> hits
    let mut per_particle: BTreeMap<u64, BTreeMap<usize, usize>> = BTreeMap::new();

    for (index, track) in tracks.iter().enumerate() {
        if track.hits.is_empty() {
            continue;
        }
        let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
        for id in &track.hits {
            if let Some(truth) = hits.get(id.index()).and_then(|h| h.truth_id) {
                *counts.entry(truth).or_default() += 1;
                *per_particle
                    .entry(truth)
                    .or_default()
                    .entry(index)
                    .or_default() += 1;
            }
        }

        let dominant = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&id, &n)| (id, n));
        let purity = dominant.map_or(0.0, |(_, n)| n as f64 / track.hits.len() as f64);
        if purity < PURITY_THRESHOLD {
            log::debug!(
                "track {index} is impure: {:.1}% of hits from one particle",
                100.0 * purity
            );
            report.impure.push(ImpureTrack {
                track: index,
                dominant: dominant.map(|(id, _)| id),
                purity,
            });
        }
    }

    let (low, high) = SPLIT_SHARE_RANGE;
    for (truth_id, by_track) in per_particle {
        if by_track.len() < 2 {
            continue;
        }
        let total: usize = by_track.values().sum();
        let shares: Vec<(usize, f64)> = by_track
            .into_iter()
            .map(|(track, n)| (track, n as f64 / total as f64))
            .filter(|&(_, share)| share > low && share < high)
            .collect();
        if !shares.is_empty() {
            report.split.push(SplitParticle { truth_id, shares });
        }
    }
    report
}
