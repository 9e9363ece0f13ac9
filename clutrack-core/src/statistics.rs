//! Reconstruction counters.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters for one reconstructed event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconstructionStatistics {
    /// Hits read from the input collections.
    pub hit_count: usize,
    /// Hit records rejected as invalid.
    pub invalid_hits: usize,
    /// Hits kept out of clustering by the radial gate.
    pub gated_hits: usize,
    /// Segments from the initial clustering.
    pub initial_segments: usize,
    /// Initial segments flagged as contaminated.
    pub contaminated_segments: usize,
    /// Repair passes that ran.
    pub repair_passes: usize,
    /// Hits released because contamination could not be resolved.
    pub unresolved_hits: usize,
    /// Clean segments handed to the fitter.
    pub clean_segments: usize,
    /// Segment fits that failed.
    pub failed_fits: usize,
    /// Leftover hits attached to segments.
    pub assigned_hits: usize,
    /// Segments absorbed by reconciliation merges.
    pub reconciliation_merges: usize,
    /// Final tracks.
    pub track_count: usize,
    /// Final tracks built from more than one segment.
    pub merged_tracks: usize,
    /// Hits owned by a segment at the end.
    pub used_hits: usize,
    /// Hits owned by no segment at the end.
    pub unused_hits: usize,
    /// Wall time spent on the event.
    pub elapsed: Duration,
}

impl ReconstructionStatistics {
    /// Fraction of hits that ended up on a track.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_fraction(&self) -> f64 {
        let total = self.used_hits + self.unused_hits;
        if total == 0 {
            0.0
        } else {
            self.used_hits as f64 / total as f64
        }
    }

    /// Average number of hits per final track.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hits_per_track(&self) -> f64 {
        if self.track_count == 0 {
            0.0
        } else {
            self.used_hits as f64 / self.track_count as f64
        }
    }
}

/// Totals over a run of events.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStatistics {
    /// Events processed.
    pub events: usize,
    /// Summed per-event counters.
    pub totals: ReconstructionStatistics,
}

impl RunStatistics {
    /// Adds the counters of one event.
    pub fn accumulate(&mut self, event: &ReconstructionStatistics) {
        let t = &mut self.totals;
        self.events += 1;
        t.hit_count += event.hit_count;
        t.invalid_hits += event.invalid_hits;
        t.gated_hits += event.gated_hits;
        t.initial_segments += event.initial_segments;
        t.contaminated_segments += event.contaminated_segments;
        t.repair_passes += event.repair_passes;
        t.unresolved_hits += event.unresolved_hits;
        t.clean_segments += event.clean_segments;
        t.failed_fits += event.failed_fits;
        t.assigned_hits += event.assigned_hits;
        t.reconciliation_merges += event.reconciliation_merges;
        t.track_count += event.track_count;
        t.merged_tracks += event.merged_tracks;
        t.used_hits += event.used_hits;
        t.unused_hits += event.unused_hits;
        t.elapsed += event.elapsed;
    }

    /// Hits processed per second over the whole run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let secs = self.totals.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.totals.hit_count as f64 / secs
        } else {
            0.0
        }
    }
}
