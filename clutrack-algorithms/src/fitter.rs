//! Fitter adapter: hit ordering, direction heuristic and parallel fits.

use rayon::prelude::*;

use clutrack_core::{
    FitConfig, FitError, FitResult, Hit, HitOrder, Segment, SegmentId, SegmentStore, TrackFitter,
};

/// Orders the hits of `segment` for fitting.
///
/// Hits are sorted by layer in the configured direction. The sequence is
/// reversed when the |z| trend says the particle curls back towards the
/// axis, on the assumption that it came from the interaction point.
#[must_use]
pub fn ordered_hits<'h>(hits: &'h [Hit], segment: &Segment, config: &FitConfig) -> Vec<&'h Hit> {
    let mut ordered: Vec<&Hit> = segment.hits().iter().map(|id| &hits[id.0]).collect();
    match config.order {
        HitOrder::Outgoing => ordered.sort_by_key(|h| h.layer),
        HitOrder::Incoming => ordered.sort_by_key(|h| std::cmp::Reverse(h.layer)),
    }

    if let (Some(first), Some(last)) = (ordered.first(), ordered.last()) {
        let reverse = match config.order {
            HitOrder::Outgoing => first.abs_z() > last.abs_z() + config.reverse_margin,
            HitOrder::Incoming => last.abs_z() > first.abs_z() + config.reverse_margin,
        };
        if reverse {
            ordered.reverse();
        }
    }
    ordered
}

/// Runs a [`TrackFitter`] over segments.
#[derive(Clone, Copy)]
pub struct FitterAdapter<'a> {
    fitter: &'a dyn TrackFitter,
    config: &'a FitConfig,
}

impl<'a> FitterAdapter<'a> {
    /// Creates an adapter.
    #[must_use]
    pub fn new(fitter: &'a dyn TrackFitter, config: &'a FitConfig) -> Self {
        Self { fitter, config }
    }

    /// Fits one segment.
    ///
    /// # Errors
    /// The fitter's error.
    pub fn fit_segment(&self, hits: &[Hit], segment: &Segment) -> Result<FitResult, FitError> {
        let ordered = ordered_hits(hits, segment, self.config);
        self.fitter.fit(&ordered, self.config.order)
    }

    /// Fits every listed segment.
    ///
    /// Fits are independent and run in parallel; results come back in the
    /// order of `ids`. Inactive ids are skipped.
    #[must_use]
    pub fn fit_all(
        &self,
        hits: &[Hit],
        store: &SegmentStore,
        ids: &[SegmentId],
    ) -> Vec<(SegmentId, Result<FitResult, FitError>)> {
        ids.par_iter()
            .filter_map(|&id| store.get(id).map(|s| (id, self.fit_segment(hits, s))))
            .collect()
    }

    /// Name of the wrapped fitter.
    #[must_use]
    pub fn fitter_name(&self) -> &'static str {
        self.fitter.name()
    }
}
