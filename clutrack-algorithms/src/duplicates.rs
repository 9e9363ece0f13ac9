//! Duplicate-layer detection and repair.
//!
//! A segment is contaminated when too many of its hits share a detector layer
//! with another of its hits. Contaminated segments are dissolved and their
//! hits re-clustered inside bounded layer ranges, pass by pass, with shifted
//! range boundaries.

use std::collections::HashMap;

use clutrack_core::{
    Diagnostic, DiagnosticSink, Hit, HitId, ReconstructionConfig, Result, Segment, SegmentId,
    SegmentStore, Stage,
};

use crate::nn::{NearestNeighborClusterer, SweepMode};
use crate::predicates::ProximityPredicate;

/// Number of hits that share their layer with another hit of the group.
#[must_use]
pub fn duplicate_layer_hits(hits: &[Hit], members: &[HitId]) -> usize {
    let mut per_layer: HashMap<usize, usize> = HashMap::with_capacity(members.len());
    for id in members {
        *per_layer.entry(hits[id.0].layer).or_default() += 1;
    }
    per_layer.values().filter(|&&n| n > 1).sum()
}

/// True if the duplicate-layer fraction of `members` exceeds `fraction`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn is_contaminated(hits: &[Hit], members: &[HitId], fraction: f64) -> bool {
    if members.is_empty() {
        return false;
    }
    duplicate_layer_hits(hits, members) as f64 / members.len() as f64 > fraction
}

/// Outcome of [`DuplicateRepair::repair`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Segments contaminated before repair.
    pub contaminated: usize,
    /// Passes that ran.
    pub passes: usize,
    /// Clean segments created by repair (after rejoining).
    pub repaired: Vec<SegmentId>,
    /// Hits released because they were still contaminated after the last pass.
    pub released: Vec<HitId>,
    /// Groups formed from more than one piece in the rejoin step.
    pub rejoined: usize,
}

fn segment_refs<'s>(store: &'s SegmentStore, ids: &[SegmentId]) -> Vec<&'s Segment> {
    ids.iter().filter_map(|&id| store.get(id)).collect()
}

/// Detects and repairs contaminated segments.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateRepair<'a> {
    config: &'a ReconstructionConfig,
}

impl<'a> DuplicateRepair<'a> {
    /// Creates a repairer using `config`.
    #[must_use]
    pub fn new(config: &'a ReconstructionConfig) -> Self {
        Self { config }
    }

    /// True if `segment` is contaminated.
    #[must_use]
    pub fn is_contaminated(&self, hits: &[Hit], segment: &Segment) -> bool {
        is_contaminated(hits, segment.hits(), self.config.duplicate_fraction)
    }

    /// Active segments that are contaminated, in creation order.
    #[must_use]
    pub fn contaminated_segments(&self, hits: &[Hit], store: &SegmentStore) -> Vec<SegmentId> {
        store
            .iter()
            .filter(|s| self.is_contaminated(hits, s))
            .map(Segment::id)
            .collect()
    }

    /// Repairs every contaminated segment in `store`.
    ///
    /// On return no active segment is contaminated. Hits that could not be
    /// placed in a clean segment are left unowned.
    ///
    /// # Errors
    /// Propagates store or clustering errors, which indicate a bookkeeping
    /// defect rather than bad input.
    pub fn repair(
        &self,
        hits: &[Hit],
        store: &mut SegmentStore,
        sink: &mut DiagnosticSink<'_>,
    ) -> Result<RepairReport> {
        let mut report = RepairReport::default();
        let initial = self.contaminated_segments(hits, store);
        report.contaminated = initial.len();
        if initial.is_empty() {
            return Ok(report);
        }
        sink.segments(Stage::Contaminated, &segment_refs(store, &initial));

        let mut loose = Vec::new();
        for id in initial {
            loose.extend(store.dissolve(id)?);
        }

        let repair = &self.config.repair;
        let mut pieces = Vec::new();
        for pass in 0..repair.passes {
            if loose.is_empty() {
                break;
            }
            report.passes += 1;
            let created = self.recluster(hits, &loose, store, |hit| {
                repair.row_bucket(hit.layer, pass)
            })?;
            sink.segments(Stage::RepairPass { pass }, &segment_refs(store, &created));

            loose.clear();
            let (still, clean): (Vec<_>, Vec<_>) = created.into_iter().partition(|&id| {
                store.get(id).is_some_and(|s| self.is_contaminated(hits, s))
            });
            pieces.extend(clean);
            sink.segments(
                Stage::StillContaminated { pass },
                &segment_refs(store, &still),
            );
            for id in still {
                loose.extend(store.dissolve(id)?);
            }
            log::debug!(
                "repair pass {pass}: {} clean pieces, {} hits still contaminated",
                pieces.len(),
                loose.len()
            );
        }

        if !loose.is_empty() {
            log::warn!(
                "{} hits still contaminated after {} repair passes; left unused",
                loose.len(),
                report.passes
            );
            sink.push(Diagnostic::UnresolvedContamination { hits: loose.len() });
            loose.sort_unstable();
            report.released = loose;
        }

        if repair.rejoin && pieces.len() > 1 {
            let (rejoined, merged) = self.rejoin(hits, store, &pieces)?;
            pieces = rejoined;
            report.rejoined = merged;
            sink.segments(Stage::Rejoined, &segment_refs(store, &pieces));
        }
        report.repaired = pieces;
        Ok(report)
    }

    /// Clusters `loose` hits with the split distance cut, bucketed by
    /// `bucket_of`, and registers every group as a new segment.
    fn recluster<F>(
        &self,
        hits: &[Hit],
        loose: &[HitId],
        store: &mut SegmentStore,
        bucket_of: F,
    ) -> Result<Vec<SegmentId>>
    where
        F: Fn(&Hit) -> i32,
    {
        let mut items: Vec<&Hit> = loose.iter().map(|id| &hits[id.0]).collect();
        items.sort_by(|a, b| {
            bucket_of(a)
                .cmp(&bucket_of(b))
                .then(a.position.z.total_cmp(&b.position.z))
        });
        let buckets: Vec<i32> = items.iter().map(|h| bucket_of(h)).collect();

        let groups = NearestNeighborClusterer::new(self.config.min_segment_size)
            .with_mode(SweepMode::SortedByBucket)
            .cluster(
                &items,
                &buckets,
                &ProximityPredicate::new(self.config.split_distance_cut),
            )?;

        groups
            .into_iter()
            .map(|group| store.create(group.into_iter().map(|i| items[i].id).collect()))
            .collect()
    }

    /// Re-clusters clean pieces with their z buckets so tracks cut at a range
    /// boundary come back together.
    ///
    /// A group is kept only if it consists of whole pieces and is clean;
    /// otherwise the pieces involved are restored as they were. Returns the
    /// resulting segments and the number of groups built from several pieces.
    fn rejoin(
        &self,
        hits: &[Hit],
        store: &mut SegmentStore,
        pieces: &[SegmentId],
    ) -> Result<(Vec<SegmentId>, usize)> {
        let mut members = Vec::with_capacity(pieces.len());
        let mut piece_of = HashMap::new();
        for (p, &id) in pieces.iter().enumerate() {
            let released = store.dissolve(id)?;
            for &hit in &released {
                piece_of.insert(hit, p);
            }
            members.push(released);
        }
        let loose: Vec<HitId> = members.iter().flatten().copied().collect();
        let mut items: Vec<&Hit> = loose.iter().map(|id| &hits[id.0]).collect();
        items.sort_by(|a, b| {
            a.z_bucket
                .cmp(&b.z_bucket)
                .then(a.position.z.total_cmp(&b.position.z))
        });
        let buckets: Vec<i32> = items.iter().map(|h| h.z_bucket).collect();

        let groups = NearestNeighborClusterer::new(self.config.min_segment_size)
            .with_mode(SweepMode::SortedByBucket)
            .cluster(
                &items,
                &buckets,
                &ProximityPredicate::new(self.config.split_distance_cut),
            )?;

        let mut consumed = vec![false; members.len()];
        let mut out = Vec::with_capacity(pieces.len());
        let mut merged = 0;
        for group in groups {
            let ids: Vec<HitId> = group.into_iter().map(|i| items[i].id).collect();
            let mut involved: Vec<usize> =
                ids.iter().filter_map(|h| piece_of.get(h)).copied().collect();
            involved.sort_unstable();
            involved.dedup();
            let whole = involved.iter().map(|&p| members[p].len()).sum::<usize>() == ids.len();
            if !whole || is_contaminated(hits, &ids, self.config.duplicate_fraction) {
                continue;
            }
            if involved.len() > 1 {
                merged += 1;
            }
            for &p in &involved {
                consumed[p] = true;
            }
            out.push(store.create(ids)?);
        }
        for (p, piece) in members.into_iter().enumerate() {
            if !consumed[p] {
                out.push(store.create(piece)?);
            }
        }
        Ok((out, merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clutrack_core::{Covariance, NoopObserver, Position};

    fn hit(id: usize, x: f64, y: f64, z: f64, layer: usize) -> Hit {
        Hit {
            id: HitId(id),
            position: Position::new(x, y, z),
            covariance: Covariance::default(),
            layer,
            z_bucket: 100,
            chi2_residual: None,
            truth_id: None,
            collection: 0,
        }
    }

    /// Track A on layers 0..=5 along y = 0, track B on layers 5..=8 at y = 25.
    fn crossing_tracks() -> Vec<Hit> {
        let mut hits = Vec::new();
        for layer in 0..=5 {
            let x = 105.0 + 10.0 * layer as f64;
            hits.push(hit(hits.len(), x, 0.0, 0.0, layer));
        }
        for layer in 5..=8 {
            let x = 105.0 + 10.0 * layer as f64;
            hits.push(hit(hits.len(), x, 25.0, 0.0, layer));
        }
        hits
    }

    #[test]
    fn test_duplicate_fraction() {
        let hits = crossing_tracks();
        let all: Vec<HitId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(duplicate_layer_hits(&hits, &all), 2);
        assert!(is_contaminated(&hits, &all, 0.01));
        assert!(!is_contaminated(&hits, &all, 0.2));
        assert!(!is_contaminated(&hits, &all[..6], 0.01));
        assert!(!is_contaminated(&hits, &[], 0.01));
    }

    #[test]
    fn test_repair_separates_crossing_tracks() {
        let hits = crossing_tracks();
        let config = ReconstructionConfig::default();
        let mut store = SegmentStore::new(hits.len());
        store.create(hits.iter().map(|h| h.id).collect()).unwrap();

        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let report = DuplicateRepair::new(&config)
            .repair(&hits, &mut store, &mut sink)
            .unwrap();

        assert_eq!(report.contaminated, 1);
        assert_eq!(report.passes, 1);
        assert!(report.released.is_empty());
        assert_eq!(store.len(), 2);
        let mut sizes: Vec<usize> = store.iter().map(Segment::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![4, 6]);
        // The two layer-5 hits end up in different segments.
        assert_ne!(store.owner(HitId(5)), store.owner(HitId(6)));
        let repair = DuplicateRepair::new(&config);
        assert!(repair.contaminated_segments(&hits, &store).is_empty());
    }

    #[test]
    fn test_clean_segments_untouched() {
        let hits = crossing_tracks();
        let config = ReconstructionConfig::default();
        let mut store = SegmentStore::new(hits.len());
        let a = store.create((0..6).map(HitId).collect()).unwrap();

        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let report = DuplicateRepair::new(&config)
            .repair(&hits, &mut store, &mut sink)
            .unwrap();
        assert_eq!(report, RepairReport::default());
        assert_eq!(store.ids(), vec![a]);
    }

    #[test]
    fn test_unresolvable_hits_are_released() {
        // Two hits on the same layer 5 units apart plus a third: every
        // grouping of them is contaminated.
        let hits = vec![
            hit(0, 100.0, 0.0, 0.0, 3),
            hit(1, 100.0, 5.0, 0.0, 3),
            hit(2, 110.0, 2.0, 0.0, 4),
            hit(3, 110.0, 7.0, 0.0, 4),
        ];
        let config = ReconstructionConfig::default();
        let mut store = SegmentStore::new(hits.len());
        store.create((0..4).map(HitId).collect()).unwrap();

        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let report = DuplicateRepair::new(&config)
            .repair(&hits, &mut store, &mut sink)
            .unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.released, (0..4).map(HitId).collect::<Vec<_>>());
        assert!(store.is_empty());
        assert_eq!(store.unowned().count(), 4);
        assert!(matches!(
            sink.entries(),
            [Diagnostic::UnresolvedContamination { hits: 4 }]
        ));
    }

    #[test]
    fn test_rejoin_restores_track_cut_at_range_boundary() {
        // One straight track over layers 5..=14 plus a stray hit that
        // contaminates it on layer 12. The first pass cuts at layer 10.
        let mut hits: Vec<Hit> = (5..=14)
            .map(|layer| hit(layer - 5, 100.0 + 10.0 * layer as f64, 0.0, 0.0, layer))
            .collect();
        hits.push(hit(10, 220.0, 60.0, 0.0, 12));
        let config = ReconstructionConfig::default();
        let mut store = SegmentStore::new(hits.len());
        store.create((0..11).map(HitId).collect()).unwrap();

        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let report = DuplicateRepair::new(&config)
            .repair(&hits, &mut store, &mut sink)
            .unwrap();

        assert_eq!(report.rejoined, 1);
        assert_eq!(store.len(), 1);
        let track = store.iter().next().unwrap();
        assert_eq!(track.len(), 10);
        assert!(!store.is_used(HitId(10)));
    }
}
