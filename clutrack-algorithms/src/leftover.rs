//! Leftover-hit reconciliation.
//!
//! Hits that ended up in no segment are offered to the fitted segments. For
//! every crossing point of a fitted track on a layer where its segment has no
//! hit, the best-scoring leftover hit on that layer is attached if its
//! residual passes the track's chi-squared cut. When the best hit already
//! belongs to another segment, the two segments are merged if that segment
//! follows the current track closely enough; otherwise ownership is left
//! alone.

use std::collections::HashMap;

use clutrack_core::{
    CrossingPoints, Diagnostic, DiagnosticSink, FittedTrack, Hit, HitId, LeftoverStrategy,
    Position, ReconstructionConfig, Result, SegmentId, SegmentStore,
};

use crate::duplicates::is_contaminated;
use crate::predicates::chi2_residual;

/// Fraction of `members` whose residual against the crossing point on their
/// layer is below `chi2_max`. Hits on layers without a crossing point count
/// as incompatible.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compatible_fraction(
    hits: &[Hit],
    members: &[HitId],
    crossing_points: &CrossingPoints,
    chi2_max: f64,
) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let good = members
        .iter()
        .map(|id| &hits[id.0])
        .filter(|hit| {
            crossing_points
                .for_layer(hit.layer)
                .is_some_and(|xp| chi2_residual(hit, xp) < chi2_max)
        })
        .count();
    good as f64 / members.len() as f64
}

/// Result of [`LeftoverReconciler::reconcile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Tracks whose segments survived, in input order.
    pub tracks: Vec<FittedTrack>,
    /// Leftover hits attached to segments.
    pub assigned: usize,
    /// Segments absorbed by merges.
    pub merges: usize,
}

/// Attaches leftover hits to fitted segments.
#[derive(Debug, Clone, Copy)]
pub struct LeftoverReconciler<'a> {
    config: &'a ReconstructionConfig,
}

impl<'a> LeftoverReconciler<'a> {
    /// Creates a reconciler using `config`.
    #[must_use]
    pub fn new(config: &'a ReconstructionConfig) -> Self {
        Self { config }
    }

    /// Runs one reconciliation pass.
    ///
    /// The pool is every hit without an owner (including radially gated
    /// hits) plus, if configured, the first and last hit of every fitted
    /// segment. The best residual found for a hit is stored on it. A segment
    /// whose best candidate on a layer it already occupies is its own hit is
    /// reported as [`Diagnostic::SelfMatch`].
    ///
    /// # Errors
    /// Propagates store errors, which indicate a bookkeeping defect.
    pub fn reconcile(
        &self,
        hits: &mut [Hit],
        store: &mut SegmentStore,
        tracks: Vec<FittedTrack>,
        sink: &mut DiagnosticSink<'_>,
    ) -> Result<Reconciliation> {
        let mut pass = Pass::new(self.config, hits, store, tracks, sink);
        match self.config.leftover.strategy {
            LeftoverStrategy::BestHitPerTrack => pass.best_hit_per_track()?,
            LeftoverStrategy::BestTrackPerHit => pass.best_track_per_hit()?,
        }
        log::debug!(
            "reconciliation: {} hits assigned, {} segments merged",
            pass.assigned,
            pass.merges
        );
        Ok(pass.finish())
    }
}

/// Mutable state of one reconciliation pass.
struct Pass<'p, 'o> {
    config: &'p ReconstructionConfig,
    hits: &'p mut [Hit],
    store: &'p mut SegmentStore,
    sink: &'p mut DiagnosticSink<'o>,
    tracks: Vec<FittedTrack>,
    active: Vec<bool>,
    track_of: HashMap<SegmentId, usize>,
    by_layer: Vec<Vec<HitId>>,
    in_pool: Vec<bool>,
    assigned: usize,
    merges: usize,
}

impl<'p, 'o> Pass<'p, 'o> {
    fn new(
        config: &'p ReconstructionConfig,
        hits: &'p mut [Hit],
        store: &'p mut SegmentStore,
        tracks: Vec<FittedTrack>,
        sink: &'p mut DiagnosticSink<'o>,
    ) -> Self {
        let track_of: HashMap<SegmentId, usize> = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.segment, i))
            .collect();
        let active: Vec<bool> = tracks.iter().map(|t| store.get(t.segment).is_some()).collect();

        let mut in_pool = vec![false; hits.len()];
        for id in store.unowned() {
            in_pool[id.0] = true;
        }
        if config.leftover.include_segment_endpoints {
            // Segments without a fit take no part in reconciliation.
            for segment in store
                .iter()
                .filter(|s| track_of.get(&s.id()).is_some_and(|&i| active[i]))
            {
                for id in segment.front().into_iter().chain(segment.back()) {
                    in_pool[id.0] = true;
                }
            }
        }

        let n_layers = hits.iter().map(|h| h.layer + 1).max().unwrap_or(0);
        let mut by_layer = vec![Vec::new(); n_layers];
        for hit in hits.iter().filter(|h| in_pool[h.id.0]) {
            by_layer[hit.layer].push(hit.id);
        }

        Self {
            config,
            hits,
            store,
            sink,
            tracks,
            active,
            track_of,
            by_layer,
            in_pool,
            assigned: 0,
            merges: 0,
        }
    }

    fn finish(self) -> Reconciliation {
        let tracks = self
            .tracks
            .into_iter()
            .zip(self.active)
            .filter_map(|(t, active)| active.then_some(t))
            .collect();
        Reconciliation {
            tracks,
            assigned: self.assigned,
            merges: self.merges,
        }
    }

    fn chi2_cut(&self, track: usize) -> f64 {
        self.config
            .leftover
            .chi2_cut
            .for_omega(self.tracks[track].parameters().omega)
    }

    /// True if `segment` has a fitted track still taking part in the pass.
    fn has_track(&self, segment: SegmentId) -> bool {
        self.track_of
            .get(&segment)
            .is_some_and(|&i| self.active[i])
    }

    fn occupies(&self, segment: SegmentId, layer: usize) -> bool {
        self.store
            .get(segment)
            .is_some_and(|s| s.hits().iter().any(|id| self.hits[id.0].layer == layer))
    }

    /// Pool hit on `layer` with the smallest residual against `point`.
    fn best_in_layer(&self, layer: usize, point: &Position) -> Option<(HitId, f64)> {
        self.by_layer
            .get(layer)?
            .iter()
            .filter(|id| self.in_pool[id.0])
            .map(|&id| (id, chi2_residual(&self.hits[id.0], point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn best_hit_per_track(&mut self) -> Result<()> {
        for t in 0..self.tracks.len() {
            if !self.active[t] {
                continue;
            }
            let cut = self.chi2_cut(t);
            let crossings: Vec<(usize, Position)> = self.tracks[t]
                .crossing_points()
                .iter()
                .map(|(layer, p)| (layer, *p))
                .collect();
            for (layer, point) in crossings {
                if !self.active[t] {
                    break;
                }
                let segment = self.tracks[t].segment;
                if self.tracks[t].crossing_points().for_layer(layer).is_none() {
                    continue;
                }
                let Some((hit, chi2)) = self.best_in_layer(layer, &point) else {
                    continue;
                };
                if self.occupies(segment, layer) {
                    if chi2 < cut && self.store.owner(hit) == Some(segment) {
                        self.report_self_match(segment, hit, layer);
                    }
                    continue;
                }
                self.hits[hit.0].chi2_residual = Some(chi2);
                if chi2 < cut {
                    self.resolve(t, hit, layer)?;
                }
            }
        }
        Ok(())
    }

    fn best_track_per_hit(&mut self) -> Result<()> {
        let candidates: Vec<HitId> = self.by_layer.iter().flatten().copied().collect();
        for hit in candidates {
            if !self.in_pool[hit.0] {
                continue;
            }
            let layer = self.hits[hit.0].layer;
            if let Some(owner) = self.store.owner(hit) {
                if let Some((t, chi2)) = self.best_track(hit, layer, false) {
                    if self.tracks[t].segment == owner && chi2 < self.chi2_cut(t) {
                        self.report_self_match(owner, hit, layer);
                        continue;
                    }
                }
            }
            let Some((t, chi2)) = self.best_track(hit, layer, true) else {
                continue;
            };
            self.hits[hit.0].chi2_residual = Some(chi2);
            if chi2 < self.chi2_cut(t) {
                self.resolve(t, hit, layer)?;
            }
        }
        Ok(())
    }

    /// Active track whose crossing point on `layer` scores best against
    /// `hit`, optionally ignoring tracks whose segment occupies the layer.
    fn best_track(&self, hit: HitId, layer: usize, skip_occupied: bool) -> Option<(usize, f64)> {
        (0..self.tracks.len())
            .filter(|&t| self.active[t])
            .filter(|&t| !(skip_occupied && self.occupies(self.tracks[t].segment, layer)))
            .filter_map(|t| {
                self.tracks[t]
                    .crossing_points()
                    .for_layer(layer)
                    .map(|xp| (t, chi2_residual(&self.hits[hit.0], xp)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn report_self_match(&mut self, segment: SegmentId, hit: HitId, layer: usize) {
        log::error!("{segment} matched its own hit {hit} on layer {layer}");
        self.sink.push(Diagnostic::SelfMatch {
            segment,
            hit,
            layer,
        });
    }

    /// Applies a best match of `hit` to track `t`.
    fn resolve(&mut self, t: usize, hit: HitId, layer: usize) -> Result<()> {
        let segment = self.tracks[t].segment;
        match self.store.owner(hit) {
            None => {
                self.store.claim(segment, hit)?;
                self.in_pool[hit.0] = false;
                self.assigned += 1;
            }
            Some(owner) if owner == segment => self.report_self_match(segment, hit, layer),
            Some(owner) if !self.has_track(owner) => {
                log::debug!("{hit} belongs to unfitted {owner}; not offered to {segment}");
            }
            Some(owner) => {
                let members: Vec<HitId> = self
                    .store
                    .get(owner)
                    .map(|s| s.hits().to_vec())
                    .unwrap_or_default();
                let good_fraction = compatible_fraction(
                    self.hits,
                    &members,
                    self.tracks[t].crossing_points(),
                    self.config.leftover.compatibility_chi2,
                );
                if good_fraction > self.config.leftover.merge_fraction
                    && self.merge_if_clean(segment, owner)?
                {
                    return Ok(());
                }
                self.sink.push(Diagnostic::AmbiguousOwnership {
                    track_segment: segment,
                    owner,
                    hit,
                    good_fraction,
                });
            }
        }
        Ok(())
    }

    /// Merges the smaller of two segments into the larger unless the union
    /// would be contaminated. Returns whether the merge happened.
    fn merge_if_clean(&mut self, a: SegmentId, b: SegmentId) -> Result<bool> {
        let (len_a, len_b) = match (self.store.get(a), self.store.get(b)) {
            (Some(sa), Some(sb)) => (sa.len(), sb.len()),
            _ => return Ok(false),
        };
        let (survivor, absorbed) = if len_a >= len_b { (a, b) } else { (b, a) };
        let union: Vec<HitId> = [a, b]
            .iter()
            .filter_map(|&id| self.store.get(id))
            .flat_map(|s| s.hits().iter().copied())
            .collect();
        if is_contaminated(self.hits, &union, self.config.duplicate_fraction) {
            return Ok(false);
        }

        let absorbed_layers: Vec<usize> = self
            .store
            .get(absorbed)
            .map(|s| s.hits().iter().map(|id| self.hits[id.0].layer).collect())
            .unwrap_or_default();
        self.store.merge(survivor, absorbed)?;
        if let Some(&i) = self.track_of.get(&absorbed) {
            self.active[i] = false;
        }
        if let Some(&i) = self.track_of.get(&survivor) {
            for layer in absorbed_layers {
                self.tracks[i].fit.crossing_points.invalidate(layer);
            }
        }
        self.merges += 1;
        log::debug!("merged {absorbed} into {survivor}");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clutrack_core::{
        Chi2Cut, Covariance, FitResult, HelixParameters, LeftoverConfig, NoopObserver,
    };

    fn hit(id: usize, layer: usize, x: f64, y: f64, z: f64) -> Hit {
        Hit {
            id: HitId(id),
            position: Position::new(x, y, z),
            covariance: Covariance::from_resolution(0.1, 1.0),
            layer,
            z_bucket: 0,
            chi2_residual: None,
            truth_id: None,
            collection: 0,
        }
    }

    /// Radial line at phi = 0: layer `l` at x = 100 + 10 l.
    fn x_of(layer: usize) -> f64 {
        100.0 + 10.0 * layer as f64
    }

    fn track(segment: SegmentId, layers: impl IntoIterator<Item = usize>) -> FittedTrack {
        FittedTrack {
            segment,
            fit: FitResult {
                parameters: HelixParameters {
                    omega: 1.0e-4,
                    ..HelixParameters::default()
                },
                crossing_points: layers
                    .into_iter()
                    .map(|l| (l, Position::new(x_of(l), 0.0, 0.0)))
                    .collect(),
                hit_count: 4,
                chi2: 1.0,
                ndf: 3,
            },
        }
    }

    fn config(strategy: LeftoverStrategy) -> ReconstructionConfig {
        ReconstructionConfig::default().with_leftover(LeftoverConfig {
            strategy,
            chi2_cut: Chi2Cut::Fixed(100.0),
            ..LeftoverConfig::default()
        })
    }

    fn endpoint_config(strategy: LeftoverStrategy) -> ReconstructionConfig {
        let mut config = config(strategy);
        config.leftover.include_segment_endpoints = true;
        config
    }

    #[test]
    fn test_leftover_within_cut_is_assigned() {
        // Segment on layers 0..4; leftover hit on layer 4 off by sqrt(3) in z.
        let mut hits: Vec<Hit> = (0..4).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        hits.push(hit(4, 4, x_of(4), 0.0, 3f64.sqrt()));
        let mut store = SegmentStore::new(hits.len());
        let s = store.create((0..4).map(HitId).collect()).unwrap();

        for strategy in [LeftoverStrategy::BestHitPerTrack, LeftoverStrategy::BestTrackPerHit] {
            let mut hits = hits.clone();
            let mut store = store.clone();
            let config = config(strategy);
            let mut observer = NoopObserver;
            let mut sink = DiagnosticSink::new(&mut observer);
            let out = LeftoverReconciler::new(&config)
                .reconcile(&mut hits, &mut store, vec![track(s, 0..6)], &mut sink)
                .unwrap();

            assert_eq!(out.assigned, 1, "{strategy:?}");
            assert_eq!(store.owner(HitId(4)), Some(s));
            approx::assert_relative_eq!(hits[4].chi2_residual.unwrap(), 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_leftover_outside_cut_stays_unused() {
        let mut hits: Vec<Hit> = (0..4).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        hits.push(hit(4, 4, x_of(4), 0.0, 11.0));
        let mut store = SegmentStore::new(hits.len());
        let s = store.create((0..4).map(HitId).collect()).unwrap();

        let config = config(LeftoverStrategy::BestHitPerTrack);
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let out = LeftoverReconciler::new(&config)
            .reconcile(&mut hits, &mut store, vec![track(s, 0..6)], &mut sink)
            .unwrap();
        assert_eq!(out.assigned, 0);
        assert!(!store.is_used(HitId(4)));
        // The residual is recorded even when rejected.
        assert!(hits[4].chi2_residual.unwrap() > 100.0);
    }

    #[test]
    fn test_compatible_owner_is_merged() {
        // Two pieces of one straight track: layers 0..4 and 4..8 missing layer 4.
        let mut hits: Vec<Hit> = (0..8)
            .filter(|&l| l != 4)
            .enumerate()
            .map(|(i, l)| hit(i, l, x_of(l), 0.0, 0.0))
            .collect();
        hits.push(hit(7, 4, x_of(4), 0.0, 0.2));
        let mut store = SegmentStore::new(hits.len());
        let inner = store.create((0..4).map(HitId).collect()).unwrap();
        let outer = store.create((4..7).map(HitId).collect()).unwrap();

        let config = endpoint_config(LeftoverStrategy::BestHitPerTrack);
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let tracks = vec![track(inner, 0..8), track(outer, 0..8)];
        let out = LeftoverReconciler::new(&config)
            .reconcile(&mut hits, &mut store, tracks, &mut sink)
            .unwrap();

        // Layer 4 hit is claimed first; then the outer endpoint on layer 5
        // collides and the outer piece is absorbed by the larger inner one.
        assert_eq!(out.assigned, 1);
        assert_eq!(out.merges, 1);
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].segment, inner);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(inner).unwrap().len(), 8);
        assert!(store.get(outer).is_none());
    }

    #[test]
    fn test_incompatible_owner_is_left_alone() {
        // Track A along y = 0; segment B crosses layer 4 far from A except
        // for one endpoint that sits right on A's crossing point.
        let mut hits: Vec<Hit> = (0..4).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        hits.push(hit(4, 4, x_of(4), 0.0, 0.5));
        hits.push(hit(5, 5, x_of(5), 30.0, 0.0));
        hits.push(hit(6, 6, x_of(6), 60.0, 0.0));
        let mut store = SegmentStore::new(hits.len());
        let a = store.create((0..4).map(HitId).collect()).unwrap();
        let b = store.create((4..7).map(HitId).collect()).unwrap();

        let config = endpoint_config(LeftoverStrategy::BestHitPerTrack);
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let mut along_b = track(b, 4..7);
        along_b.fit.crossing_points = (4..7).map(|i| (i, hits[i].position)).collect();
        let out = LeftoverReconciler::new(&config)
            .reconcile(&mut hits, &mut store, vec![track(a, 0..8), along_b], &mut sink)
            .unwrap();

        assert_eq!(out.merges, 0);
        assert_eq!(store.owner(HitId(4)), Some(b));
        assert_eq!(store.get(a).unwrap().len(), 4);
        assert!(sink
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::AmbiguousOwnership { owner, .. } if *owner == b)));
    }

    #[test]
    fn test_own_endpoint_is_reported_not_claimed() {
        // The outer endpoint sits exactly on the layer 3 crossing point.
        let hits: Vec<Hit> = (0..4).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        let mut store = SegmentStore::new(hits.len());
        let s = store.create((0..4).map(HitId).collect()).unwrap();

        for strategy in [LeftoverStrategy::BestHitPerTrack, LeftoverStrategy::BestTrackPerHit] {
            let mut hits = hits.clone();
            let mut store = store.clone();
            let before = store.partition();
            let config = endpoint_config(strategy);
            let mut observer = NoopObserver;
            let mut sink = DiagnosticSink::new(&mut observer);
            let out = LeftoverReconciler::new(&config)
                .reconcile(&mut hits, &mut store, vec![track(s, 0..6)], &mut sink)
                .unwrap();

            assert_eq!(out.assigned, 0, "{strategy:?}");
            assert_eq!(out.merges, 0);
            assert_eq!(store.partition(), before);
            assert!(
                sink.entries().iter().any(|d| matches!(
                    d,
                    Diagnostic::SelfMatch { segment, hit: HitId(3), layer: 3 } if *segment == s
                )),
                "{strategy:?}"
            );
        }
    }

    #[test]
    fn test_unfitted_segment_is_never_merged() {
        // A is fitted on layers 0..4. F continues it on layers 4..8 but its
        // fit failed, so it has no track.
        let hits: Vec<Hit> = (0..8).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        let mut store = SegmentStore::new(hits.len());
        let a = store.create((0..4).map(HitId).collect()).unwrap();
        let f = store.create((4..8).map(HitId).collect()).unwrap();

        for strategy in [LeftoverStrategy::BestHitPerTrack, LeftoverStrategy::BestTrackPerHit] {
            let mut hits = hits.clone();
            let mut store = store.clone();
            let config = endpoint_config(strategy);
            let mut observer = NoopObserver;
            let mut sink = DiagnosticSink::new(&mut observer);
            let out = LeftoverReconciler::new(&config)
                .reconcile(&mut hits, &mut store, vec![track(a, 0..8)], &mut sink)
                .unwrap();

            assert_eq!(out.merges, 0, "{strategy:?}");
            assert_eq!(out.assigned, 0);
            assert_eq!(out.tracks.len(), 1);
            assert_eq!(store.get(a).unwrap().len(), 4);
            assert_eq!(store.get(f).unwrap().len(), 4);
            assert!(!sink
                .entries()
                .iter()
                .any(|d| matches!(d, Diagnostic::AmbiguousOwnership { .. })));
        }
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let mut hits: Vec<Hit> = (0..6).map(|l| hit(l, l, x_of(l), 0.0, 0.0)).collect();
        hits.push(hit(6, 7, x_of(7), 0.0, 1.0));
        hits.push(hit(7, 9, x_of(9), 0.0, 1.0));
        hits.push(hit(8, 2, x_of(2), 50.0, 0.0));
        let mut store = SegmentStore::new(hits.len());
        let s = store.create((0..6).map(HitId).collect()).unwrap();

        let config = config(LeftoverStrategy::BestHitPerTrack);
        let reconciler = LeftoverReconciler::new(&config);
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let first = reconciler
            .reconcile(&mut hits, &mut store, vec![track(s, 0..12)], &mut sink)
            .unwrap();
        assert_eq!(first.assigned, 2);
        let snapshot = store.partition();

        let second = reconciler
            .reconcile(&mut hits, &mut store, first.tracks, &mut sink)
            .unwrap();
        assert_eq!(second.assigned, 0);
        assert_eq!(second.merges, 0);
        assert_eq!(store.partition(), snapshot);
    }

    #[test]
    fn test_compatible_fraction() {
        let hits: Vec<Hit> = (0..4)
            .map(|l| hit(l, l, x_of(l), 0.0, if l < 3 { 0.0 } else { 20.0 }))
            .collect();
        let xp: CrossingPoints = (0..3).map(|l| (l, Position::new(x_of(l), 0.0, 0.0))).collect();
        let members: Vec<HitId> = (0..4).map(HitId).collect();
        approx::assert_relative_eq!(compatible_fraction(&hits, &members, &xp, 10.0), 0.75);
        approx::assert_relative_eq!(compatible_fraction(&hits, &[], &xp, 10.0), 0.0);
    }
}
