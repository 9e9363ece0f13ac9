mod common;

use approx::assert_relative_eq;
use clutrack_algorithms::{
    reconstruct_event, CircleHelixFitter, DuplicateRepair, NearestNeighborClusterer,
    ProximityPredicate, ReconstructionConfig, SweepMode,
};
use clutrack_core::{
    CylindricalLayers, DetectorGeometry, DiagnosticSink, Hit, HitId, LeftoverConfig,
    NoopObserver, Position, RawHit, SegmentStore,
};
use common::Helix;

fn helix() -> Helix {
    Helix {
        radius: 1500.0,
        charge: 1.0,
        phi0: 0.2,
        tan_lambda: 0.2,
    }
}

fn table(geometry: &CylindricalLayers, raw: &[RawHit]) -> Vec<Hit> {
    raw.iter()
        .enumerate()
        .map(|(i, r)| Hit {
            id: HitId(i),
            position: r.position,
            covariance: r.covariance,
            layer: geometry.layer_index_of(&r.position),
            z_bucket: 0,
            chi2_residual: None,
            truth_id: r.truth_id,
            collection: 0,
        })
        .collect()
}

#[test]
fn test_twelve_consecutive_layers_form_one_segment() {
    let geometry = CylindricalLayers::default();
    let hits = table(&geometry, &helix().hits(&geometry, 0..12));
    let items: Vec<&Hit> = hits.iter().collect();
    let buckets = vec![0; items.len()];

    let groups = NearestNeighborClusterer::new(3)
        .with_mode(SweepMode::SortedByBucket)
        .cluster(&items, &buckets, &ProximityPredicate::new(40.0))
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 12);

    let mut store = SegmentStore::new(hits.len());
    store.create(hits.iter().map(|h| h.id).collect()).unwrap();
    let config = ReconstructionConfig::default();
    assert!(DuplicateRepair::new(&config)
        .contaminated_segments(&hits, &store)
        .is_empty());
}

/// Nine hits on a helix plus a second hit on layer 5, 30 mm off the track.
fn contaminated_hits(geometry: &CylindricalLayers) -> Vec<RawHit> {
    let mut raw = helix().hits(geometry, 0..9);
    let on_track = raw[5].position;
    let rho = on_track.rho();
    let phi = on_track.phi() + 30.0 / rho;
    raw.push(RawHit::new(rho * phi.cos(), rho * phi.sin(), on_track.z));
    raw
}

#[test]
fn test_contaminated_segment_is_split() {
    let geometry = CylindricalLayers::default();
    let hits = table(&geometry, &contaminated_hits(&geometry));
    assert_eq!(hits[5].layer, hits[9].layer);

    let config = ReconstructionConfig::default();
    let mut store = SegmentStore::new(hits.len());
    let id = store.create(hits.iter().map(|h| h.id).collect()).unwrap();
    let repair = DuplicateRepair::new(&config);
    assert!(repair.is_contaminated(&hits, store.get(id).unwrap()));

    let mut observer = NoopObserver;
    let mut sink = DiagnosticSink::new(&mut observer);
    let report = repair.repair(&hits, &mut store, &mut sink).unwrap();

    assert_eq!(report.contaminated, 1);
    assert_eq!(report.passes, 1);
    assert_ne!(store.owner(HitId(5)), store.owner(HitId(9)));
    assert!(repair.contaminated_segments(&hits, &store).is_empty());
}

#[test]
fn test_contaminated_event_end_to_end() {
    let geometry = CylindricalLayers::default();
    let fitter = CircleHelixFitter::new(geometry.clone());
    let out = reconstruct_event(
        &common::event(2, contaminated_hits(&geometry)),
        &ReconstructionConfig::default(),
        &geometry,
        &fitter,
        &mut NoopObserver,
    )
    .unwrap();

    assert_eq!(out.statistics.contaminated_segments, 1);
    assert_eq!(out.tracks.len(), 1);
    assert_eq!(out.tracks[0].hits.len(), 9);
    assert_eq!(out.unused, vec![HitId(9)]);
}

#[test]
fn test_split_track_is_merged_by_helix() {
    let geometry = CylindricalLayers::default();
    let fitter = CircleHelixFitter::new(geometry.clone());
    let h = helix();
    let mut raw = h.hits(&geometry, 0..11);
    raw.extend(h.hits(&geometry, 30..41));

    // Without endpoint matching the reconciler leaves both halves alone.
    let config = ReconstructionConfig::default().with_leftover(LeftoverConfig {
        include_segment_endpoints: false,
        ..LeftoverConfig::default()
    });
    let out = reconstruct_event(
        &common::event(4, raw.clone()),
        &config,
        &geometry,
        &fitter,
        &mut NoopObserver,
    )
    .unwrap();
    assert_eq!(out.segments.len(), 2);
    assert_eq!(out.tracks.len(), 1);
    assert!(out.tracks[0].is_merged());
    assert_eq!(out.tracks[0].hits.len(), 22);
    assert_relative_eq!(out.tracks[0].parameters.radius().abs(), 1500.0, max_relative = 1e-3);

    // Merging disabled: one track per segment.
    let unmerged = reconstruct_event(
        &common::event(4, raw),
        &config.with_merging(false),
        &geometry,
        &fitter,
        &mut NoopObserver,
    )
    .unwrap();
    assert_eq!(unmerged.tracks.len(), 2);
    assert_eq!(unmerged.statistics.merged_tracks, 0);
}

#[test]
fn test_gated_hits_stay_out_of_clustering() {
    let geometry = CylindricalLayers::default();
    let fitter = CircleHelixFitter::new(geometry.clone());
    let raw = helix().hits(&geometry, 0..12);
    // Every hit lies inside r_cut, so nothing is clustered.
    let config = ReconstructionConfig::default().with_r_cut(2000.0);
    let out =
        reconstruct_event(&common::event(5, raw), &config, &geometry, &fitter, &mut NoopObserver)
            .unwrap();
    assert_eq!(out.statistics.gated_hits, 12);
    assert!(out.tracks.is_empty());
    assert_eq!(out.unused.len(), 12);
}

#[test]
fn test_gated_hits_are_recovered_by_reconciliation() {
    let geometry = CylindricalLayers::default();
    let fitter = CircleHelixFitter::new(geometry.clone());
    let raw = helix().hits(&geometry, 0..40);
    // Layers 0..9 lie inside r_cut; the outer 31 hits form the segment.
    let config = ReconstructionConfig::default().with_r_cut(440.0);
    let out =
        reconstruct_event(&common::event(6, raw), &config, &geometry, &fitter, &mut NoopObserver)
            .unwrap();

    assert_eq!(out.statistics.gated_hits, 9);
    assert_eq!(out.statistics.assigned_hits, out.statistics.gated_hits);
    assert!(out.unused.is_empty());
    assert_eq!(out.segments.len(), 1);
    assert_eq!(out.tracks.len(), 1);
    assert_eq!(out.tracks[0].hits.len(), 40);
}

#[test]
fn test_position_round_trip_through_layers() {
    let geometry = CylindricalLayers::default();
    let rho = geometry.layer_radius(17).unwrap();
    let p = Position::from_cylindrical(rho, 1.0, 5.0);
    assert_eq!(geometry.layer_index_of(&p), 17);
}
