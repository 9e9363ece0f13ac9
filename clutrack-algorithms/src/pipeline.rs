//! Per-event reconstruction: annotation through final merging.

use std::time::Instant;

use clutrack_core::{
    DetectorGeometry, Diagnostic, DiagnosticSink, Event, FittedTrack, Hit, HitId,
    PipelineObserver, ReconstructionConfig, ReconstructionStatistics, Result, RunStatistics,
    Segment, SegmentId, SegmentStore, Stage, Track, TrackFitter,
};

use crate::annotate::annotate_event;
use crate::duplicates::DuplicateRepair;
use crate::fitter::FitterAdapter;
use crate::leftover::LeftoverReconciler;
use crate::merge::{merge_tracks, unmerged_tracks};
use crate::nn::{NearestNeighborClusterer, SweepMode};
use crate::predicates::ProximityPredicate;

/// Everything produced for one event.
#[derive(Debug, Clone, Default)]
pub struct EventReconstruction {
    /// Event number from the input.
    pub event: u64,
    /// Annotated hit table; `HitId`s index into it.
    pub hits: Vec<Hit>,
    /// Clean segments as handed to the fitter, before reconciliation.
    pub segments: Vec<Segment>,
    /// Refitted segment tracks after reconciliation.
    pub segment_tracks: Vec<FittedTrack>,
    /// Final tracks.
    pub tracks: Vec<Track>,
    /// Hits owned by a segment at the end of the event.
    pub used: Vec<HitId>,
    /// Hits owned by no segment.
    pub unused: Vec<HitId>,
    /// Recoverable problems met along the way.
    pub diagnostics: Vec<Diagnostic>,
    /// Per-event counters.
    pub statistics: ReconstructionStatistics,
}

/// Clusters the clusterable hits into initial segments.
fn initial_segments(
    hits: &[Hit],
    clusterable: &[HitId],
    config: &ReconstructionConfig,
    store: &mut SegmentStore,
) -> Result<Vec<SegmentId>> {
    let items: Vec<&Hit> = clusterable.iter().map(|id| &hits[id.0]).collect();
    let buckets: Vec<i32> = items.iter().map(|h| h.z_bucket).collect();
    let groups = NearestNeighborClusterer::new(config.min_segment_size)
        .with_mode(SweepMode::SortedByBucket)
        .cluster(
            &items,
            &buckets,
            &ProximityPredicate::new(config.distance_cut),
        )?;
    groups
        .into_iter()
        .map(|group| store.create(group.into_iter().map(|i| items[i].id).collect()))
        .collect()
}

/// Fits the active segments in `ids`, reporting failures.
///
/// Segments whose fit fails keep their hits but yield no track.
fn fit_segments(
    adapter: &FitterAdapter<'_>,
    hits: &[Hit],
    store: &SegmentStore,
    ids: &[SegmentId],
    sink: &mut DiagnosticSink<'_>,
) -> Vec<FittedTrack> {
    let mut tracks = Vec::with_capacity(ids.len());
    for (segment, result) in adapter.fit_all(hits, store, ids) {
        match result {
            Ok(fit) => tracks.push(FittedTrack { segment, fit }),
            Err(error) => {
                let size = store.get(segment).map_or(0, Segment::len);
                log::debug!(
                    "{} fit of {segment} ({size} hits) failed: {error}",
                    adapter.fitter_name()
                );
                sink.push(Diagnostic::FitFailed {
                    segment,
                    hits: size,
                    error,
                });
            }
        }
    }
    tracks
}

fn segment_refs(store: &SegmentStore) -> Vec<&Segment> {
    store.iter().collect()
}

/// Reconstructs the tracks of one event.
///
/// Hits are annotated, clustered into segments, cleaned of duplicate-layer
/// contamination, fitted, extended with leftover hits, refitted and finally
/// merged by helix proximity. Recoverable problems end up in
/// [`EventReconstruction::diagnostics`]; the event always completes.
///
/// # Errors
/// [`clutrack_core::Error::InvalidConfig`] for a bad configuration. Other
/// errors indicate an internal bookkeeping defect.
pub fn reconstruct_event(
    event: &Event,
    config: &ReconstructionConfig,
    geometry: &dyn DetectorGeometry,
    fitter: &dyn TrackFitter,
    observer: &mut dyn PipelineObserver,
) -> Result<EventReconstruction> {
    config.validate()?;
    let start = Instant::now();
    let mut sink = DiagnosticSink::new(observer);
    let mut stats = ReconstructionStatistics::default();

    let annotated = annotate_event(event, config, geometry, &mut sink);
    let mut hits = annotated.hits;
    stats.hit_count = hits.len();
    stats.invalid_hits = annotated.rejected;
    stats.gated_hits = annotated.gated.len();

    let mut store = SegmentStore::new(hits.len());
    let initial = initial_segments(&hits, &annotated.clusterable, config, &mut store)?;
    stats.initial_segments = initial.len();
    sink.segments(Stage::InitialClusters, &segment_refs(&store));

    let report = DuplicateRepair::new(config).repair(&hits, &mut store, &mut sink)?;
    stats.contaminated_segments = report.contaminated;
    stats.repair_passes = report.passes;
    stats.unresolved_hits = report.released.len();

    let segments: Vec<Segment> = store.iter().cloned().collect();
    stats.clean_segments = segments.len();
    sink.segments(Stage::CleanSegments, &segment_refs(&store));
    log::debug!(
        "event {}: {} hits, {} initial segments, {} contaminated, {} clean",
        event.number,
        stats.hit_count,
        stats.initial_segments,
        stats.contaminated_segments,
        stats.clean_segments
    );

    let adapter = FitterAdapter::new(fitter, &config.fit);
    let ids = store.ids();
    let fitted = fit_segments(&adapter, &hits, &store, &ids, &mut sink);
    stats.failed_fits = ids.len() - fitted.len();
    sink.tracks(Stage::SegmentFits, &fitted);

    let reconciliation =
        LeftoverReconciler::new(config).reconcile(&mut hits, &mut store, fitted, &mut sink)?;
    stats.assigned_hits = reconciliation.assigned;
    stats.reconciliation_merges = reconciliation.merges;
    sink.tracks(Stage::ReconciledSegments, &reconciliation.tracks);

    // Reconciliation changed segment contents; refit everything still active.
    let ids = store.ids();
    let segment_tracks = fit_segments(&adapter, &hits, &store, &ids, &mut sink);
    sink.tracks(Stage::FinalSegmentTracks, &segment_tracks);

    let tracks = if config.merge.enabled {
        merge_tracks(&store, &segment_tracks, config.merge.tolerance)?
    } else {
        unmerged_tracks(&store, &segment_tracks)
    };
    sink.merged_tracks(&tracks);
    stats.track_count = tracks.len();
    stats.merged_tracks = tracks.iter().filter(|t| t.is_merged()).count();

    let (used, unused) = store.partition();
    stats.used_hits = used.len();
    stats.unused_hits = unused.len();
    stats.elapsed = start.elapsed();
    log::debug!(
        "event {}: {} tracks ({} merged), {}/{} hits used in {:.2?}",
        event.number,
        stats.track_count,
        stats.merged_tracks,
        stats.used_hits,
        stats.hit_count,
        stats.elapsed
    );

    Ok(EventReconstruction {
        event: event.number,
        hits,
        segments,
        segment_tracks,
        tracks,
        used,
        unused,
        diagnostics: sink.into_entries(),
        statistics: stats,
    })
}

/// Reconstructs a sequence of events, accumulating run statistics.
///
/// # Errors
/// The first error returned by [`reconstruct_event`].
pub fn reconstruct_events<'e, I>(
    events: I,
    config: &ReconstructionConfig,
    geometry: &dyn DetectorGeometry,
    fitter: &dyn TrackFitter,
    observer: &mut dyn PipelineObserver,
) -> Result<(Vec<EventReconstruction>, RunStatistics)>
where
    I: IntoIterator<Item = &'e Event>,
{
    let mut run = RunStatistics::default();
    let mut results = Vec::new();
    for event in events {
        let result = reconstruct_event(event, config, geometry, fitter, observer)?;
        run.accumulate(&result.statistics);
        results.push(result);
    }
    Ok((results, run))
}
