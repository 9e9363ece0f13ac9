//! Final merging of segment tracks by helix proximity.

use clutrack_core::{ClusteringError, FittedTrack, HelixTolerance, SegmentStore, Track};

use crate::nn::{NearestNeighborClusterer, SweepMode};
use crate::predicates::HelixProximity;

/// Builds an output track from one group of segment tracks.
///
/// Hits are the union of the members' segments; parameters come from the
/// member with the lowest chi-squared per degree of freedom.
fn build_track(store: &SegmentStore, members: &[&FittedTrack]) -> Option<Track> {
    let best = members
        .iter()
        .min_by(|a, b| a.fit.chi2_per_ndf().total_cmp(&b.fit.chi2_per_ndf()))?;
    let hits = members
        .iter()
        .filter_map(|t| store.get(t.segment))
        .flat_map(|s| s.hits().iter().copied())
        .collect();
    Some(Track {
        hits,
        parameters: best.fit.parameters,
        chi2: best.fit.chi2,
        ndf: best.fit.ndf,
        segments: members.iter().map(|t| t.segment).collect(),
    })
}

/// Groups segment tracks that describe the same helix.
///
/// Tracks are clustered with the helix proximity predicate and a minimum
/// group size of two; every group becomes one merged track and tracks in no
/// group pass through. The output is ordered by the first member of each
/// track.
///
/// # Errors
/// Never in practice; the clusterer's input shapes are built here.
pub fn merge_tracks(
    store: &SegmentStore,
    tracks: &[FittedTrack],
    tolerance: HelixTolerance,
) -> Result<Vec<Track>, ClusteringError> {
    let items: Vec<&FittedTrack> = tracks.iter().collect();
    let buckets = vec![0; items.len()];
    let mut groups = NearestNeighborClusterer::new(2)
        .with_mode(SweepMode::Exhaustive)
        .cluster(&items, &buckets, &HelixProximity::new(tolerance))?;

    let mut grouped = vec![false; items.len()];
    for &i in groups.iter().flatten() {
        grouped[i] = true;
    }
    groups.extend((0..items.len()).filter(|&i| !grouped[i]).map(|i| vec![i]));
    groups.sort_by_key(|g| g[0]);

    let merged: Vec<Track> = groups
        .iter()
        .filter_map(|group| {
            let members: Vec<&FittedTrack> = group.iter().map(|&i| items[i]).collect();
            build_track(store, &members)
        })
        .collect();
    log::debug!(
        "merged {} segment tracks into {} tracks",
        tracks.len(),
        merged.len()
    );
    Ok(merged)
}

/// One output track per segment track, without merging.
#[must_use]
pub fn unmerged_tracks(store: &SegmentStore, tracks: &[FittedTrack]) -> Vec<Track> {
    tracks
        .iter()
        .filter_map(|t| build_track(store, &[t]))
        .collect()
}
