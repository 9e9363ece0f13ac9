//! Hit annotation: validation, layer ids and longitudinal buckets.

use clutrack_core::{
    DetectorGeometry, Diagnostic, DiagnosticSink, Event, Hit, HitCollection, HitId,
    ReconstructionConfig,
};

/// The hit table of one event plus the sets the pipeline starts from.
#[derive(Debug, Clone, Default)]
pub struct AnnotatedEvent {
    /// Every accepted hit; `hits[i].id == HitId(i)`.
    pub hits: Vec<Hit>,
    /// Hits taking part in the initial clustering, sorted by z.
    pub clusterable: Vec<HitId>,
    /// Hits held back by the radial gate.
    pub gated: Vec<HitId>,
    /// Records rejected as invalid.
    pub rejected: usize,
}

/// Collections of `event` selected by the configuration.
///
/// Missing collections are reported and skipped.
fn selected_collections<'e>(
    event: &'e Event,
    config: &ReconstructionConfig,
    sink: &mut DiagnosticSink<'_>,
) -> Vec<&'e HitCollection> {
    if config.input_collections.is_empty() {
        return event.collections.iter().collect();
    }
    let mut selected = Vec::with_capacity(config.input_collections.len());
    for name in &config.input_collections {
        match event.collection(name) {
            Some(collection) => selected.push(collection),
            None => {
                log::warn!("event {}: input collection '{name}' not found", event.number);
                sink.push(Diagnostic::MissingCollection { name: name.clone() });
            }
        }
    }
    selected
}

/// Builds the annotated hit table of an event.
///
/// Each accepted record gets its layer id from `geometry` and a z bucket from
/// the configured binning. Both are assigned once here.
pub fn annotate_event(
    event: &Event,
    config: &ReconstructionConfig,
    geometry: &dyn DetectorGeometry,
    sink: &mut DiagnosticSink<'_>,
) -> AnnotatedEvent {
    let mut out = AnnotatedEvent::default();

    for (collection_index, collection) in selected_collections(event, config, sink)
        .into_iter()
        .enumerate()
    {
        for (index, raw) in collection.hits.iter().enumerate() {
            if let Some(reason) = raw.defect() {
                log::warn!(
                    "event {}: dropping hit {index} of '{}': {reason}",
                    event.number,
                    collection.name
                );
                sink.push(Diagnostic::InvalidHit {
                    collection: collection.name.clone(),
                    index,
                    reason,
                });
                out.rejected += 1;
                continue;
            }
            let id = HitId(out.hits.len());
            out.hits.push(Hit {
                id,
                position: raw.position,
                covariance: raw.covariance,
                layer: geometry.layer_index_of(&raw.position),
                z_bucket: config.z_binning.bucket_of(raw.position.z),
                chi2_residual: None,
                truth_id: raw.truth_id,
                collection: collection_index,
            });
        }
    }

    for hit in &out.hits {
        if config.radial_gate.admits(&hit.position) {
            out.clusterable.push(hit.id);
        } else {
            out.gated.push(hit.id);
        }
    }
    let hits = &out.hits;
    out.clusterable
        .sort_by(|a, b| hits[a.0].position.z.total_cmp(&hits[b.0].position.z));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clutrack_core::{Covariance, CylindricalLayers, NoopObserver, RawHit};

    fn event() -> Event {
        Event::new(1)
            .with_collection(HitCollection::new(
                "TPCHits",
                vec![
                    RawHit::new(500.0, 0.0, 100.0),
                    RawHit::new(f64::NAN, 0.0, 0.0),
                    RawHit::new(0.0, 600.0, -50.0),
                ],
            ))
            .with_collection(HitCollection::new(
                "InnerHits",
                vec![RawHit::new(50.0, 0.0, 10.0)
                    .with_covariance(Covariance::from_resolution(0.01, 0.1))],
            ))
    }

    #[test]
    fn test_annotation() {
        let geometry = CylindricalLayers::new(400.0, 800.0, 40);
        let config = ReconstructionConfig::default();
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let annotated = annotate_event(&event(), &config, &geometry, &mut sink);

        assert_eq!(annotated.hits.len(), 3);
        assert_eq!(annotated.rejected, 1);
        assert_eq!(sink.entries().len(), 1);
        for (i, hit) in annotated.hits.iter().enumerate() {
            assert_eq!(hit.id, HitId(i));
        }
        assert_eq!(annotated.hits[0].layer, 10);
        assert_eq!(annotated.hits[1].layer, 20);
        assert_eq!(annotated.hits[1].z_bucket, config.z_binning.bucket_of(-50.0));
        assert_eq!(annotated.hits[2].collection, 1);
        // Sorted by z.
        assert_eq!(annotated.clusterable, vec![HitId(1), HitId(2), HitId(0)]);
        assert!(annotated.gated.is_empty());
    }

    #[test]
    fn test_radial_gate_and_missing_collection() {
        let geometry = CylindricalLayers::new(400.0, 800.0, 40);
        let config = ReconstructionConfig::default()
            .with_r_cut(100.0)
            .with_input_collections(["TPCHits", "InnerHits", "VXDHits"]);
        let mut observer = NoopObserver;
        let mut sink = DiagnosticSink::new(&mut observer);
        let annotated = annotate_event(&event(), &config, &geometry, &mut sink);

        assert_eq!(annotated.gated, vec![HitId(2)]);
        assert_eq!(annotated.clusterable.len(), 2);
        assert!(sink
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::MissingCollection { name } if name == "VXDHits")));
    }
}
