//! The enrichment pipeline (spec §4.6): an ordered chain of pure snapshot
//! transformers. Ownership runs separately, before this pipeline, because
//! aggregation depends on its output (see `SnapshotBuilder::build`).

pub mod aggregation;
pub mod mounts;
pub mod ownership;
pub mod targets;

use std::time::Instant;

use crate::model::ClusterSnapshot;
use crate::observability::Metrics;

/// A pure transform over a snapshot. Must not perform I/O; failures are
/// logged by the pipeline and never abort the remaining enrichers.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;
    fn enrich(&self, snapshot: &mut ClusterSnapshot);
}

pub struct EnrichmentPipeline {
    enrichers: Vec<Box<dyn Enricher>>,
}

impl EnrichmentPipeline {
    /// The fixed order named in spec §4.6: aggregation, targets, mounts.
    pub fn standard() -> Self {
        Self {
            enrichers: vec![
                Box::new(aggregation::AggregationEnricher),
                Box::new(targets::TargetsEnricher),
                Box::new(mounts::MountsEnricher),
            ],
        }
    }

    /// Runs every enricher regardless of whether a preceding one's
    /// duration looked unusual; there is nothing for an enricher to fail
    /// *with* since it has no I/O, but runtime is still recorded per-stage.
    pub fn run(&self, snapshot: &mut ClusterSnapshot, metrics: &Metrics) {
        for enricher in &self.enrichers {
            let start = Instant::now();
            enricher.enrich(snapshot);
            metrics
                .enricher_duration_seconds
                .with_label_values(&[enricher.name()])
                .observe(start.elapsed().as_secs_f64());
        }
    }
}

impl Default for EnrichmentPipeline {
    fn default() -> Self {
        Self::standard()
    }
}
