//! Counters/gauges/histograms consumed by the rest of the agent (spec §2
//! item 12 — "not specified in detail"). Backed by the `prometheus` crate,
//! exposed through the health surface's `/metrics` route (spec §6).

use prometheus::{HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    /// `collector_events_total{kind, action}` — bumped once per processed
    /// event (spec §4.3 step 3).
    pub collector_events_total: IntCounterVec,
    /// `collector_events_dropped_total{kind}` — untranslatable / tombstone-
    /// recovery-failed events (spec §4.3 "Failure semantics").
    pub collector_events_dropped_total: IntCounterVec,
    /// `snapshot_build_duration_seconds` (spec §4.7 step 10).
    pub snapshot_build_duration_seconds: HistogramVec,
    /// `enricher_duration_seconds{enricher}` (spec §4.6).
    pub enricher_duration_seconds: HistogramVec,
    /// `transport_send_duration_seconds{outcome}` (spec §4.9).
    pub transport_send_duration_seconds: HistogramVec,
    /// `transport_compressed_bytes` — last observed compressed payload size.
    pub transport_compressed_bytes: IntGauge,
    /// `agent_ready` — 1 once post-sync, 0 otherwise.
    pub agent_ready: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let collector_events_total = IntCounterVec::new(
            Opts::new("collector_events_total", "Collector events processed"),
            &["kind", "action"],
        )
        .expect("valid metric");
        let collector_events_dropped_total = IntCounterVec::new(
            Opts::new("collector_events_dropped_total", "Collector events dropped"),
            &["kind"],
        )
        .expect("valid metric");
        let snapshot_build_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "snapshot_build_duration_seconds",
                "SnapshotBuilder::Build wall time",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let enricher_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("enricher_duration_seconds", "Per-enricher wall time"),
            &["enricher"],
        )
        .expect("valid metric");
        let transport_send_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "transport_send_duration_seconds",
                "SnapshotTransport::Send wall time",
            ),
            &["outcome"],
        )
        .expect("valid metric");
        let transport_compressed_bytes =
            IntGauge::new("transport_compressed_bytes", "Last compressed payload size").expect("valid metric");
        let agent_ready = IntGauge::new("agent_ready", "1 once the agent is post-sync").expect("valid metric");

        registry.register(Box::new(collector_events_total.clone())).unwrap();
        registry
            .register(Box::new(collector_events_dropped_total.clone()))
            .unwrap();
        registry
            .register(Box::new(snapshot_build_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(enricher_duration_seconds.clone())).unwrap();
        registry
            .register(Box::new(transport_send_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(transport_compressed_bytes.clone())).unwrap();
        registry.register(Box::new(agent_ready.clone())).unwrap();

        Self {
            registry,
            collector_events_total,
            collector_events_dropped_total,
            snapshot_build_duration_seconds,
            enricher_duration_seconds,
            transport_send_duration_seconds,
            transport_compressed_bytes,
            agent_ready,
        }
    }

    pub fn record_event(&self, kind: &str, action: &str) {
        self.collector_events_total.with_label_values(&[kind, action]).inc();
    }

    pub fn record_dropped(&self, kind: &str) {
        self.collector_events_dropped_total.with_label_values(&[kind]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
