//! Periodic scrape of DCGM-exporter-compatible Prometheus endpoints (spec
//! §4.3 "not every collector is watch-based" / §4.7 step 5). Grounded in the
//! teacher's periodic background worker
//! (`persist::runtime::support::worker::spawn_runtime_snapshot_worker`):
//! a `tokio::select!` loop racing a cancellation signal against a sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::model::gpu::normalize_sentinel;
use crate::model::GpuSample;
use crate::observability::Metrics;
use crate::store::MetricsStore;

use super::Collector;

/// `(node name, DCGM-exporter endpoint URL)`. Supplied by discovery; can
/// change across ticks as nodes come and go, so it's read fresh every tick
/// rather than captured once at construction.
pub type EndpointSource = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

pub struct GpuCollector {
    http: reqwest::Client,
    endpoints: EndpointSource,
    interval: Duration,
    metrics_store: Arc<MetricsStore>,
    metrics: Arc<Metrics>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl GpuCollector {
    pub fn new(
        http: reqwest::Client,
        endpoints: EndpointSource,
        interval: Duration,
        metrics_store: Arc<MetricsStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            http,
            endpoints,
            interval,
            metrics_store,
            metrics,
            handle: AsyncMutex::new(None),
            shutdown: CancellationToken::new(),
            synced_tx,
            synced_rx,
        }
    }
}

#[async_trait]
impl Collector for GpuCollector {
    fn name(&self) -> &'static str {
        "gpu"
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let this = Arc::new(SelfHandle {
            http: self.http.clone(),
            endpoints: self.endpoints.clone(),
            interval: self.interval,
            metrics_store: self.metrics_store.clone(),
            metrics: self.metrics.clone(),
            synced_tx: self.synced_tx.clone(),
        });
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move { this.run(token).await });
        *guard = Some(handle);
        Ok(())
    }

    async fn wait_for_sync(&self, ctx: CancellationToken) -> Result<()> {
        let mut rx = self.synced_rx.clone();
        if *rx.borrow() {
            return Ok(());
        }
        tokio::select! {
            _ = ctx.cancelled() => Err(AgentError::Discovery("gpu: sync wait canceled".into())),
            res = rx.changed() => {
                res.map_err(|_| AgentError::Discovery("gpu: sync channel closed".into()))?;
                Ok(())
            }
        }
    }

    async fn stop(&self) {
        self.shutdown.cancel();
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            let _ = handle.await;
        }
    }
}

/// Free-standing clone of the fields the spawned scrape loop needs, so it
/// owns an `Arc` of just that data rather than a borrowed `&self`.
struct SelfHandle {
    http: reqwest::Client,
    endpoints: EndpointSource,
    interval: Duration,
    metrics_store: Arc<MetricsStore>,
    metrics: Arc<Metrics>,
    synced_tx: watch::Sender<bool>,
}

impl SelfHandle {
    async fn scrape_once(&self) {
        let endpoints = (self.endpoints)();
        let mut seen_keys = Vec::with_capacity(endpoints.len());

        for (hostname, url) in endpoints {
            match self.http.get(&url).send().await {
                Ok(resp) => match resp.text().await {
                    Ok(body) => {
                        let samples = parse_dcgm_text(&body, &hostname);
                        for sample in samples {
                            let key = sample_key(&sample);
                            self.metrics_store.gpu_samples.set(key.clone(), sample);
                            seen_keys.push(key);
                        }
                        self.metrics.record_event("gpu", "scraped");
                    }
                    Err(err) => {
                        warn!(hostname, error = %err, "dcgm-exporter response body read failed");
                        self.metrics.record_dropped("gpu");
                    }
                },
                Err(err) => {
                    warn!(hostname, url, error = %err, "dcgm-exporter scrape failed");
                    self.metrics.record_dropped("gpu");
                }
            }
        }

        // Samples from devices that no longer appear in any scrape are
        // stale and must not linger in a snapshot (unlike watch collectors,
        // there is no delete event to key off of).
        let stale: Vec<String> = self
            .metrics_store
            .gpu_samples
            .values()
            .into_iter()
            .filter_map(|s| {
                let key = sample_key(&s);
                (!seen_keys.contains(&key)).then_some(key)
            })
            .collect();
        for key in stale {
            self.metrics_store.gpu_samples.delete(&key);
        }
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut first_sync_done = false;
        loop {
            self.scrape_once().await;
            if !first_sync_done {
                first_sync_done = true;
                let _ = self.synced_tx.send(true);
            }
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("gpu collector stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

fn sample_key(s: &GpuSample) -> String {
    format!("{}/{}", s.hostname, s.uuid)
}

/// Minimal Prometheus text-exposition-format parser scoped to the handful
/// of `DCGM_FI_*` metric families this agent cares about. Not a general
/// parser — unknown metric families are ignored, not an error.
fn parse_dcgm_text(body: &str, fallback_hostname: &str) -> Vec<GpuSample> {
    let mut by_device: HashMap<(String, u32), GpuSample> = HashMap::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((metric_and_labels, value_str)) = line.rsplit_once(' ') else {
            continue;
        };
        let Ok(value) = value_str.parse::<f64>() else {
            continue;
        };
        let (metric, labels) = split_labels(metric_and_labels);
        if !metric.starts_with("DCGM_FI_") {
            continue;
        }

        let uuid = labels.get("UUID").or_else(|| labels.get("gpu_uuid")).cloned();
        let Some(uuid) = uuid else { continue };
        let device_index = labels
            .get("gpu")
            .or_else(|| labels.get("device"))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let hostname = labels
            .get("Hostname")
            .cloned()
            .unwrap_or_else(|| fallback_hostname.to_string());

        let entry = by_device.entry((uuid.clone(), device_index)).or_insert_with(|| GpuSample {
            uuid: uuid.clone(),
            device_index,
            hostname: hostname.clone(),
            namespace: labels.get("namespace").cloned().unwrap_or_default(),
            pod: labels.get("pod").cloned().unwrap_or_default(),
            container: labels.get("container").cloned().unwrap_or_default(),
            model: labels.get("modelName").cloned().unwrap_or_default(),
            driver_version: labels.get("DCGM_FI_DRIVER_VERSION").cloned().unwrap_or_default(),
            ..Default::default()
        });

        match metric {
            "DCGM_FI_DEV_GPU_UTIL" => entry.utilization_percent = normalize_sentinel(value),
            "DCGM_FI_PROF_PIPE_TENSOR_ACTIVE" => entry.tensor_active_percent = normalize_sentinel(value * 100.0),
            "DCGM_FI_PROF_DRAM_ACTIVE" => entry.memory_copy_util_percent = normalize_sentinel(value * 100.0),
            "DCGM_FI_DEV_FB_USED" => entry.memory_used_bytes = normalize_sentinel(value).map(|v| (v as u64) * (1 << 20)),
            "DCGM_FI_DEV_FB_FREE" => entry.memory_free_bytes = normalize_sentinel(value).map(|v| (v as u64) * (1 << 20)),
            "DCGM_FI_DEV_FB_TOTAL" => entry.memory_total_bytes = normalize_sentinel(value).map(|v| (v as u64) * (1 << 20)),
            "DCGM_FI_DEV_GPU_TEMP" => entry.temperature_celsius = normalize_sentinel(value),
            "DCGM_FI_DEV_POWER_USAGE" => entry.power_watts = normalize_sentinel(value),
            _ => {}
        }
    }

    by_device.into_values().collect()
}

fn split_labels(metric_and_labels: &str) -> (&str, HashMap<String, String>) {
    let Some(open) = metric_and_labels.find('{') else {
        return (metric_and_labels, HashMap::new());
    };
    let metric = &metric_and_labels[..open];
    let Some(close) = metric_and_labels.rfind('}') else {
        return (metric, HashMap::new());
    };
    let inner = &metric_and_labels[open + 1..close];

    let mut labels = HashMap::new();
    for pair in inner.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((k, v)) = pair.split_once('=') {
            labels.insert(k.trim().to_string(), v.trim().trim_matches('"').to_string());
        }
    }
    (metric, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_dcgm_families() {
        let body = r#"
# HELP DCGM_FI_DEV_GPU_UTIL GPU utilization
DCGM_FI_DEV_GPU_UTIL{gpu="0",UUID="GPU-abc",Hostname="node-1",modelName="A100"} 42
DCGM_FI_DEV_FB_USED{gpu="0",UUID="GPU-abc",Hostname="node-1"} 1024
DCGM_FI_DEV_FB_TOTAL{gpu="0",UUID="GPU-abc",Hostname="node-1"} 40960
"#;
        let samples = parse_dcgm_text(body, "fallback");
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.uuid, "GPU-abc");
        assert_eq!(s.hostname, "node-1");
        assert_eq!(s.utilization_percent, Some(42.0));
        assert_eq!(s.memory_used_bytes, Some(1024 * (1 << 20)));
    }

    #[test]
    fn sentinel_values_become_none() {
        let body = r#"DCGM_FI_DEV_GPU_UTIL{gpu="0",UUID="GPU-xyz",Hostname="node-2"} 18446744073709551615"#;
        let samples = parse_dcgm_text(body, "fallback");
        assert_eq!(samples[0].utilization_percent, None);
    }

    #[test]
    fn ignores_unknown_metric_families() {
        let body = r#"some_other_metric{gpu="0",UUID="GPU-abc"} 1"#;
        assert!(parse_dcgm_text(body, "fallback").is_empty());
    }
}
