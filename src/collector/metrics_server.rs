//! Periodic poll of the `metrics.k8s.io` aggregated API, populating
//! `MetricsStore` (spec §4.7 step 2 — "Concurrently call `Values()` on the
//! NodeMetrics and PodMetrics stores"). That API group isn't part of the
//! core k8s-openapi bundle, so both kinds are listed as `DynamicObject`s and
//! hand-translated, the same shape as `nodepool::NodePoolCollector`.
//! Capability-gated by `discovery::Capabilities::metrics_server` (spec
//! §4.5) — only constructed once the probe confirms the API is reachable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, DynamicObject, ListParams};
use kube::ResourceExt;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collector::convert::{cpu_cores, memory_bytes};
use crate::error::{AgentError, Result};
use crate::model::keys::namespaced_key;
use crate::model::{ContainerMetrics, NodeMetrics, PodMetrics};
use crate::observability::Metrics;
use crate::store::MetricsStore;

use super::Collector;

pub struct MetricsServerCollector {
    node_api: Api<DynamicObject>,
    pod_api: Api<DynamicObject>,
    interval: Duration,
    metrics_store: Arc<MetricsStore>,
    metrics: Arc<Metrics>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl MetricsServerCollector {
    pub fn new(
        node_api: Api<DynamicObject>,
        pod_api: Api<DynamicObject>,
        interval: Duration,
        metrics_store: Arc<MetricsStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            node_api,
            pod_api,
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
impl Collector for MetricsServerCollector {
    fn name(&self) -> &'static str {
        "metrics-server"
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let this = Arc::new(SelfHandle {
            node_api: self.node_api.clone(),
            pod_api: self.pod_api.clone(),
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
            _ = ctx.cancelled() => Err(AgentError::Discovery("metrics-server: sync wait canceled".into())),
            res = rx.changed() => {
                res.map_err(|_| AgentError::Discovery("metrics-server: sync channel closed".into()))?;
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

struct SelfHandle {
    node_api: Api<DynamicObject>,
    pod_api: Api<DynamicObject>,
    interval: Duration,
    metrics_store: Arc<MetricsStore>,
    metrics: Arc<Metrics>,
    synced_tx: watch::Sender<bool>,
}

impl SelfHandle {
    async fn poll_once(&self) {
        match self.node_api.list(&ListParams::default()).await {
            Ok(list) => {
                let seen: Vec<String> = list.items.iter().map(|o| o.name_any()).collect();
                for obj in &list.items {
                    if let Some(m) = translate_node(obj) {
                        self.metrics_store.node_metrics.set(m.node_name.clone(), m);
                        self.metrics.record_event("metrics-server", "polled");
                    } else {
                        self.metrics.record_dropped("metrics-server");
                    }
                }
                for existing in self.metrics_store.node_metrics.values() {
                    if !seen.contains(&existing.node_name) {
                        self.metrics_store.node_metrics.delete(&existing.node_name);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "node metrics list failed");
                self.metrics.record_dropped("metrics-server");
            }
        }

        match self.pod_api.list(&ListParams::default()).await {
            Ok(list) => {
                let mut seen = Vec::with_capacity(list.items.len());
                for obj in &list.items {
                    if let Some(m) = translate_pod(obj) {
                        let key = namespaced_key(&m.namespace, &m.pod_name);
                        self.metrics_store.pod_metrics.set(key.clone(), m);
                        seen.push(key);
                        self.metrics.record_event("metrics-server", "polled");
                    } else {
                        self.metrics.record_dropped("metrics-server");
                    }
                }
                for existing in self.metrics_store.pod_metrics.values() {
                    let key = namespaced_key(&existing.namespace, &existing.pod_name);
                    if !seen.contains(&key) {
                        self.metrics_store.pod_metrics.delete(&key);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "pod metrics list failed");
                self.metrics.record_dropped("metrics-server");
            }
        }
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut first_sync_done = false;
        loop {
            self.poll_once().await;
            if !first_sync_done {
                first_sync_done = true;
                let _ = self.synced_tx.send(true);
            }
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("metrics-server collector stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

fn quantity_at(v: &serde_json::Value, field: &str) -> Option<Quantity> {
    v.get(field).and_then(|v| v.as_str()).map(|s| Quantity(s.to_string()))
}

fn timestamp_at(obj: &DynamicObject) -> chrono::DateTime<chrono::Utc> {
    obj.data
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now)
}

fn translate_node(obj: &DynamicObject) -> Option<NodeMetrics> {
    let name = obj.name_any();
    if name.is_empty() {
        return None;
    }
    let usage = obj.data.get("usage")?;
    Some(NodeMetrics {
        node_name: name,
        cpu_usage_cores: cpu_cores(quantity_at(usage, "cpu").as_ref()).unwrap_or(0.0),
        memory_usage_bytes: memory_bytes(quantity_at(usage, "memory").as_ref()).unwrap_or(0),
        timestamp: timestamp_at(obj),
    })
}

fn translate_pod(obj: &DynamicObject) -> Option<PodMetrics> {
    let name = obj.name_any();
    if name.is_empty() {
        return None;
    }
    let namespace = obj.namespace().unwrap_or_default();
    let containers = obj
        .data
        .get("containers")?
        .as_array()?
        .iter()
        .filter_map(|c| {
            let cname = c.get("name")?.as_str()?.to_string();
            let usage = c.get("usage")?;
            Some(ContainerMetrics {
                name: cname,
                cpu_usage_cores: cpu_cores(quantity_at(usage, "cpu").as_ref()).unwrap_or(0.0),
                memory_usage_bytes: memory_bytes(quantity_at(usage, "memory").as_ref()).unwrap_or(0),
            })
        })
        .collect();

    Some(PodMetrics {
        namespace,
        pod_name: name,
        containers,
        timestamp: timestamp_at(obj),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn translates_node_metrics_quantities() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": {"name": "node-1"},
            "timestamp": "2024-01-01T00:00:00Z",
            "window": "30s",
            "usage": {"cpu": "500m", "memory": "2Gi"}
        }))
        .unwrap();
        let m = translate_node(&obj).unwrap();
        assert_eq!(m.node_name, "node-1");
        assert_eq!(m.cpu_usage_cores, 0.5);
        assert_eq!(m.memory_usage_bytes, 2 * (1u64 << 30));
    }

    #[test]
    fn translates_pod_metrics_containers() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "PodMetrics",
            "metadata": {"name": "pod-1", "namespace": "default"},
            "timestamp": "2024-01-01T00:00:00Z",
            "window": "30s",
            "containers": [{"name": "app", "usage": {"cpu": "100m", "memory": "256Mi"}}]
        }))
        .unwrap();
        let m = translate_pod(&obj).unwrap();
        assert_eq!(m.pod_name, "pod-1");
        assert_eq!(m.namespace, "default");
        assert_eq!(m.containers.len(), 1);
        assert_eq!(m.containers[0].cpu_usage_cores, 0.1);
    }

    #[test]
    fn node_metrics_without_a_name_are_dropped() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": {},
            "usage": {"cpu": "500m", "memory": "2Gi"}
        }))
        .unwrap();
        assert!(translate_node(&obj).is_none());
    }
}
