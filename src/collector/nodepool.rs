//! Periodic poll of a cluster-autoscaler/Karpenter-style node pool CRD
//! (spec §3 "NodePool" — "no native watch API"). Same tokio::select! polling
//! shape as `gpu_collector`, generalized over a `kube::api::DynamicObject`
//! list-and-translate step instead of a typed `Api<K>` watch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams};
use kube::ResourceExt;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::model::NodePool;
use crate::observability::Metrics;
use crate::store::Store;

use super::Collector;

pub struct NodePoolCollector {
    api: Api<DynamicObject>,
    interval: Duration,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl NodePoolCollector {
    pub fn new(api: Api<DynamicObject>, interval: Duration, store: Arc<Store>, metrics: Arc<Metrics>) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            api,
            interval,
            store,
            metrics,
            handle: AsyncMutex::new(None),
            shutdown: CancellationToken::new(),
            synced_tx,
            synced_rx,
        }
    }
}

#[async_trait]
impl Collector for NodePoolCollector {
    fn name(&self) -> &'static str {
        "nodepools"
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let this = Arc::new(SelfHandle {
            api: self.api.clone(),
            interval: self.interval,
            store: self.store.clone(),
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
            _ = ctx.cancelled() => Err(AgentError::Discovery("nodepools: sync wait canceled".into())),
            res = rx.changed() => {
                res.map_err(|_| AgentError::Discovery("nodepools: sync channel closed".into()))?;
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
    api: Api<DynamicObject>,
    interval: Duration,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    synced_tx: watch::Sender<bool>,
}

impl SelfHandle {
    async fn poll_once(&self) {
        match self.api.list(&ListParams::default()).await {
            Ok(list) => {
                let seen: Vec<String> = list.items.iter().map(|obj| obj.name_any()).collect();
                for obj in &list.items {
                    if let Some(pool) = translate(obj) {
                        self.store.node_pools.set(pool.name.clone(), pool);
                        self.metrics.record_event("nodepools", "polled");
                    } else {
                        self.metrics.record_dropped("nodepools");
                    }
                }
                for existing in self.store.node_pools.values() {
                    if !seen.contains(&existing.name) {
                        self.store.node_pools.delete(&existing.name);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "node pool list failed");
                self.metrics.record_dropped("nodepools");
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
                    debug!("nodepool collector stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Reads the handful of fields that are conventionally present across the
/// Karpenter `NodePool`/`Provisioner` and cluster-autoscaler `NodeGroup`
/// CRDs; unrecognized shapes fall back to zeroed bounds rather than being
/// dropped; the pool is still worth reporting by name.
fn translate(obj: &DynamicObject) -> Option<NodePool> {
    let name = obj.name_any();
    if name.is_empty() {
        return None;
    }
    let spec = obj.data.get("spec");
    let status = obj.data.get("status");

    let min_size = spec
        .and_then(|s| s.get("limits").or_else(|| s.get("scaling")))
        .and_then(|v| v.get("minSize").or_else(|| v.get("min")))
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32;
    let max_size = spec
        .and_then(|s| s.get("limits").or_else(|| s.get("scaling")))
        .and_then(|v| v.get("maxSize").or_else(|| v.get("max")))
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32;
    let current_size = status
        .and_then(|s| s.get("resources").or(Some(s)))
        .and_then(|v| v.get("nodes").or_else(|| v.get("replicas")))
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32;
    let instance_type = spec
        .and_then(|s| s.get("instanceType"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(NodePool {
        name,
        min_size,
        max_size,
        current_size,
        instance_type,
    })
}
