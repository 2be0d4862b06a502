//! Generic periodic poller over `kube::api::DynamicObject`, for CRD-backed
//! entity kinds (VPA, custom workload controllers) that have no native
//! k8s-openapi type and so can't satisfy `WatchCollector`'s
//! `K::DynamicType: Default` bound. Same poll-loop shape as
//! `nodepool::NodePoolCollector`, generalized over the translated value type.

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
use crate::observability::Metrics;
use crate::store::{Store, TypedStore};

use super::watch::{KeyOf, Project, Translate};
use super::Collector;

pub struct DynamicPollCollector<V: Clone + Send + Sync + 'static> {
    name: &'static str,
    api: Api<DynamicObject>,
    interval: Duration,
    translate: Translate<DynamicObject, V>,
    key_of: KeyOf<V>,
    project: Project<V>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl<V: Clone + Send + Sync + 'static> DynamicPollCollector<V> {
    pub fn new(
        name: &'static str,
        api: Api<DynamicObject>,
        interval: Duration,
        translate: Translate<DynamicObject, V>,
        key_of: KeyOf<V>,
        project: Project<V>,
        store: Arc<Store>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            name,
            api,
            interval,
            translate,
            key_of,
            project,
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
impl<V: Clone + Send + Sync + 'static> Collector for DynamicPollCollector<V> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let this = Arc::new(SelfHandle {
            name: self.name,
            api: self.api.clone(),
            interval: self.interval,
            translate: self.translate.clone(),
            key_of: self.key_of.clone(),
            project: self.project,
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
            _ = ctx.cancelled() => Err(AgentError::Discovery(format!("{}: sync wait canceled", self.name))),
            res = rx.changed() => {
                res.map_err(|_| AgentError::Discovery(format!("{}: sync channel closed", self.name)))?;
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

struct SelfHandle<V: Clone + Send + Sync + 'static> {
    name: &'static str,
    api: Api<DynamicObject>,
    interval: Duration,
    translate: Translate<DynamicObject, V>,
    key_of: KeyOf<V>,
    project: Project<V>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    synced_tx: watch::Sender<bool>,
}

impl<V: Clone + Send + Sync + 'static> SelfHandle<V> {
    fn typed_store(&self) -> &TypedStore<String, V> {
        (self.project)(&self.store)
    }

    async fn poll_once(&self) {
        match self.api.list(&ListParams::default()).await {
            Ok(list) => {
                let mut seen = Vec::with_capacity(list.items.len());
                for obj in &list.items {
                    match (self.translate)(obj) {
                        Some(value) => {
                            let key = (self.key_of)(&value);
                            self.typed_store().set(key.clone(), value);
                            seen.push(key);
                            self.metrics.record_event(self.name, "polled");
                        }
                        None => {
                            self.metrics.record_dropped(self.name);
                            warn!(kind = self.name, uid = obj.uid().unwrap_or_default(), "dropped untranslatable object on poll");
                        }
                    }
                }
                for value in self.typed_store().values() {
                    let key = (self.key_of)(&value);
                    if !seen.contains(&key) {
                        self.typed_store().delete(&key);
                    }
                }
            }
            Err(err) => {
                warn!(kind = self.name, error = %err, "dynamic object list failed");
                self.metrics.record_dropped(self.name);
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
                    debug!(kind = self.name, "collector stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
