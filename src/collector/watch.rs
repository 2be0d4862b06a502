//! Generic `Collector` built on `kube::runtime::watcher`'s raw event
//! stream (not `reflector::Store`, since the store of record is our own
//! typed projection). `watcher::Event` is the post-0.91 shape
//! (`Init`/`InitApply`/`InitDone`/`Apply`/`Delete`), matching
//! `examples/other_examples/3c175e50_openobserve-kide__...k8s-watch.rs.rs`
//! and `9063aa27_acrlabs-simkube__...import_export_test.rs.rs`; `InitDone`
//! is the initial-sync signal sent on `synced_tx`.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{AgentError, Result};
use crate::observability::Metrics;
use crate::store::{Store, TypedStore};

use super::Collector;

/// Translates one raw `K` into our domain projection `V`, or `None` if the
/// object cannot be translated (spec §4.3 step 2 — dropped, not fatal).
pub type Translate<K, V> = Arc<dyn Fn(&K) -> Option<V> + Send + Sync>;
pub type KeyOf<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;
pub type Project<V> = fn(&Store) -> &TypedStore<String, V>;

pub struct WatchCollector<K, V>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    api: Api<K>,
    translate: Translate<K, V>,
    key_of: KeyOf<V>,
    project: Project<V>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl<K, V> WatchCollector<K, V>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        api: Api<K>,
        translate: Translate<K, V>,
        key_of: KeyOf<V>,
        project: Project<V>,
        store: Arc<Store>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            name,
            api,
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
impl<K, V> Collector for WatchCollector<K, V>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    V: Clone + Send + Sync + 'static,
{
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

/// Free-standing clone of the fields `run` needs, so the spawned task owns
/// an `Arc` of just that data rather than `&self` with a borrowed lifetime.
struct SelfHandle<K, V>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    api: Api<K>,
    translate: Translate<K, V>,
    key_of: KeyOf<V>,
    project: Project<V>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    synced_tx: watch::Sender<bool>,
}

impl<K, V> SelfHandle<K, V>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    V: Clone + Send + Sync + 'static,
{
    fn typed_store(&self) -> &TypedStore<String, V> {
        (self.project)(&self.store)
    }

    fn handle_applied(&self, obj: &K) {
        match (self.translate)(obj) {
            Some(value) => {
                let key = (self.key_of)(&value);
                self.typed_store().set(key, value);
                self.metrics.record_event(self.name, "applied");
            }
            None => {
                self.metrics.record_dropped(self.name);
                warn!(kind = self.name, "dropped untranslatable object on apply");
            }
        }
    }

    fn handle_deleted(&self, obj: &K) {
        match (self.translate)(obj) {
            Some(value) => {
                let key = (self.key_of)(&value);
                self.typed_store().delete(&key);
                self.metrics.record_event(self.name, "deleted");
            }
            None => {
                self.metrics.record_dropped(self.name);
                warn!(kind = self.name, "dropped untranslatable object on delete");
            }
        }
    }

    fn handle_event(&self, event: Event<K>, first_sync_done: &mut bool) {
        match event {
            Event::Apply(obj) => self.handle_applied(&obj),
            Event::Delete(obj) => self.handle_deleted(&obj),
            Event::InitApply(obj) => self.handle_applied(&obj),
            Event::Init => {}
            Event::InitDone => {
                if !*first_sync_done {
                    *first_sync_done = true;
                    let _ = self.synced_tx.send(true);
                }
            }
        }
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut stream = watcher::watcher(self.api.clone(), watcher::Config::default()).boxed();
        let mut first_sync_done = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(kind = self.name, "collector stopping");
                    return;
                }
                next = stream.next() => {
                    match next {
                        None => {
                            warn!(kind = self.name, "watch stream ended");
                            return;
                        }
                        Some(Ok(event)) => self.handle_event(event, &mut first_sync_done),
                        Some(Err(err)) => {
                            error!(kind = self.name, error = %err, "watch stream error");
                        }
                    }
                }
            }
        }
    }
}
