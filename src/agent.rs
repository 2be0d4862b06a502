//! Agent orchestrator (spec §4.12): wires the collector registry, the
//! snapshot builder, and the transport together into the agent's single
//! long-lived task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::builder::{SnapshotBuilder, SnapshotIdentity};
use crate::collector::CollectorRegistry;
use crate::config::Config;
use crate::error::{AgentError, ErrorKind, Result};
use crate::error_collector::ErrorCollector;
use crate::health::AgentHandle;
use crate::model::ClusterSnapshot;
use crate::observability::Metrics;
use crate::state_machine::{State, StateMachine};
use crate::store::Stores;
use crate::transport::{self, SnapshotTransport};

pub struct Agent {
    config: Config,
    registry: CollectorRegistry,
    stores: Stores,
    builder: SnapshotBuilder,
    transport: SnapshotTransport,
    state_machine: Arc<StateMachine>,
    error_collector: Arc<ErrorCollector>,
    metrics: Metrics,
    ready: Arc<AtomicBool>,
    latest_snapshot_tx: watch::Sender<Option<Arc<ClusterSnapshot>>>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        registry: CollectorRegistry,
        stores: Stores,
        metrics: Metrics,
        clock: crate::clock::SharedClock,
        agent_version: String,
        state_machine: Arc<StateMachine>,
        error_collector: Arc<ErrorCollector>,
    ) -> (Self, AgentHandle) {
        let identity = SnapshotIdentity {
            cluster_id: config.cluster_id.clone(),
            cluster_name: config.cluster_name.clone(),
            agent_version: agent_version.clone(),
            snapshot_interval: config.snapshot_interval,
        };
        let builder = SnapshotBuilder::new(stores.clone(), identity, metrics.clone(), clock.clone());
        let transport = SnapshotTransport::new(
            config.backend_url.clone(),
            config.api_key.clone(),
            config.cluster_id.clone(),
            agent_version,
            config.compression_level,
            config.max_retries,
            config.request_timeout,
        );

        let ready = Arc::new(AtomicBool::new(false));
        let (latest_snapshot_tx, latest_snapshot_rx) = watch::channel(None);

        let handle = AgentHandle {
            ready: ready.clone(),
            latest_snapshot: latest_snapshot_rx,
            metrics: metrics.clone(),
            store: stores.store.clone(),
            debug_endpoints: config.debug_endpoints,
        };

        let agent = Self {
            config,
            registry,
            stores,
            builder,
            transport,
            state_machine,
            error_collector,
            metrics,
            ready,
            latest_snapshot_tx,
        };

        (agent, handle)
    }

    /// The orchestrator's lifecycle, per spec §4.12. Returns once the
    /// state machine reaches `Stopped`/`Exiting` or `ctx` is canceled.
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let cancel_ctx = ctx.clone();
        self.state_machine.set_cancel_fn(move || cancel_ctx.cancel());

        if let Some(partial) = self.registry.start_all(ctx.clone()).await? {
            warn!(%partial, "some collectors failed to start, continuing with the rest");
        }

        match tokio::time::timeout(self.config.informer_sync_timeout, self.registry.wait_for_sync(ctx.clone())).await
        {
            Ok(Ok(())) => info!("all collectors reported initial sync"),
            Ok(Err(err)) => {
                warn!(error = %err, "collector sync reported a failure");
                self.error_collector
                    .report(ErrorKind::InformerSyncFailed, "registry", err.to_string());
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.informer_sync_timeout.as_secs(),
                    "informer sync timed out, continuing in partial-data mode"
                );
                self.error_collector.report(
                    ErrorKind::InformerSyncTimeout,
                    "registry",
                    "sync deadline exceeded",
                );
            }
        }

        let counts = self.stores.store.item_counts();
        info!(?counts, "post-sync store item counts");

        self.state_machine.transition_to(State::Running, "");
        self.ready.store(true, Ordering::SeqCst);
        self.metrics.agent_ready.set(1);

        self.do_snapshot(&ctx).await;

        let result = self.tick_loop(&ctx).await;

        self.registry.stop_all().await;
        self.ready.store(false, Ordering::SeqCst);
        self.metrics.agent_ready.set(0);
        result
    }

    async fn tick_loop(&self, ctx: &CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.snapshot_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately; the snapshot above already covers it.

        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err(AgentError::Canceled),
                _ = ticker.tick() => {
                    match self.state_machine.state() {
                        State::Running => self.do_snapshot(ctx).await,
                        State::Backoff if self.state_machine.is_backoff_expired() => {
                            self.state_machine.transition_to(State::Running, "");
                            self.do_snapshot(ctx).await;
                        }
                        State::Backoff | State::Starting => {}
                        State::Stopped | State::Exiting => return Ok(()),
                    }
                }
            }
        }
    }

    /// Build -> publish -> send -> feed the outcome back into the state
    /// machine. Errors are logged, not propagated (spec §4.12: "the next
    /// tick will retry").
    async fn do_snapshot(&self, ctx: &CancellationToken) {
        let snapshot = Arc::new(self.builder.build().await);
        let _ = self.latest_snapshot_tx.send(Some(snapshot.clone()));

        match self.transport.send(ctx.clone(), &snapshot).await {
            Ok(_) => self.state_machine.handle_http_status(200, 0),
            Err(err) => {
                warn!(error = %err, "snapshot send failed, next tick will retry");
                self.error_collector
                    .report(ErrorKind::BackendUnreachable, "transport", err.to_string());
                if let Some((code, retry_after)) = transport::status_hint(&err) {
                    self.state_machine.handle_http_status(code, retry_after);
                }
            }
        }
    }
}

/// Constructs a cluster client the way the agent requires one at startup
/// (spec §7: "inability to construct the cluster client" is fatal).
pub async fn build_kube_client() -> Result<kube::Client> {
    kube::Client::try_default()
        .await
        .map_err(|err| AgentError::ClientConstruction(err.to_string()))
}
