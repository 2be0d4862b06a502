//! Binary entrypoint: builds the cluster client, runs capability discovery,
//! wires every collector into the registry, and drives the agent to
//! completion or until a shutdown signal arrives (spec §7).

use std::sync::Arc;

use anyhow::Context;
use kube::api::{Api, DynamicObject};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cluster_telemetry_agent::agent::{build_kube_client, Agent};
use cluster_telemetry_agent::clock::system_clock;
use cluster_telemetry_agent::collector::gpu_collector::{EndpointSource, GpuCollector};
use cluster_telemetry_agent::collector::metrics_server::MetricsServerCollector;
use cluster_telemetry_agent::collector::nodepool::NodePoolCollector;
use cluster_telemetry_agent::collector::{kinds, CollectorRegistry};
use cluster_telemetry_agent::config::Config;
use cluster_telemetry_agent::discovery::{self, Capabilities};
use cluster_telemetry_agent::error_collector::ErrorCollector;
use cluster_telemetry_agent::health;
use cluster_telemetry_agent::memory_monitor::MemoryMonitor;
use cluster_telemetry_agent::observability::Metrics;
use cluster_telemetry_agent::state_machine::StateMachine;
use cluster_telemetry_agent::store::Stores;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::load().context("loading configuration")?;
    let client = build_kube_client().await.context("constructing cluster client")?;

    let clock = system_clock();
    let metrics = Metrics::new();
    let stores = Stores::new(clock.clone());
    let state_machine = Arc::new(StateMachine::new(clock.clone()));
    let error_collector = Arc::new(ErrorCollector::new(clock.clone()));

    let capabilities = discovery::discover(client.clone(), config.dcgm_exporter_endpoints.clone()).await;
    info!(
        metrics_server = capabilities.metrics_server,
        vpa = capabilities.vpa,
        karpenter = capabilities.karpenter,
        provider = capabilities.provider.as_str(),
        "capability discovery complete"
    );

    let collector_metrics = Arc::new(metrics.clone());
    let registry = build_registry(client.clone(), &config, &capabilities, &stores, collector_metrics);

    let (agent, handle) = Agent::new(
        config.clone(),
        registry,
        stores.clone(),
        metrics.clone(),
        clock.clone(),
        AGENT_VERSION.to_string(),
        state_machine.clone(),
        error_collector.clone(),
    );

    let memory_monitor = MemoryMonitor::new(
        None,
        None,
        Some(Box::new(|| {
            warn!("memory pressure threshold exceeded, no eviction policy configured");
        })),
    );
    memory_monitor.start();

    let shutdown = CancellationToken::new();

    let health_shutdown = shutdown.clone();
    let health_port = config.health_port;
    let health_task = tokio::spawn(async move {
        if let Err(err) = health::serve(handle, health_port, health_shutdown).await {
            error!(error = %err, "health surface exited with an error");
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    let result = agent.run(shutdown.clone()).await;

    memory_monitor.stop().await;
    shutdown.cancel();
    let _ = health_task.await;

    match result {
        Ok(()) | Err(cluster_telemetry_agent::AgentError::Canceled) => Ok(()),
        Err(err) => Err(err).context("agent run loop exited with an error"),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Registers every standard collector plus the capability-gated ones
/// (spec §4.5) that discovery confirmed are reachable.
fn build_registry(
    client: Client,
    config: &Config,
    capabilities: &Capabilities,
    stores: &Stores,
    metrics: Arc<Metrics>,
) -> CollectorRegistry {
    let store = stores.store.clone();
    let metrics_store = stores.metrics.clone();
    let mut registry = CollectorRegistry::new();

    registry.register(kinds::nodes(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::pods(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::namespaces(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::deployments(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::stateful_sets(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::daemon_sets(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::replica_sets(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::jobs(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::cron_jobs(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::services(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::ingresses(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::persistent_volumes(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::persistent_volume_claims(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::storage_classes(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::priority_classes(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::limit_ranges(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::resource_quotas(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::pdbs(client.clone(), store.clone(), metrics.clone()));
    registry.register(kinds::hpas(client.clone(), store.clone(), metrics.clone()));

    if capabilities.vpa {
        let api = dynamic_api(
            client.clone(),
            "autoscaling.k8s.io",
            "v1",
            "VerticalPodAutoscaler",
            "verticalpodautoscalers",
        );
        registry.register(kinds::vpas(api, config.informer_resync_period, store.clone(), metrics.clone()));
    } else {
        info!("VPA CRD not detected, skipping vpas collector");
    }

    if capabilities.karpenter {
        let api = dynamic_api(client.clone(), "karpenter.sh", "v1", "NodePool", "nodepools");
        registry.register(Arc::new(NodePoolCollector::new(
            api,
            config.informer_resync_period,
            store.clone(),
            metrics.clone(),
        )));
    } else {
        info!("karpenter NodePool CRD not detected, skipping nodepools collector");
    }

    if capabilities.metrics_server {
        let node_api = dynamic_api(client.clone(), "metrics.k8s.io", "v1beta1", "NodeMetrics", "nodes");
        let pod_api = dynamic_api(client.clone(), "metrics.k8s.io", "v1beta1", "PodMetrics", "pods");
        registry.register(Arc::new(MetricsServerCollector::new(
            node_api,
            pod_api,
            config.metrics_interval,
            metrics_store.clone(),
            metrics.clone(),
        )));
    } else {
        info!("metrics-server not detected, skipping metrics-server collector");
    }

    if config.gpu_metrics_enabled && !capabilities.dcgm_exporter_endpoints.is_empty() {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        let endpoints = static_endpoint_source(capabilities.dcgm_exporter_endpoints.clone());
        registry.register(Arc::new(GpuCollector::new(
            http,
            endpoints,
            config.gpu_metrics_interval,
            metrics_store.clone(),
            metrics.clone(),
        )));
    } else {
        info!("gpu metrics disabled or no dcgm-exporter endpoints configured, skipping gpu collector");
    }

    registry
}

/// Builds an `Api<DynamicObject>` for a GVK with no native k8s-openapi
/// type (spec §4.5), cluster-wide so it also lists namespaced kinds across
/// every namespace, matching the standard collectors' `Api::all`.
fn dynamic_api(client: Client, group: &str, version: &str, kind: &str, plural: &str) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(group, version, kind);
    let ar = ApiResource::from_gvk_with_plural(&gvk, plural);
    Api::all_with(client, &ar)
}

/// GPU endpoints are supplied once at startup via static configuration
/// (spec §4.5 "dcgm-exporter endpoints"); there's no live node-to-endpoint
/// discovery, so the source is a fixed list for the process lifetime.
fn static_endpoint_source(endpoints: Vec<String>) -> EndpointSource {
    let pairs: Vec<(String, String)> = endpoints.into_iter().map(|url| (hostname_of(&url), url)).collect();
    Arc::new(move || pairs.clone())
}

fn hostname_of(url: &str) -> String {
    url.parse::<http::Uri>()
        .ok()
        .and_then(|u| u.host().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
