//! `SnapshotBuilder` (spec §4.7): assembles one `ClusterSnapshot` from the
//! current store contents. Runs on every tick; never fails — partial data
//! is always preferred over no data.

pub mod summary;

use std::collections::HashMap;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::discovery::Provider;
use crate::enrich::{ownership, EnrichmentPipeline};
use crate::model::*;
use crate::observability::Metrics;
use crate::store::Stores;

/// Everything the builder needs that doesn't live in a store: the
/// configured cluster identity and the interval staleness is measured
/// against (spec §4.7 step 9).
pub struct SnapshotIdentity {
    pub cluster_id: String,
    pub cluster_name: Option<String>,
    pub agent_version: String,
    pub snapshot_interval: Duration,
}

pub struct SnapshotBuilder {
    stores: Stores,
    identity: SnapshotIdentity,
    metrics: Metrics,
    clock: SharedClock,
    pipeline: EnrichmentPipeline,
}

impl SnapshotBuilder {
    pub fn new(stores: Stores, identity: SnapshotIdentity, metrics: Metrics, clock: SharedClock) -> Self {
        Self {
            stores,
            identity,
            metrics,
            clock,
            pipeline: EnrichmentPipeline::standard(),
        }
    }

    /// Assembles a full snapshot. Infallible by design (spec §4.7: "Build
    /// never fails").
    pub async fn build(&self) -> ClusterSnapshot {
        let start = std::time::Instant::now();

        let store = self.stores.store.clone();
        let metrics_store = self.stores.metrics.clone();

        // Step 1: concurrent reads of every entity store. ReplicaSets are
        // kept local — they're internal-only and never reach the snapshot.
        let (
            mut nodes,
            mut pods,
            namespaces,
            mut deployments,
            mut stateful_sets,
            mut daemon_sets,
            replica_sets,
            mut jobs,
            cron_jobs,
            custom_workloads,
            hpas,
            vpas,
            pdbs,
            services,
            ingresses,
            persistent_volumes,
            persistent_volume_claims,
            storage_classes,
            priority_classes,
            limit_ranges,
            resource_quotas,
            node_pools,
        ) = tokio::join!(
            values(&store.nodes),
            values(&store.pods),
            values(&store.namespaces),
            values(&store.deployments),
            values(&store.stateful_sets),
            values(&store.daemon_sets),
            values(&store.replica_sets),
            values(&store.jobs),
            values(&store.cron_jobs),
            values(&store.custom_workloads),
            values(&store.hpas),
            values(&store.vpas),
            values(&store.pdbs),
            values(&store.services),
            values(&store.ingresses),
            values(&store.persistent_volumes),
            values(&store.persistent_volume_claims),
            values(&store.storage_classes),
            values(&store.priority_classes),
            values(&store.limit_ranges),
            values(&store.resource_quotas),
            values(&store.node_pools),
        );

        // Step 2: concurrent reads of the metrics stores.
        let (node_metrics, pod_metrics, gpu_samples) = tokio::join!(
            values(&metrics_store.node_metrics),
            values(&metrics_store.pod_metrics),
            values(&metrics_store.gpu_samples),
        );

        // Step 3: merge node metrics.
        let node_metrics_by_name: HashMap<&str, &NodeMetrics> =
            node_metrics.iter().map(|m| (m.node_name.as_str(), m)).collect();
        for node in nodes.iter_mut() {
            if let Some(m) = node_metrics_by_name.get(node.name.as_str()) {
                node.cpu_usage_cores = Some(m.cpu_usage_cores);
                node.memory_usage_bytes = Some(m.memory_usage_bytes);
            }
        }

        // Step 4: merge pod container metrics.
        let pod_metrics_by_key: HashMap<String, &PodMetrics> = pod_metrics
            .iter()
            .map(|m| (keys::namespaced_key(&m.namespace, &m.pod_name), m))
            .collect();
        for pod in pods.iter_mut() {
            let Some(pm) = pod_metrics_by_key.get(&keys::namespaced_key(&pod.namespace, &pod.name)) else {
                continue;
            };
            let containers_by_name: HashMap<&str, &ContainerMetrics> =
                pm.containers.iter().map(|c| (c.name.as_str(), c)).collect();
            for container in pod.containers.iter_mut() {
                if let Some(cm) = containers_by_name.get(container.name.as_str()) {
                    container.cpu_usage_cores = Some(cm.cpu_usage_cores);
                    container.memory_usage_bytes = Some(cm.memory_usage_bytes);
                }
            }
        }

        // Step 5: merge GPU samples, per node and per container.
        merge_gpu_onto_nodes(&mut nodes, &gpu_samples);
        merge_gpu_onto_containers(&mut pods, &gpu_samples);

        // Step 6: ownership, then the standard enrichment pipeline.
        ownership::resolve(&mut pods, &replica_sets);

        let mut snapshot = ClusterSnapshot {
            snapshot_id: uuid::Uuid::new_v4(),
            cluster_id: self.identity.cluster_id.clone(),
            cluster_name: self.identity.cluster_name.clone(),
            agent_version: self.identity.agent_version.clone(),
            timestamp_ms: self.clock.now().timestamp_millis(),
            provider: None,
            region: None,
            nodes,
            pods,
            namespaces,
            deployments: std::mem::take(&mut deployments),
            stateful_sets: std::mem::take(&mut stateful_sets),
            daemon_sets: std::mem::take(&mut daemon_sets),
            jobs: std::mem::take(&mut jobs),
            cron_jobs,
            custom_workloads,
            hpas,
            vpas,
            pdbs,
            services,
            ingresses,
            persistent_volumes,
            persistent_volume_claims,
            storage_classes,
            priority_classes,
            limit_ranges,
            resource_quotas,
            node_pools,
            summary: Summary::default(),
            health: Health::default(),
        };

        self.pipeline.run(&mut snapshot, &self.metrics);

        // Step 7: summary.
        snapshot.summary = summary::compute(&snapshot);

        // Step 8: identity stamping (provider/region from the first node).
        if let Some(first) = snapshot.nodes.first() {
            snapshot.provider = first
                .provider_id
                .as_deref()
                .map(Provider::from_provider_id)
                .filter(|p| *p != Provider::Unknown)
                .map(|p| p.as_str().to_string());
            snapshot.region = first.zone.clone();
        }

        // Step 9: staleness.
        let now = self.clock.now();
        let stale_after = chrono::Duration::from_std(self.identity.snapshot_interval * 3)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));
        for (kind, last_updated) in store.last_updated_times() {
            if now - last_updated > stale_after {
                snapshot.health.stale_resources.push(kind.to_string());
            }
        }

        // Step 10: record build duration.
        let elapsed = start.elapsed().as_secs_f64();
        self.metrics
            .snapshot_build_duration_seconds
            .with_label_values(&["ok"])
            .observe(elapsed);

        snapshot
    }
}

async fn values<K, V>(store: &crate::store::typed_store::TypedStore<K, V>) -> Vec<V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone,
{
    store.values()
}

fn merge_gpu_onto_nodes(nodes: &mut [Node], samples: &[GpuSample]) {
    let mut by_host: HashMap<&str, Vec<&GpuSample>> = HashMap::new();
    for s in samples {
        by_host.entry(s.hostname.as_str()).or_default().push(s);
    }

    for node in nodes.iter_mut() {
        let Some(devices) = by_host.get(node.name.as_str()) else {
            continue;
        };
        if devices.is_empty() {
            continue;
        }

        node.gpu_devices = devices.iter().map(|s| GpuDeviceInfo::from(*s)).collect();

        let util: Vec<f64> = devices.iter().filter_map(|s| s.utilization_percent).collect();
        if !util.is_empty() {
            node.gpu_utilization_percent = Some(util.iter().sum::<f64>() / util.len() as f64);
        }
        let tensor: Vec<f64> = devices.iter().filter_map(|s| s.tensor_active_percent).collect();
        if !tensor.is_empty() {
            node.gpu_tensor_active_percent = Some(tensor.iter().sum::<f64>() / tensor.len() as f64);
        }

        let mem_used: u64 = devices.iter().filter_map(|s| s.memory_used_bytes).sum();
        let mem_total: u64 = devices.iter().filter_map(|s| s.memory_total_bytes).sum();
        if devices.iter().any(|s| s.memory_used_bytes.is_some()) {
            node.gpu_memory_used_bytes = Some(mem_used);
        }
        if devices.iter().any(|s| s.memory_total_bytes.is_some()) {
            node.gpu_memory_total_bytes = Some(mem_total);
        }

        node.gpu_temperature_celsius = devices
            .iter()
            .filter_map(|s| s.temperature_celsius)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))));
        let power: f64 = devices.iter().filter_map(|s| s.power_watts).sum();
        if devices.iter().any(|s| s.power_watts.is_some()) {
            node.gpu_power_watts = Some(power);
        }

        node.gpu_mig_enabled = devices.iter().any(|s| s.mig_enabled);
        node.gpu_model = devices.first().map(|s| s.model.clone());
    }
}

fn merge_gpu_onto_containers(pods: &mut [Pod], samples: &[GpuSample]) {
    let mut by_key: HashMap<(&str, &str, &str), Vec<&GpuSample>> = HashMap::new();
    for s in samples {
        if !s.has_workload_attribution() {
            continue;
        }
        by_key
            .entry((s.namespace.as_str(), s.pod.as_str(), s.container.as_str()))
            .or_default()
            .push(s);
    }
    if by_key.is_empty() {
        return;
    }

    for pod in pods.iter_mut() {
        let namespace = pod.namespace.clone();
        let pod_name = pod.name.clone();
        for container in pod.containers.iter_mut() {
            let Some(samples) = by_key.get(&(namespace.as_str(), pod_name.as_str(), container.name.as_str()))
            else {
                continue;
            };
            if samples.is_empty() {
                continue;
            }
            let util: Vec<f64> = samples.iter().filter_map(|s| s.utilization_percent).collect();
            if !util.is_empty() {
                container.gpu_utilization_percent = Some(util.iter().sum::<f64>() / util.len() as f64);
            }
            if samples.iter().any(|s| s.memory_used_bytes.is_some()) {
                container.gpu_memory_used_bytes =
                    Some(samples.iter().filter_map(|s| s.memory_used_bytes).sum());
            }
        }
    }
}

/// Re-exported so callers don't need to depend on `crate::model::keys`
/// directly just for key construction in tests below.
mod keys {
    pub use crate::model::keys::namespaced_key;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{system_clock, ManualClock};
    use crate::model::entities::Container;
    use chrono::Utc;

    fn builder() -> SnapshotBuilder {
        let clock = system_clock();
        let stores = Stores::new(clock.clone());
        let identity = SnapshotIdentity {
            cluster_id: "c1".into(),
            cluster_name: Some("test-cluster".into()),
            agent_version: "0.1.0".into(),
            snapshot_interval: Duration::from_secs(30),
        };
        SnapshotBuilder::new(stores, identity, Metrics::new(), clock)
    }

    #[tokio::test]
    async fn builds_empty_snapshot_without_failing() {
        let b = builder();
        let snapshot = b.build().await;
        assert_eq!(snapshot.cluster_id, "c1");
        assert_eq!(snapshot.summary.node_count, 0);
    }

    #[tokio::test]
    async fn merges_node_metrics_onto_matching_node() {
        let b = builder();
        b.stores.store.nodes.set(
            "n1".into(),
            Node {
                name: "n1".into(),
                ..Default::default()
            },
        );
        b.stores.metrics.node_metrics.set(
            "n1".into(),
            NodeMetrics {
                node_name: "n1".into(),
                cpu_usage_cores: 2.0,
                memory_usage_bytes: 1024,
                timestamp: Utc::now(),
            },
        );

        let snapshot = b.build().await;
        assert_eq!(snapshot.nodes[0].cpu_usage_cores, Some(2.0));
        assert!(snapshot.summary.metrics_available);
    }

    #[tokio::test]
    async fn merges_pod_container_metrics_by_namespaced_key() {
        let b = builder();
        b.stores.store.pods.set(
            "default/p1".into(),
            Pod {
                namespace: "default".into(),
                name: "p1".into(),
                containers: vec![Container {
                    name: "app".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        b.stores.metrics.pod_metrics.set(
            "default/p1".into(),
            PodMetrics {
                namespace: "default".into(),
                pod_name: "p1".into(),
                containers: vec![ContainerMetrics {
                    name: "app".into(),
                    cpu_usage_cores: 0.1,
                    memory_usage_bytes: 2048,
                }],
                timestamp: Utc::now(),
            },
        );

        let snapshot = b.build().await;
        assert_eq!(snapshot.pods[0].containers[0].cpu_usage_cores, Some(0.1));
    }

    #[tokio::test]
    async fn attaches_gpu_samples_to_matching_node_with_aggregates() {
        let b = builder();
        b.stores.store.nodes.set(
            "gpu-node".into(),
            Node {
                name: "gpu-node".into(),
                ..Default::default()
            },
        );
        b.stores.metrics.gpu_samples.set(
            "gpu-node/0".into(),
            GpuSample {
                hostname: "gpu-node".into(),
                device_index: 0,
                model: "A100".into(),
                utilization_percent: Some(50.0),
                memory_used_bytes: Some(1000),
                memory_total_bytes: Some(2000),
                ..Default::default()
            },
        );
        b.stores.metrics.gpu_samples.set(
            "gpu-node/1".into(),
            GpuSample {
                hostname: "gpu-node".into(),
                device_index: 1,
                model: "A100".into(),
                utilization_percent: Some(70.0),
                memory_used_bytes: Some(1500),
                memory_total_bytes: Some(2000),
                ..Default::default()
            },
        );

        let snapshot = b.build().await;
        let node = &snapshot.nodes[0];
        assert_eq!(node.gpu_devices.len(), 2);
        assert_eq!(node.gpu_utilization_percent, Some(60.0));
        assert_eq!(node.gpu_memory_used_bytes, Some(2500));
        assert_eq!(node.gpu_memory_total_bytes, Some(4000));
    }

    #[tokio::test]
    async fn staleness_flags_kinds_past_three_times_the_interval() {
        let clock = ManualClock::new(Utc::now());
        let shared: SharedClock = std::sync::Arc::new(clock.clone());
        let stores = Stores::new(shared.clone());
        stores.store.nodes.set(
            "n1".into(),
            Node {
                name: "n1".into(),
                ..Default::default()
            },
        );

        let identity = SnapshotIdentity {
            cluster_id: "c1".into(),
            cluster_name: None,
            agent_version: "0.1.0".into(),
            snapshot_interval: Duration::from_secs(10),
        };
        let b = SnapshotBuilder::new(stores, identity, Metrics::new(), shared);

        clock.advance(chrono::Duration::seconds(31));
        let snapshot = b.build().await;
        assert!(snapshot.health.stale_resources.contains(&"nodes".to_string()));
    }
}
