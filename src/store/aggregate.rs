//! Store aggregate (spec §4.2): one `TypedStore` per entity kind, plus the
//! metrics stores, bundled behind `Arc` so collectors and the snapshot
//! builder can share ownership cheaply.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;
use crate::model::*;

use super::typed_store::TypedStore;

macro_rules! stores {
    ($($field:ident : $kind:literal => $ty:ty),* $(,)?) => {
        pub struct Store {
            $(pub $field: TypedStore<String, $ty>,)*
        }

        impl Store {
            pub fn new(clock: SharedClock) -> Self {
                Self {
                    $($field: TypedStore::new(clock.clone()),)*
                }
            }

            /// Mapping of kind name to current length (spec §4.2, used by
            /// the debug surface).
            pub fn item_counts(&self) -> HashMap<&'static str, usize> {
                let mut out = HashMap::new();
                $(out.insert($kind, self.$field.len());)*
                out
            }

            /// Mapping of kind name to last mutation time (used for
            /// staleness detection, spec §4.7 step 9).
            pub fn last_updated_times(&self) -> HashMap<&'static str, DateTime<Utc>> {
                let mut out = HashMap::new();
                $(out.insert($kind, self.$field.last_updated());)*
                out
            }
        }
    };
}

stores! {
    nodes: "nodes" => Node,
    pods: "pods" => Pod,
    namespaces: "namespaces" => Namespace,
    deployments: "deployments" => Deployment,
    stateful_sets: "statefulsets" => StatefulSet,
    daemon_sets: "daemonsets" => DaemonSet,
    // Internal only — never emitted in a snapshot (spec §3), but still
    // counted/staleness-tracked like any other store.
    replica_sets: "replicasets" => ReplicaSet,
    jobs: "jobs" => Job,
    cron_jobs: "cronjobs" => CronJob,
    custom_workloads: "customworkloads" => CustomWorkload,
    hpas: "hpas" => Hpa,
    vpas: "vpas" => Vpa,
    pdbs: "pdbs" => Pdb,
    services: "services" => Service,
    ingresses: "ingresses" => Ingress,
    persistent_volumes: "persistentvolumes" => PersistentVolume,
    persistent_volume_claims: "persistentvolumeclaims" => PersistentVolumeClaim,
    storage_classes: "storageclasses" => StorageClass,
    priority_classes: "priorityclasses" => PriorityClass,
    limit_ranges: "limitranges" => LimitRange,
    resource_quotas: "resourcequotas" => ResourceQuota,
    node_pools: "nodepools" => NodePool,
}

/// Metric stores: fully replaced on each periodic scrape (spec §3
// "Lifecycle").
pub struct MetricsStore {
    pub node_metrics: TypedStore<String, NodeMetrics>,
    pub pod_metrics: TypedStore<String, PodMetrics>,
    pub gpu_samples: TypedStore<String, GpuSample>,
}

impl MetricsStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            node_metrics: TypedStore::new(clock.clone()),
            pod_metrics: TypedStore::new(clock.clone()),
            gpu_samples: TypedStore::new(clock),
        }
    }
}

/// Shared handle passed to every collector and to the snapshot builder.
#[derive(Clone)]
pub struct Stores {
    pub store: Arc<Store>,
    pub metrics: Arc<MetricsStore>,
}

impl Stores {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            store: Arc::new(Store::new(clock.clone())),
            metrics: Arc::new(MetricsStore::new(clock)),
        }
    }
}
