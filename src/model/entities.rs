//! Entity value types (spec §3).
//!
//! These are plain data — no behavior, no I/O. Every type derives `Clone` so
//! a `TypedStore::Values()` read can hand out independent value-copies, and
//! `Serialize`/`Deserialize` with snake_case field names for the wire
//! protocol (spec §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference to an owning object. Ownership is by UID where the owner is
/// known to the agent's stores, and by `(kind, name, namespace)` otherwise
/// (spec §3 "Relationships").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl OwnerRef {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.name.is_empty()
    }
}

/// CPU (fractional cores) + memory (bytes) pair used for requests, limits,
/// and usage totals throughout the data model. Usage fields are nullable
/// (spec §3: "Every optional numeric is nullable").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount {
        cpu_cores: Some(0.0),
        memory_bytes: Some(0),
    };

    pub fn add(&self, other: &ResourceAmount) -> ResourceAmount {
        ResourceAmount {
            cpu_cores: add_opt_f64(self.cpu_cores, other.cpu_cores),
            memory_bytes: add_opt_u64(self.memory_bytes, other.memory_bytes),
        }
    }
}

fn add_opt_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

fn add_opt_u64(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub cpu_request_cores: Option<f64>,
    #[serde(default)]
    pub memory_request_bytes: Option<u64>,
    #[serde(default)]
    pub cpu_limit_cores: Option<f64>,
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
    /// Filled in by `SnapshotBuilder` from the metrics merge step, never by
    /// the collector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_bytes: Option<u64>,
    /// GPU samples attributed to this container by `(namespace, pod,
    /// container)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_used_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    /// One of `Running|Pending|Failed|Succeeded|Unknown`.
    pub phase: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
    /// Single owner reference, rewritten in place by the ownership enricher
    /// to point at the top-level controller.
    #[serde(default)]
    pub owner_kind: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
    /// Present only while the owner is a Job whose own `OwnerCronJob` is
    /// non-empty; consumed (not emitted) by the ownership enricher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_cron_job: Option<String>,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Pod {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef {
            kind: self.owner_kind.clone(),
            name: self.owner_name.clone(),
            uid: self.owner_uid.clone(),
        }
    }

    pub fn set_owner(&mut self, owner: OwnerRef) {
        self.owner_kind = owner.kind;
        self.owner_name = owner.name;
        self.owner_uid = owner.uid;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    /// Raw `spec.providerID`, e.g. `aws:///us-east-1a/i-0123...`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub cpu_capacity_cores: f64,
    pub memory_capacity_bytes: u64,
    pub cpu_allocatable_cores: f64,
    pub memory_allocatable_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_bytes: Option<u64>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub gpu_devices: Vec<crate::model::gpu::GpuDeviceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_tensor_active_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_power_watts: Option<f64>,
    #[serde(default)]
    pub gpu_mig_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

/// Aggregated resource totals computed by the Aggregation enricher (spec
/// §4.6). `cpu_usage`/`memory_usage` inside `usage` are null if no matched
/// container reported usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadTotals {
    pub requests: ResourceAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResourceAmount>,
    pub pod_count: usize,
}

/// A reference to a workload that a PDB/Service targets, attached by the
/// Targets enricher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

macro_rules! workload_kind {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $name {
            pub uid: String,
            pub name: String,
            pub namespace: String,
            #[serde(default)]
            pub selector: std::collections::BTreeMap<String, String>,
            #[serde(default)]
            pub labels: std::collections::BTreeMap<String, String>,
            pub desired_replicas: i32,
            pub ready_replicas: i32,
            #[serde(skip_serializing_if = "Option::is_none")]
            pub totals: Option<WorkloadTotals>,
        }
    };
}

workload_kind!(Deployment);
workload_kind!(StatefulSet);
workload_kind!(DaemonSet);

/// Internal only — never emitted in a snapshot (spec §3). Used solely to
/// resolve Pod → Deployment/Rollout ownership chains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicaSet {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub owner_kind: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
}

impl ReplicaSet {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef {
            kind: self.owner_kind.clone(),
            name: self.owner_name.clone(),
            uid: self.owner_uid.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub owner_cron_job: Option<String>,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<WorkloadTotals>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronJob {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub schedule: String,
    pub suspended: bool,
}

/// A generic CRD projection (spec §3): a thin, best-effort rendering of a
/// custom workload, used for rollout-style controllers this agent doesn't
/// have a native type for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomWorkload {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub api_version: String,
    #[serde(default)]
    pub selector: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hpa {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub target_kind: String,
    pub target_name: String,
    pub min_replicas: Option<i32>,
    pub max_replicas: i32,
    pub current_replicas: i32,
    pub desired_replicas: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vpa {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub target_kind: String,
    pub target_name: String,
    pub update_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pdb {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub match_labels: std::collections::BTreeMap<String, String>,
    pub min_available: Option<String>,
    pub max_unavailable: Option<String>,
    pub disruptions_allowed: i32,
    /// Attached by the Targets enricher.
    #[serde(default)]
    pub target_workloads: Vec<WorkloadRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub selector: std::collections::BTreeMap<String, String>,
    pub service_type: String,
    #[serde(default)]
    pub target_workloads: Vec<WorkloadRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ingress {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    pub ingress_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentVolume {
    pub uid: String,
    pub name: String,
    pub capacity_bytes: u64,
    pub storage_class: Option<String>,
    pub bound_claim: Option<String>,
    pub phase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub requested_bytes: u64,
    pub bound_volume: Option<String>,
    pub storage_class: Option<String>,
    pub phase: String,
    /// Reserved — see DESIGN.md "Mounts enricher". Always empty; the agent
    /// does not fabricate mount relationships it cannot observe.
    #[serde(default)]
    pub mounted_by_pods: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageClass {
    pub name: String,
    pub provisioner: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityClass {
    pub name: String,
    pub value: i32,
    pub global_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitRange {
    pub uid: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub hard: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub used: std::collections::BTreeMap<String, String>,
}

/// Cluster-autoscaler-style node pool (spec §3). No native watch API;
/// populated by periodic polling of the provider-specific CRD when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePool {
    pub name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub current_size: i32,
    pub instance_type: Option<String>,
}
