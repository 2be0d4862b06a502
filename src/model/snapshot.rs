//! The assembled point-in-time cluster description (spec §3, §4.7, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub stale_resources: Vec<String>,
    #[serde(default)]
    pub active_errors: Vec<ActiveError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveError {
    pub code: String,
    pub component: String,
    pub message: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub node_count: usize,
    pub pod_count: usize,
    pub running_pod_count: usize,
    pub pending_pod_count: usize,
    pub failed_pod_count: usize,
    pub container_count: usize,
    pub namespace_count: usize,
    pub deployment_count: usize,
    pub stateful_set_count: usize,
    pub daemon_set_count: usize,
    pub job_count: usize,
    pub cron_job_count: usize,

    pub cpu_capacity_cores: f64,
    pub memory_capacity_bytes: u64,
    pub cpu_allocatable_cores: f64,
    pub memory_allocatable_bytes: u64,
    pub total_cpu_requested_cores: f64,
    pub total_memory_requested_bytes: u64,

    pub metrics_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cpu_usage_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory_usage_bytes: Option<u64>,

    pub gpu_metrics_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gpu_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gpu_tensor_active_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gpu_memory_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gpu_memory_total_bytes: Option<u64>,

    pub pv_capacity_bytes: u64,
    pub pvc_requested_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub snapshot_id: Uuid,
    pub cluster_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub agent_version: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub namespaces: Vec<Namespace>,
    pub deployments: Vec<Deployment>,
    pub stateful_sets: Vec<StatefulSet>,
    pub daemon_sets: Vec<DaemonSet>,
    pub jobs: Vec<Job>,
    pub cron_jobs: Vec<CronJob>,
    pub custom_workloads: Vec<CustomWorkload>,
    pub hpas: Vec<Hpa>,
    pub vpas: Vec<Vpa>,
    pub pdbs: Vec<Pdb>,
    pub services: Vec<Service>,
    pub ingresses: Vec<Ingress>,
    pub persistent_volumes: Vec<PersistentVolume>,
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    pub storage_classes: Vec<StorageClass>,
    pub priority_classes: Vec<PriorityClass>,
    pub limit_ranges: Vec<LimitRange>,
    pub resource_quotas: Vec<ResourceQuota>,
    pub node_pools: Vec<NodePool>,

    pub summary: Summary,
    pub health: Health,
}

impl ClusterSnapshot {
    pub fn new_empty(cluster_id: String, agent_version: String) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            cluster_id,
            agent_version,
            ..Default::default()
        }
    }
}
