//! Usage metric samples (spec §3). Fully replaced on each scrape — partial
//! updates are not supported, so a single `MetricsStore::Set` call per tick
//! per entity is the only mutation path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node_name: String,
    pub cpu_usage_cores: f64,
    pub memory_usage_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    pub cpu_usage_cores: f64,
    pub memory_usage_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub namespace: String,
    pub pod_name: String,
    pub containers: Vec<ContainerMetrics>,
    pub timestamp: DateTime<Utc>,
}
