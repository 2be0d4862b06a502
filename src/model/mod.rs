//! Value types for entities, snapshots, and the ingest wire protocol
//! (spec §3, §6). Pure data — no behavior lives here.

pub mod entities;
pub mod gpu;
pub mod keys;
pub mod metrics;
pub mod response;
pub mod snapshot;

pub use entities::*;
pub use gpu::{GpuDeviceInfo, GpuSample};
pub use metrics::{ContainerMetrics, NodeMetrics, PodMetrics};
pub use response::{Directives, Quota, SnapshotErrorResponse, SnapshotResponse};
pub use snapshot::{ActiveError, ClusterSnapshot, Health, Summary};
