//! In-cluster telemetry agent: watches a Kubernetes cluster's workloads and
//! nodes, periodically assembles a point-in-time snapshot, and streams it
//! to a configured backend.

pub mod agent;
pub mod builder;
pub mod clock;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod enrich;
pub mod error;
pub mod error_collector;
pub mod health;
pub mod memory_monitor;
pub mod model;
pub mod observability;
pub mod state_machine;
pub mod store;
pub mod transport;

pub use error::{AgentError, Result};
