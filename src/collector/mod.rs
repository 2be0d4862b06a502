//! Collectors: event-driven watchers that translate external add/update/
//! delete events into store writes (spec §4.3).

pub mod convert;
pub mod crd;
pub mod gpu_collector;
pub mod kinds;
pub mod metrics_server;
pub mod nodepool;
pub mod registry;
pub mod watch;

pub use registry::{CollectorRegistry, PartialStartError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Capability interface every collector implements. There is one concrete
/// type per entity kind; they share no inheritance, only this capability
/// set (spec §9 "Polymorphism over a thing with a Name/Start/WaitForSync/
/// Stop").
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable name, unique across the registry (`nodes`, `pods`, ...).
    fn name(&self) -> &'static str;

    /// Begin background event production and start writing to the store.
    /// Must return promptly — the actual watch loop runs in a spawned task.
    async fn start(&self, shutdown: CancellationToken) -> Result<()>;

    /// Block until the initial listing has been processed, or until `ctx`
    /// is canceled.
    async fn wait_for_sync(&self, ctx: CancellationToken) -> Result<()>;

    /// Signal termination and block until background work has finished.
    /// Idempotent under repeated invocation.
    async fn stop(&self);
}
