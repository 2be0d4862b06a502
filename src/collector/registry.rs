//! `CollectorRegistry` (spec §4.4): owns all collectors, starts them,
//! waits for initial sync, tracks partial failure.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AgentError, Result};

use super::Collector;

#[derive(Debug, Error)]
pub struct PartialStartError {
    pub failed_names: Vec<String>,
    pub total: usize,
}

impl fmt::Display for PartialStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} collectors failed to start: {}",
            self.failed_names.len(),
            self.total,
            self.failed_names.join(", ")
        )
    }
}

pub struct CollectorRegistry {
    collectors: Vec<Arc<dyn Collector>>,
    started: std::sync::Mutex<Vec<Arc<dyn Collector>>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            started: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Must be called before `start_all`.
    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        self.collectors.push(collector);
    }

    /// Starts every registered collector. Returns `Ok(())` if all started,
    /// `Err(AllCollectorsFailed)` if *every* collector failed, and logs +
    /// returns a `PartialStartError` (non-fatal) embedded in the ok path
    /// otherwise — collectors that started keep running regardless.
    pub async fn start_all(&self, shutdown: CancellationToken) -> Result<Option<PartialStartError>> {
        let total = self.collectors.len();
        let results = join_all(
            self.collectors
                .iter()
                .map(|c| {
                    let c = c.clone();
                    let shutdown = shutdown.clone();
                    async move { (c.clone(), c.start(shutdown).await) }
                }),
        )
        .await;

        let mut failed_names = Vec::new();
        let mut started = self.started.lock().expect("registry lock poisoned");
        for (collector, result) in results {
            match result {
                Ok(()) => {
                    info!(collector = collector.name(), "collector started");
                    started.push(collector);
                }
                Err(err) => {
                    error!(collector = collector.name(), error = %err, "collector failed to start");
                    failed_names.push(collector.name().to_string());
                }
            }
        }
        drop(started);

        if total > 0 && failed_names.len() == total {
            return Err(AgentError::AllCollectorsFailed);
        }

        if failed_names.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PartialStartError { failed_names, total }))
        }
    }

    /// Returns when every started collector has reported initial sync, or
    /// `ctx` fires first. On `ctx` firing this is *not* fatal — the caller
    /// reports `INFORMER_SYNC_TIMEOUT` and continues in partial-data mode.
    pub async fn wait_for_sync(&self, ctx: CancellationToken) -> Result<()> {
        let started = self.started.lock().expect("registry lock poisoned").clone();
        let waits = started.iter().map(|c| {
            let ctx = ctx.clone();
            async move { c.wait_for_sync(ctx).await }
        });

        let results = join_all(waits).await;
        let mut any_err = None;
        for result in results {
            if let Err(err) = result {
                warn!(error = %err, "collector sync did not complete before deadline");
                any_err = Some(err);
            }
        }
        match any_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Calls `Stop` on every started collector concurrently; blocks until
    /// all have returned.
    pub async fn stop_all(&self) {
        let started = self.started.lock().expect("registry lock poisoned").clone();
        join_all(started.iter().map(|c| c.stop())).await;
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
