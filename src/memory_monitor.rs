//! Lightweight memory-pressure monitor (spec §4.13). Polls the process's
//! resident set size against a cgroup-reported limit and invokes a
//! callback once the ratio crosses a threshold. A no-op when no limit can
//! be determined — this is deliberately not a general-purpose metrics
//! collector, just a cheap backpressure signal.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_THRESHOLD: f64 = 0.8;

pub type PressureCallback = Box<dyn Fn() + Send + Sync>;

pub struct MemoryMonitor {
    poll_interval: Duration,
    threshold: f64,
    callback: std::sync::Arc<PressureCallback>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    pub fn new(poll_interval: Option<Duration>, threshold: Option<f64>, callback: Option<PressureCallback>) -> Self {
        Self {
            poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
            callback: std::sync::Arc::new(callback.unwrap_or_else(|| Box::new(default_gc_hint))),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Starts the polling task. A no-op if no memory limit can be read at
    /// startup (spec: "No-op when no memory limit is set").
    pub fn start(&self) {
        let Some(limit_bytes) = read_memory_limit_bytes() else {
            debug!("no memory limit detected, memory-pressure monitor stays idle");
            return;
        };

        let mut handle = self.handle.lock().expect("memory monitor lock poisoned");
        if handle.is_some() {
            return;
        }

        let poll_interval = self.poll_interval;
        let threshold = self.threshold;
        let callback = self.callback.clone();
        let cancel = self.cancel.clone();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let Some(used_bytes) = read_rss_bytes() else { continue };
                        let ratio = used_bytes as f64 / limit_bytes as f64;
                        if ratio > threshold {
                            warn!(ratio, threshold, "memory pressure threshold exceeded");
                            callback();
                        }
                    }
                }
            }
        }));
    }

    /// Signals the polling task to stop. Idempotent: a second call is a
    /// no-op, as is calling it when `start` never spawned anything.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().expect("memory monitor lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn default_gc_hint() {
    debug!("memory pressure callback fired (default: no-op GC hint)");
}

/// cgroup v2 first, falling back to v1; `None` means unbounded or
/// unreadable, both of which disable the monitor.
fn read_memory_limit_bytes() -> Option<u64> {
    if let Ok(text) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
        let text = text.trim();
        if text != "max" {
            return text.parse::<u64>().ok();
        }
        return None;
    }
    if let Ok(text) = std::fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        let value = text.trim().parse::<u64>().ok()?;
        // cgroup v1 reports i64::MAX-ish sentinels for "unbounded".
        if value < (1u64 << 62) {
            return Some(value);
        }
    }
    None
}

fn read_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_without_start_is_a_harmless_no_op() {
        let monitor = MemoryMonitor::new(None, None, None);
        monitor.stop().await;
        monitor.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let monitor = MemoryMonitor::new(
            Some(Duration::from_millis(10)),
            Some(0.0),
            Some(Box::new(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );
        monitor.start();
        monitor.start();
        monitor.stop().await;
    }
}
