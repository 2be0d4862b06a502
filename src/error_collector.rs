//! `ErrorCollector` (spec §4.11): a TTL-deduplicated table of active
//! errors, keyed by `(ErrorKind, Component)`. Entries older than 5 minutes
//! are pruned whenever the table is read. One mutex guards the whole map
//! (spec §5: "no entry is ever leaked to a caller by reference").

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;
use crate::error::ErrorKind;

const TTL: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone)]
pub struct ActiveError {
    pub kind: ErrorKind,
    pub component: String,
    pub message: String,
    pub last_seen: DateTime<Utc>,
}

struct Entry {
    message: String,
    last_seen: DateTime<Utc>,
}

pub struct ErrorCollector {
    clock: SharedClock,
    entries: Mutex<HashMap<(ErrorKind, String), Entry>>,
}

impl ErrorCollector {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts or refreshes the `(kind, component)` entry, stamping it
    /// with "now".
    pub fn report(&self, kind: ErrorKind, component: impl Into<String>, message: impl Into<String>) {
        let mut entries = self.entries.lock().expect("error collector lock poisoned");
        entries.insert(
            (kind, component.into()),
            Entry {
                message: message.into(),
                last_seen: self.clock.now(),
            },
        );
    }

    /// Non-expired entries, pruning expired ones in the same pass.
    pub fn get_active_errors(&self) -> Vec<ActiveError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("error collector lock poisoned");
        entries.retain(|_, entry| now - entry.last_seen <= TTL);
        entries
            .iter()
            .map(|((kind, component), entry)| ActiveError {
                kind: *kind,
                component: component.clone(),
                message: entry.message.clone(),
                last_seen: entry.last_seen,
            })
            .collect()
    }

    pub fn get_active_error_codes(&self) -> Vec<&'static str> {
        self.get_active_errors().iter().map(|e| e.kind.as_str()).collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("error collector lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn collector() -> (ErrorCollector, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let shared: SharedClock = Arc::new(clock.clone());
        (ErrorCollector::new(shared), clock)
    }

    #[test]
    fn report_and_read_roundtrip() {
        let (ec, _clock) = collector();
        ec.report(ErrorKind::MetricsUnavailable, "metrics-collector", "no metrics server");
        let active = ec.get_active_errors();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, ErrorKind::MetricsUnavailable);
        assert_eq!(active[0].component, "metrics-collector");
    }

    #[test]
    fn entry_expires_after_five_minutes_without_refresh() {
        let (ec, clock) = collector();
        ec.report(ErrorKind::Timeout, "transport", "send timed out");
        clock.advance(chrono::Duration::minutes(5) + chrono::Duration::seconds(1));
        assert!(ec.get_active_errors().is_empty());
    }

    #[test]
    fn re_reporting_before_expiry_refreshes_the_deadline() {
        let (ec, clock) = collector();
        ec.report(ErrorKind::Timeout, "transport", "send timed out");
        clock.advance(chrono::Duration::minutes(4));
        ec.report(ErrorKind::Timeout, "transport", "send timed out again");
        clock.advance(chrono::Duration::minutes(4));
        let active = ec.get_active_errors();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "send timed out again");
    }

    #[test]
    fn clear_drops_everything() {
        let (ec, _clock) = collector();
        ec.report(ErrorKind::BufferFull, "transport", "queue full");
        ec.clear();
        assert!(ec.get_active_errors().is_empty());
    }

    #[test]
    fn distinct_components_are_independent_entries() {
        let (ec, _clock) = collector();
        ec.report(ErrorKind::DiscoveryFailed, "discovery", "group probe failed");
        ec.report(ErrorKind::DiscoveryFailed, "gpu-collector", "endpoint probe failed");
        assert_eq!(ec.get_active_errors().len(), 2);
    }
}
