//! `StateMachine` (spec §4.10): the agent's lifecycle state, driven by
//! transport outcomes. One mutex guards state/reason/backoff deadline
//! together (spec §5 "Shared-resource policy"), mirroring the teacher's
//! `Arc<RwLock<...>>`-around-shared-state style but with a plain `Mutex`
//! since every access here is a short, uncontended critical section.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Starting,
    Running,
    Backoff,
    Stopped,
    Exiting,
}

impl State {
    fn is_terminal(&self) -> bool {
        matches!(self, State::Stopped | State::Exiting)
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

struct Inner {
    state: State,
    reason: String,
    backoff_deadline: Option<DateTime<Utc>>,
    cancel: Option<CancelFn>,
    cancel_invoked: bool,
}

pub struct StateMachine {
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl StateMachine {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner {
                state: State::Starting,
                reason: String::new(),
                backoff_deadline: None,
                cancel: None,
                cancel_invoked: false,
            }),
        }
    }

    /// Registers the process-cancel hook, invoked exactly once on
    /// transition to `Exiting`. Never panics if nothing is registered.
    pub fn set_cancel_fn(&self, f: impl FnOnce() + Send + 'static) {
        let mut inner = self.inner.lock().expect("state machine lock poisoned");
        inner.cancel = Some(Box::new(f));
    }

    pub fn state(&self) -> State {
        self.inner.lock().expect("state machine lock poisoned").state
    }

    pub fn state_reason(&self) -> String {
        self.inner.lock().expect("state machine lock poisoned").reason.clone()
    }

    pub fn backoff_remaining(&self) -> chrono::Duration {
        let inner = self.inner.lock().expect("state machine lock poisoned");
        match inner.backoff_deadline {
            Some(deadline) => (deadline - self.clock.now()).max(chrono::Duration::zero()),
            None => chrono::Duration::zero(),
        }
    }

    pub fn is_backoff_expired(&self) -> bool {
        let inner = self.inner.lock().expect("state machine lock poisoned");
        match inner.backoff_deadline {
            Some(deadline) => self.clock.now() >= deadline,
            None => true,
        }
    }

    /// Unconditional transition, used directly by the orchestrator (e.g.
    /// `Backoff -> Running` once expired) as well as internally by
    /// `handle_http_status`.
    pub fn transition_to(&self, state: State, reason: impl Into<String>) {
        let mut inner = self.inner.lock().expect("state machine lock poisoned");
        self.apply(&mut inner, state, reason.into(), None);
    }

    /// Applies the status → state table from spec §4.10.
    pub fn handle_http_status(&self, code: u16, retry_after_seconds: u64) {
        let mut inner = self.inner.lock().expect("state machine lock poisoned");
        if inner.state.is_terminal() && code != 410 {
            return;
        }

        match code {
            200 => self.apply(&mut inner, State::Running, String::new(), None),
            401 | 403 => self.apply(&mut inner, State::Stopped, "authentication failed".into(), None),
            402 => {
                let backoff = if retry_after_seconds > 0 {
                    retry_after_seconds
                } else {
                    300
                };
                self.apply(&mut inner, State::Backoff, "quota exceeded".into(), Some(backoff));
            }
            410 => self.apply(&mut inner, State::Exiting, "agent deprecated".into(), None),
            429 => {
                let backoff = if retry_after_seconds > 0 {
                    retry_after_seconds
                } else {
                    30
                };
                self.apply(&mut inner, State::Backoff, "rate limited".into(), Some(backoff));
            }
            500..=599 => self.apply(&mut inner, State::Running, format!("server error: {code}"), None),
            _ => {}
        }
    }

    fn apply(&self, inner: &mut Inner, state: State, reason: String, backoff_seconds: Option<u64>) {
        inner.state = state;
        inner.reason = reason;
        inner.backoff_deadline = backoff_seconds.map(|secs| self.clock.now() + chrono::Duration::seconds(secs as i64));

        if state == State::Exiting && !inner.cancel_invoked {
            inner.cancel_invoked = true;
            if let Some(cancel) = inner.cancel.take() {
                cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::{Arc, Mutex as StdMutex};

    fn machine() -> (StateMachine, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let shared: SharedClock = Arc::new(clock.clone());
        (StateMachine::new(shared), clock)
    }

    #[test]
    fn status_200_transitions_to_running() {
        let (sm, _clock) = machine();
        sm.handle_http_status(200, 0);
        assert_eq!(sm.state(), State::Running);
        assert_eq!(sm.state_reason(), "");
    }

    #[test]
    fn status_401_stops_the_agent() {
        let (sm, _clock) = machine();
        sm.handle_http_status(401, 0);
        assert_eq!(sm.state(), State::Stopped);
        assert_eq!(sm.state_reason(), "authentication failed");
    }

    #[test]
    fn backoff_then_recovery_scenario() {
        let (sm, clock) = machine();
        sm.transition_to(State::Running, "");
        sm.handle_http_status(429, 60);
        assert_eq!(sm.state(), State::Backoff);
        assert_eq!(sm.state_reason(), "rate limited");
        assert!(!sm.is_backoff_expired());

        clock.advance(chrono::Duration::seconds(61));
        assert!(sm.is_backoff_expired());

        sm.transition_to(State::Running, "");
        sm.handle_http_status(200, 0);
        assert_eq!(sm.state(), State::Running);
    }

    #[test]
    fn deprecation_scenario_invokes_cancel_exactly_once() {
        let (sm, _clock) = machine();
        let calls = Arc::new(StdMutex::new(0));
        let calls_clone = calls.clone();
        sm.set_cancel_fn(move || {
            *calls_clone.lock().unwrap() += 1;
        });

        sm.handle_http_status(410, 0);
        assert_eq!(sm.state(), State::Exiting);
        assert_eq!(sm.state_reason(), "agent deprecated");
        assert_eq!(*calls.lock().unwrap(), 1);

        // A second 410 (or any further transition attempt) must not invoke
        // the cancel hook again.
        sm.transition_to(State::Exiting, "agent deprecated");
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn terminal_state_ignores_further_status_codes_except_410() {
        let (sm, _clock) = machine();
        sm.handle_http_status(401, 0);
        assert_eq!(sm.state(), State::Stopped);

        sm.handle_http_status(200, 0);
        assert_eq!(sm.state(), State::Stopped, "terminal state must not un-stop on 200");

        sm.handle_http_status(410, 0);
        assert_eq!(sm.state(), State::Exiting, "410 always wins, even from a terminal state");
    }

    #[test]
    fn determinism_for_fixed_clock_and_fixed_sequence() {
        let (sm1, clock1) = machine();
        let (sm2, clock2) = machine();

        let sequence = [(200u16, 0u64), (429, 45), (200, 0)];
        for (code, retry) in sequence {
            sm1.handle_http_status(code, retry);
            sm2.handle_http_status(code, retry);
        }
        clock1.advance(chrono::Duration::seconds(46));
        clock2.advance(chrono::Duration::seconds(46));

        assert_eq!(sm1.state(), sm2.state());
        assert_eq!(sm1.state_reason(), sm2.state_reason());
        assert_eq!(sm1.is_backoff_expired(), sm2.is_backoff_expired());
    }
}
