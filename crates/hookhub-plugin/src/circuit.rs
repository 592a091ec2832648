//! Per-plugin circuit breaker.
//!
//! Transitions:
//! - Closed: success resets the failure count; the N-th consecutive failure
//!   opens the circuit.
//! - Open: calls are skipped until the cooldown elapses, then exactly one
//!   trial call is admitted (HalfOpen).
//! - HalfOpen: the trial's success closes the circuit, its failure reopens
//!   it with a fresh `opened_at` and the count held at N.
//!
//! Results that arrive while the circuit is Open came from calls admitted
//! before it opened and are ignored.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast; calls are skipped.
    Open,
    /// Cooldown elapsed; one trial call decides the next state.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Decision taken before invoking a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; invoke normally.
    Allowed,
    /// This call is the single HalfOpen trial.
    Trial,
    /// Circuit open (or a trial is already running); skip.
    Rejected,
}

/// Point-in-time view of a circuit, for admin listings.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures recorded.
    pub consecutive_failures: u32,
    /// Milliseconds since the circuit last opened, if it has.
    pub opened_ms_ago: Option<u64>,
}

/// Circuit record shared between the registry entry and dispatchers.
pub type SharedCircuit = Arc<Mutex<CircuitBreaker>>;

/// Circuit breaker for one plugin.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    failure_threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    /// Creates a closed circuit. A threshold of zero is treated as one.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    /// Creates a closed circuit wrapped for sharing.
    pub fn shared(failure_threshold: u32, cooldown: Duration) -> SharedCircuit {
        Arc::new(Mutex::new(Self::new(failure_threshold, cooldown)))
    }

    /// Decides whether a call may proceed at `now`.
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|opened| now.saturating_duration_since(opened))
                    .unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    info!("Circuit breaker entering half-open state for recovery test");
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    Admission::Rejected
                } else {
                    self.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker closing after successful recovery");
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed or timed-out call at `now`.
    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = self.consecutive_failures,
                        "Circuit breaker opening due to consecutive failures"
                    );
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker re-opening after failed recovery attempt");
                self.state = CircuitState::Open;
                self.consecutive_failures = self.failure_threshold;
                self.opened_at = Some(now);
                self.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Gives back a trial slot whose call was cancelled before finishing.
    pub fn release_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures recorded.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Snapshot for reporting.
    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_ms_ago: self
                .opened_at
                .map(|opened| Instant::now().saturating_duration_since(opened).as_millis() as u64),
        }
    }
}

/// A HalfOpen trial slot held for the duration of one call.
///
/// Dropping the slot unsettled, because the dispatch was cancelled, dropped
/// or unwound mid-call, gives the slot back to the circuit.
#[derive(Debug)]
pub struct TrialSlot {
    circuit: SharedCircuit,
    settled: bool,
}

impl TrialSlot {
    /// Wraps a slot already taken via [`CircuitBreaker::admit`].
    pub fn new(circuit: SharedCircuit) -> Self {
        Self {
            circuit,
            settled: false,
        }
    }

    /// Marks the trial's result as recorded; the slot is not released.
    pub fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for TrialSlot {
    fn drop(&mut self) {
        if !self.settled {
            self.circuit.lock().release_trial();
        }
    }
}
