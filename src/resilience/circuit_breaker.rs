//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: a single probe tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: first call attempt after reset_timeout (checked lazily, no timer)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! any → Closed: manual reset()
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource, never shared state across resources
//! - Fail fast in Open state, the wrapped call is not attempted
//! - Single probe in Half-Open (prevents hammering a recovering backend)
//! - The wrapped call runs outside the lock; no retries inside the breaker

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Circuit state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call was rejected because the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker {breaker} is open")]
pub struct CircuitOpen {
    pub breaker: String,
}

/// Outcome of [`CircuitBreaker::call`] when it does not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Short-circuited; the wrapped function was not invoked.
    #[error(transparent)]
    Open(#[from] CircuitOpen),

    /// The wrapped function ran and returned this error.
    #[error("{0}")]
    Call(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    /// The wrapped function's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Call(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped on every transition; outcomes from an older epoch are ignored.
    epoch: u64,
}

/// Failure-tracking state machine guarding one resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
    /// Mirror of `inner.state` for lock-free reads.
    state: AtomicU8,
}

impl CircuitBreaker {
    /// Create a closed breaker. `max_failures` of zero is treated as one.
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
                epoch: 0,
            }),
            state: AtomicU8::new(CircuitState::Closed as u8),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(name, config.max_failures, config.reset_timeout())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Current state without taking the lock.
    ///
    /// An open breaker whose timeout has elapsed still reports `Open` until
    /// the next call attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Run `f` through the breaker.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.try_acquire()?;
        match f() {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(BreakerError::Call(e))
            }
        }
    }

    /// Ask for permission to make one call.
    ///
    /// The returned permit must be settled with [`Permit::success`] or
    /// [`Permit::failure`]; dropping it unsettled counts as a failure.
    pub fn try_acquire(&self) -> Result<Permit<'_>, CircuitOpen> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(Permit::new(self, PermitKind::Normal, inner.epoch)),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(true, |t| t.elapsed() >= self.reset_timeout);
                if !elapsed {
                    drop(inner);
                    return Err(self.short_circuit());
                }
                inner.failure_count = 0;
                inner.probe_in_flight = true;
                self.transition(&mut inner, CircuitState::HalfOpen);
                Ok(Permit::new(self, PermitKind::Probe, inner.epoch))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    drop(inner);
                    return Err(self.short_circuit());
                }
                inner.probe_in_flight = true;
                Ok(Permit::new(self, PermitKind::Probe, inner.epoch))
            }
        }
    }

    /// Force the breaker closed and clear its failure history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.probe_in_flight = false;
        if inner.state == CircuitState::Closed {
            // invalidate outstanding permits all the same
            inner.epoch += 1;
        } else {
            self.transition(&mut inner, CircuitState::Closed);
        }
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    fn on_success(&self, kind: PermitKind, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        let state = inner.state;
        match (kind, state) {
            (PermitKind::Normal, CircuitState::Closed) => inner.failure_count = 0,
            (PermitKind::Probe, CircuitState::HalfOpen) => {
                inner.failure_count = 0;
                inner.probe_in_flight = false;
                self.transition(&mut inner, CircuitState::Closed);
            }
            _ => {}
        }
    }

    fn on_failure(&self, kind: PermitKind, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        let state = inner.state;
        match (kind, state) {
            (PermitKind::Normal, CircuitState::Closed) => {
                inner.failure_count += 1;
                inner.last_failure = Some(Instant::now());
                if inner.failure_count >= self.max_failures {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (PermitKind::Probe, CircuitState::HalfOpen) => {
                inner.failure_count += 1;
                inner.last_failure = Some(Instant::now());
                inner.probe_in_flight = false;
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    /// Must be called with the lock held.
    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        self.state.store(to as u8, Ordering::Release);

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                failures = inner.failure_count,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit half-open, admitting probe")
            }
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, from = %from, "Circuit closed")
            }
        }
        metrics::record_breaker_transition(&self.name, to);
    }

    fn short_circuit(&self) -> CircuitOpen {
        tracing::debug!(breaker = %self.name, "Call short-circuited");
        metrics::record_short_circuit(&self.name);
        CircuitOpen {
            breaker: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Probe,
}

/// Admission for a single call, handed out by [`CircuitBreaker::try_acquire`].
#[must_use = "a permit must be settled with success() or failure()"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    epoch: u64,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, kind: PermitKind, epoch: u64) -> Self {
        Self {
            breaker,
            kind,
            epoch,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.kind == PermitKind::Probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.kind, self.epoch);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.kind, self.epoch);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure(self.kind, self.epoch);
        }
    }
}
