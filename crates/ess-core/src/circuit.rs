//! Circuit Breaker (C11).
//!
//! One breaker per backend (graph, vector, embedding, and the optional
//! synthesis post-processor). State machine: `closed -> open -> half_open ->
//! closed`, per spec.md §4.9. A single failure observed while half-open
//! reopens the circuit immediately rather than counting toward the next
//! attempt.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitConfig;
use crate::error::EssError;

/// Current state of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through normally.
    Closed,
    /// Calls fail immediately without reaching the backend.
    Open,
    /// A limited number of trial calls are allowed through to probe recovery.
    HalfOpen,
}

struct Breaker {
    state: State,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    last_latency_ms: Option<u64>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            last_failure: None,
            last_latency_ms: None,
        }
    }
}

fn format_instant(t: time::OffsetDateTime) -> String {
    t.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// A snapshot of one backend's health, for `GET /health`.
#[derive(Debug, Clone)]
pub struct HealthEntry {
    /// Current breaker state.
    pub state: State,
    /// Most recent call latency, if any call has been observed.
    pub latency_ms: Option<u64>,
    /// Seconds since the last observed failure, if any.
    pub last_failure_secs_ago: Option<u64>,
}

/// A registry of per-backend circuit breakers, shared process-wide.
pub struct CircuitBreakerRegistry {
    config: CircuitConfig,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry with no breakers yet open; they are created lazily
    /// on first use, all starting `Closed`.
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `service` currently permits a call. Transitions
    /// `Open` -> `HalfOpen` once `reset_timeout_secs` has elapsed.
    pub fn allow(&self, service: &str) -> Result<(), EssError> {
        let mut breakers = self.breakers.lock().expect("circuit registry lock poisoned");
        let breaker = breakers.entry(service.to_string()).or_insert_with(Breaker::new);

        if breaker.state == State::Open {
            let opened_at = breaker.opened_at.unwrap_or_else(Instant::now);
            if opened_at.elapsed() >= Duration::from_secs(self.config.reset_timeout_secs) {
                breaker.state = State::HalfOpen;
                breaker.half_open_successes = 0;
            } else {
                let reset_at = opened_at + Duration::from_secs(self.config.reset_timeout_secs);
                let now = time::OffsetDateTime::now_utc();
                let opened_wall = now - opened_at.elapsed();
                let reset_wall = now + reset_at.saturating_duration_since(Instant::now());
                return Err(EssError::CircuitOpen {
                    service: service.to_string(),
                    opened_at: format_instant(opened_wall),
                    reset_at: format_instant(reset_wall),
                });
            }
        }

        Ok(())
    }

    /// Record the outcome of a call that `allow` permitted.
    pub fn record(&self, service: &str, success: bool, latency_ms: u64) {
        let mut breakers = self.breakers.lock().expect("circuit registry lock poisoned");
        let breaker = breakers.entry(service.to_string()).or_insert_with(Breaker::new);
        breaker.last_latency_ms = Some(latency_ms);

        if success {
            match breaker.state {
                State::Closed => {
                    breaker.consecutive_failures = 0;
                }
                State::HalfOpen => {
                    breaker.half_open_successes += 1;
                    if breaker.half_open_successes >= self.config.success_threshold {
                        breaker.state = State::Closed;
                        breaker.consecutive_failures = 0;
                        breaker.opened_at = None;
                    }
                }
                State::Open => {}
            }
        } else {
            breaker.last_failure = Some(Instant::now());
            match breaker.state {
                State::HalfOpen => {
                    breaker.state = State::Open;
                    breaker.opened_at = Some(Instant::now());
                    breaker.consecutive_failures = self.config.failure_threshold;
                }
                State::Closed => {
                    breaker.consecutive_failures += 1;
                    if breaker.consecutive_failures >= self.config.failure_threshold {
                        breaker.state = State::Open;
                        breaker.opened_at = Some(Instant::now());
                    }
                }
                State::Open => {}
            }
        }
    }

    /// Run `f` through the breaker for `service`: checked by `allow`,
    /// outcome fed to `record`.
    pub fn call<T>(
        &self,
        service: &str,
        f: impl FnOnce() -> Result<T, EssError>,
    ) -> Result<T, EssError> {
        self.allow(service)?;
        let start = Instant::now();
        let result = f();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.record(service, result.is_ok(), elapsed_ms);
        result
    }

    /// Snapshot every breaker's state for the health endpoint.
    pub fn snapshot(&self) -> HashMap<String, HealthEntry> {
        let breakers = self.breakers.lock().expect("circuit registry lock poisoned");
        breakers
            .iter()
            .map(|(name, b)| {
                (
                    name.clone(),
                    HealthEntry {
                        state: b.state,
                        latency_ms: b.last_latency_ms,
                        last_failure_secs_ago: b.last_failure.map(|t| t.elapsed().as_secs()),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 3,
            reset_timeout_secs: 0,
            success_threshold: 2,
        }
    }

    #[test]
    fn test_closed_to_open_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            registry.allow("vector").expect("should allow while closed");
            registry.record("vector", false, 5);
        }
        assert!(registry.allow("vector").is_err());
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            registry.allow("graph").unwrap();
            registry.record("graph", false, 1);
        }
        // reset_timeout_secs is 0, so the next allow() transitions to half-open.
        registry.allow("graph").expect("half-open should allow a probe");
        registry.record("graph", false, 1);
        assert!(registry.allow("graph").is_err(), "one half-open failure reopens");
    }

    #[test]
    fn test_half_open_recovers_after_success_threshold() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            registry.allow("embed").unwrap();
            registry.record("embed", false, 1);
        }
        for _ in 0..2 {
            registry.allow("embed").expect("half-open should allow probes");
            registry.record("embed", true, 1);
        }
        registry.allow("embed").expect("should be closed again");
    }

    #[test]
    fn test_snapshot_reports_state() {
        let registry = CircuitBreakerRegistry::new(config());
        registry.allow("graph").unwrap();
        registry.record("graph", true, 42);
        let snap = registry.snapshot();
        assert_eq!(snap["graph"].state, State::Closed);
        assert_eq!(snap["graph"].latency_ms, Some(42));
    }
}
