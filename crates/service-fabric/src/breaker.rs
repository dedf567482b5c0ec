//! Per-connection circuit breaker.
//!
//! State machine: Closed → Open on repeated failure, Open → HalfOpen
//! after the recovery timeout, HalfOpen → Closed on enough successful
//! probes or back to Open on any failure. State and counters live under
//! one mutex; `allow_request`, `record_success` and `record_failure` are
//! atomic against each other.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Breaker tunables.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to trip.
    pub failure_threshold: u32,
    /// How long an open breaker rejects before probing.
    pub recovery_timeout: Duration,
    /// Successful probes required to close again.
    pub half_open_probe_count: u32,
    /// Minimum requests since the last transition before tripping.
    pub min_requests_to_trip: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_probe_count: 1,
            min_requests_to_trip: 5,
        }
    }
}

/// Observable breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Consecutive failures in Closed.
    failures: u32,
    /// Successful probes in HalfOpen.
    successes: u32,
    /// Requests admitted since the last transition.
    requests: u32,
    /// Probes admitted while HalfOpen.
    probes_in_flight: u32,
    last_failure: Option<Instant>,
}

impl Inner {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.failures = 0;
        self.successes = 0;
        self.requests = 0;
        self.probes_in_flight = 0;
    }
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                requests: 0,
                probes_in_flight: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Whether a request may proceed. An open breaker whose recovery
    /// timeout has elapsed transitions to HalfOpen and admits the probe.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.requests += 1;
                true
            }
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .map(|at| at.elapsed() > self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    debug!("circuit breaker entering half-open");
                    inner.transition(CircuitState::HalfOpen);
                    inner.probes_in_flight = 1;
                    inner.requests = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_probe_count {
                    inner.probes_in_flight += 1;
                    inner.requests += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.half_open_probe_count {
                    debug!("circuit breaker closing after successful probes");
                    inner.transition(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.failures >= self.config.failure_threshold
                    && inner.requests >= self.config.min_requests_to_trip
                {
                    debug!(failures = inner.failures, "circuit breaker tripping open");
                    let last_failure = inner.last_failure;
                    inner.transition(CircuitState::Open);
                    inner.last_failure = last_failure;
                }
            }
            CircuitState::HalfOpen => {
                debug!("probe failed, circuit breaker reopening");
                inner.transition(CircuitState::Open);
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
            }
        }
    }

    /// Force the breaker back to Closed, clearing counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.transition(CircuitState::Closed);
        inner.last_failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(100),
            half_open_probe_count: 1,
            min_requests_to_trip: 2,
        }
    }

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new(quick_config());

        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn does_not_trip_below_min_requests() {
        let mut config = quick_config();
        config.min_requests_to_trip = 10;
        let breaker = CircuitBreaker::new(config);

        for _ in 0..3 {
            assert!(breaker.allow_request());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new(quick_config());

        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_success();
        assert!(breaker.allow_request());
        breaker.record_failure();

        // One failure after the reset: still closed.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn recovers_through_half_open() {
        let breaker = CircuitBreaker::new(quick_config());

        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(150));

        // Recovery timeout elapsed: the next request is admitted as a probe.
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(quick_config());
        breaker.allow_request();
        breaker.record_failure();
        breaker.allow_request();
        breaker.record_failure();

        std::thread::sleep(Duration::from_millis(150));
        assert!(breaker.allow_request());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_caps_concurrent_probes() {
        let mut config = quick_config();
        config.half_open_probe_count = 2;
        let breaker = CircuitBreaker::new(config);

        breaker.allow_request();
        breaker.record_failure();
        breaker.allow_request();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(150));

        // Two probes admitted, the third rejected.
        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
    }

    #[test]
    fn reset_closes_the_breaker() {
        let breaker = CircuitBreaker::new(quick_config());
        breaker.allow_request();
        breaker.record_failure();
        breaker.allow_request();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn concurrent_calls_do_not_panic() {
        use std::sync::Arc;

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let breaker = Arc::clone(&breaker);
            handles.push(std::thread::spawn(move || {
                for j in 0..200 {
                    if breaker.allow_request() {
                        if (i + j) % 3 == 0 {
                            breaker.record_failure();
                        } else {
                            breaker.record_success();
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // Any terminal state is fine; the invariant is internal consistency.
        let _ = breaker.state();
    }
}
