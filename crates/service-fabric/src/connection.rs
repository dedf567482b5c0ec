//! Per-service connection state.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Health of a service connection as last observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Clone, Debug)]
struct ConnState {
    connected: bool,
    health: HealthStatus,
    last_used: Option<DateTime<Utc>>,
    requests: u64,
    errors: u64,
}

/// One connection per service name within a client instance.
///
/// Statistics and health sit behind a short-lived lock that is never
/// held across an RPC; the breaker has its own lock.
#[derive(Debug)]
pub struct ServiceConnection {
    service: String,
    address: String,
    state: Mutex<ConnState>,
    breaker: CircuitBreaker,
}

impl ServiceConnection {
    pub fn new(service: impl Into<String>, address: impl Into<String>, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            address: address.into(),
            state: Mutex::new(ConnState {
                connected: true,
                health: HealthStatus::Unknown,
                last_used: None,
                requests: 0,
                errors: 0,
            }),
            breaker: CircuitBreaker::new(breaker_config),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn health(&self) -> HealthStatus {
        self.state.lock().unwrap().health
    }

    pub fn set_health(&self, health: HealthStatus) {
        self.state.lock().unwrap().health = health;
    }

    pub fn record_request(&self) {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        state.last_used = Some(Utc::now());
    }

    pub fn record_error(&self) {
        self.state.lock().unwrap().errors += 1;
    }

    /// Mark torn down: disconnected, health back to Unknown.
    pub fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.health = HealthStatus::Unknown;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Defensive snapshot of the connection's counters.
    pub fn stats(&self) -> ConnectionStats {
        let state = self.state.lock().unwrap();
        ConnectionStats {
            service: self.service.clone(),
            address: self.address.clone(),
            connected: state.connected,
            health: state.health,
            circuit_state: self.breaker.state(),
            last_used: state.last_used,
            requests: state.requests,
            errors: state.errors,
        }
    }
}

/// Point-in-time view of a connection.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionStats {
    pub service: String,
    pub address: String,
    pub connected: bool,
    pub health: HealthStatus,
    pub circuit_state: CircuitState,
    pub last_used: Option<DateTime<Utc>>,
    pub requests: u64,
    pub errors: u64,
}
