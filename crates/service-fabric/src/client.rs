//! Resilient service client.
//!
//! One [`ServiceConnection`] per service name, created lazily
//! (double-checked under the write lock) with the address resolved via
//! discovery. Every call consults the connection's circuit breaker, runs
//! under a request-scoped deadline, and retries transient failures with
//! a linear backoff. Cancellation, deadline, and semantic errors are
//! terminal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreakerConfig;
use crate::connection::{ConnectionStats, HealthStatus, ServiceConnection};
use crate::discovery::ServiceDiscovery;
use crate::error::FabricError;

/// Client tunables.
#[derive(Clone, Copy, Debug)]
pub struct ServiceClientConfig {
    /// Deadline for one `execute` call, retries included.
    pub request_timeout: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Unit for the linear backoff: attempt N waits N × this.
    pub retry_backoff: Duration,
    /// Cadence of the background health loop.
    pub health_check_interval: Duration,
    /// Budget for a single health probe.
    pub probe_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ServiceClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// A fully addressed backend invocation.
#[derive(Clone, Debug, Serialize)]
pub struct BackendRequest {
    pub request_id: Uuid,
    pub service: String,
    pub address: String,
    pub object: String,
    pub method: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// What a backend call produced.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceResponse {
    pub service: String,
    pub data: serde_json::Value,
    pub metadata: HashMap<String, String>,
    pub duration: Duration,
}

/// The injected transport. Concrete backends (LLM inference, retrieval,
/// analysis, agent tooling) live outside the core.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, request: &BackendRequest) -> Result<serde_json::Value, FabricError>;

    /// Lightweight health probe; the default degrades to a discovery
    /// resolution check (reachable address means healthy).
    async fn probe(&self, service: &str, address: &str) -> Result<HealthStatus, FabricError> {
        let _ = (service, address);
        Ok(HealthStatus::Healthy)
    }
}

/// Pooled, breaker-guarded access to backend services.
pub struct ServiceClient {
    config: ServiceClientConfig,
    discovery: Arc<dyn ServiceDiscovery>,
    backend: Arc<dyn Backend>,
    connections: RwLock<HashMap<String, Arc<ServiceConnection>>>,
    shutdown_tx: watch::Sender<bool>,
    health_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ServiceClient {
    pub fn new(
        config: ServiceClientConfig,
        discovery: Arc<dyn ServiceDiscovery>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            discovery,
            backend,
            connections: RwLock::new(HashMap::new()),
            shutdown_tx,
            health_task: StdMutex::new(None),
        }
    }

    /// Look up or create the connection for a service. Creation resolves
    /// the address through discovery and is double-checked under the
    /// write lock.
    async fn connection(&self, service: &str) -> Result<Arc<ServiceConnection>, FabricError> {
        if let Some(conn) = self.connections.read().await.get(service) {
            return Ok(Arc::clone(conn));
        }
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get(service) {
            return Ok(Arc::clone(conn));
        }
        let address = self.discovery.get_address(service).await?;
        debug!(service, %address, "opening connection");
        let conn = Arc::new(ServiceConnection::new(service, address, self.config.breaker));
        connections.insert(service.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Invoke `object.method` on a service with retry, breaker, and
    /// deadline handling.
    #[instrument(skip_all, fields(service = %service, object = %object, method = %method))]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        service: &str,
        object: &str,
        method: &str,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ServiceResponse, FabricError> {
        let conn = self.connection(service).await?;

        if !conn.breaker().allow_request() {
            warn!(service, "circuit open, rejecting request");
            return Err(FabricError::CircuitOpen {
                service: service.to_string(),
            });
        }

        let request = BackendRequest {
            request_id: Uuid::new_v4(),
            service: service.to_string(),
            address: conn.address().to_string(),
            object: object.to_string(),
            method: method.to_string(),
            params,
        };

        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            conn.record_request();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FabricError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(FabricError::DeadlineExceeded),
                result = self.backend.invoke(&request) => result,
            };

            match result {
                Ok(data) => {
                    conn.breaker().record_success();
                    return Ok(ServiceResponse {
                        service: service.to_string(),
                        data,
                        metadata: HashMap::new(),
                        duration: started.elapsed(),
                    });
                }
                Err(err) => {
                    conn.record_error();
                    // Cancellation and deadline are verdicts on the
                    // request, not on the backend.
                    let backend_fault = !matches!(
                        err,
                        FabricError::Cancelled | FabricError::DeadlineExceeded
                    );
                    if backend_fault {
                        conn.breaker().record_failure();
                    }

                    if err.is_terminal() {
                        return Err(err);
                    }
                    if attempt >= self.config.max_retries {
                        return Err(FabricError::ServiceCall {
                            service: service.to_string(),
                            object: object.to_string(),
                            method: method.to_string(),
                            attempts: attempt + 1,
                            source: Box::new(err),
                        });
                    }

                    attempt += 1;
                    let backoff = self.config.retry_backoff * attempt;
                    debug!(service, attempt, backoff_ms = backoff.as_millis() as u64, "retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FabricError::Cancelled),
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(FabricError::DeadlineExceeded)
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// Probe one service and update its connection's health status.
    pub async fn health(
        &self,
        cancel: &CancellationToken,
        service: &str,
    ) -> Result<HealthStatus, FabricError> {
        let conn = self.connection(service).await?;
        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FabricError::Cancelled),
            result = timeout(self.config.probe_timeout, self.backend.probe(service, conn.address())) => {
                result.map_err(|_| FabricError::DeadlineExceeded).and_then(|r| r)
            }
        };
        match probe {
            Ok(health) => {
                conn.set_health(health);
                Ok(health)
            }
            Err(err) => {
                conn.set_health(HealthStatus::Unhealthy);
                Err(err)
            }
        }
    }

    /// Start the background health loop. It probes every known
    /// connection at the configured interval until [`close`] is called.
    ///
    /// [`close`]: ServiceClient::close
    pub fn spawn_health_checks(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("health loop shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let services: Vec<String> =
                            client.connections.read().await.keys().cloned().collect();
                        for service in services {
                            let cancel = CancellationToken::new();
                            if let Err(err) = client.health(&cancel, &service).await {
                                warn!(service = %service, error = %err, "health probe failed");
                            }
                        }
                    }
                }
            }
        });
        *self.health_task.lock().unwrap() = Some(handle);
    }

    /// Defensive snapshot of every connection, sorted by service name.
    pub async fn stats(&self) -> Vec<ConnectionStats> {
        let connections = self.connections.read().await;
        let mut stats: Vec<ConnectionStats> = connections.values().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.service.cmp(&b.service));
        stats
    }

    /// Tear down: stop the health loop, disconnect and drop every
    /// connection. Per-connection teardown failures are joined into one
    /// error.
    pub async fn close(&self) -> Result<(), FabricError> {
        let _ = self.shutdown_tx.send(true);
        let task = self.health_task.lock().unwrap().take();
        if let Some(handle) = task {
            let _ = handle.await;
        }

        let mut connections = self.connections.write().await;
        let mut failures = Vec::new();
        for conn in connections.values() {
            conn.disconnect();
            if conn.is_connected() {
                failures.push(format!("connection '{}' still attached", conn.service()));
            }
        }
        connections.clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FabricError::Teardown(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticDiscovery;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Test double with programmable outcomes, one per invocation.
    /// Exhausting the script falls through to success.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<serde_json::Value, FabricError>>>,
        calls: Mutex<Vec<BackendRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<serde_json::Value, FabricError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn invoke(&self, request: &BackendRequest) -> Result<serde_json::Value, FabricError> {
            self.calls.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(serde_json::json!({"ok": true})))
        }
    }

    fn fast_config() -> ServiceClientConfig {
        ServiceClientConfig {
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
            ..ServiceClientConfig::default()
        }
    }

    fn client_with(backend: Arc<ScriptedBackend>, config: ServiceClientConfig) -> ServiceClient {
        ServiceClient::new(config, Arc::new(StaticDiscovery::new()), backend)
    }

    fn transport(msg: &str) -> FabricError {
        FabricError::Transport(msg.to_string())
    }

    #[tokio::test]
    async fn execute_success_passes_request_through() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(serde_json::json!([1, 2]))]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let response = client
            .execute(
                &CancellationToken::new(),
                "customer-service",
                "CUSTOMER",
                "LIST",
                serde_json::Map::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.data, serde_json::json!([1, 2]));
        assert_eq!(backend.call_count(), 1);
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].service, "customer-service");
        assert_eq!(calls[0].object, "CUSTOMER");
        assert_eq!(calls[0].method, "LIST");
        assert!(calls[0].address.starts_with("localhost:"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(transport("reset")),
            Err(transport("reset again")),
            Ok(serde_json::json!("recovered")),
        ]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let response = client
            .execute(
                &CancellationToken::new(),
                "flaky-service",
                "OBJ",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.data, serde_json::json!("recovered"));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_wrap_the_last_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(transport("a")),
            Err(transport("b")),
            Err(transport("c")),
        ]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let err = client
            .execute(
                &CancellationToken::new(),
                "down-service",
                "OBJ",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap_err();

        // Initial attempt plus two retries.
        assert_eq!(backend.call_count(), 3);
        let FabricError::ServiceCall {
            service, attempts, ..
        } = err
        else {
            panic!("expected wrapped service call error");
        };
        assert_eq!(service, "down-service");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn semantic_errors_are_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(
            FabricError::PermissionDenied("no READ on CUSTOMER".to_string()),
        )]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let err = client
            .execute(
                &CancellationToken::new(),
                "svc",
                "CUSTOMER",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FabricError::PermissionDenied(_)));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .execute(&cancel, "svc", "OBJ", "GET", serde_json::Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FabricError::Cancelled));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn breaker_opens_after_persistent_failure() {
        let mut config = fast_config();
        config.max_retries = 0;
        config.breaker = CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            half_open_probe_count: 1,
            min_requests_to_trip: 2,
        };
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(transport("1")),
            Err(transport("2")),
        ]));
        let client = client_with(Arc::clone(&backend), config);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let _ = client
                .execute(&cancel, "svc", "OBJ", "GET", serde_json::Map::new())
                .await;
        }

        let err = client
            .execute(&cancel, "svc", "OBJ", "GET", serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::CircuitOpen { .. }));
        // The rejected request never reached the backend.
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn stats_track_requests_and_errors() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(transport("x")),
            Ok(serde_json::json!(null)),
        ]));
        let client = client_with(Arc::clone(&backend), fast_config());

        client
            .execute(
                &CancellationToken::new(),
                "svc",
                "OBJ",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap();

        let stats = client.stats().await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].service, "svc");
        assert_eq!(stats[0].requests, 2);
        assert_eq!(stats[0].errors, 1);
    }

    #[tokio::test]
    async fn health_updates_connection_status() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = client_with(Arc::clone(&backend), fast_config());

        let health = client
            .health(&CancellationToken::new(), "svc")
            .await
            .unwrap();
        assert_eq!(health, HealthStatus::Healthy);

        let stats = client.stats().await;
        assert_eq!(stats[0].health, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn close_clears_connections_and_stops_health_loop() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = Arc::new(client_with(Arc::clone(&backend), fast_config()));
        client.spawn_health_checks();

        client
            .execute(
                &CancellationToken::new(),
                "svc",
                "OBJ",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap();
        assert_eq!(client.stats().await.len(), 1);

        client.close().await.unwrap();
        assert!(client.stats().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_connection() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = Arc::new(client_with(Arc::clone(&backend), fast_config()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                client
                    .execute(
                        &CancellationToken::new(),
                        "shared-service",
                        "OBJ",
                        "GET",
                        serde_json::Map::new(),
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Double-checked creation: one connection, all requests on it.
        let stats = client.stats().await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].requests, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_whole_call() {
        struct HangingBackend;

        #[async_trait]
        impl Backend for HangingBackend {
            async fn invoke(
                &self,
                _request: &BackendRequest,
            ) -> Result<serde_json::Value, FabricError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(serde_json::Value::Null)
            }
        }

        let mut config = fast_config();
        config.request_timeout = Duration::from_millis(50);
        let client = ServiceClient::new(
            config,
            Arc::new(StaticDiscovery::new()),
            Arc::new(HangingBackend),
        );

        let err = client
            .execute(
                &CancellationToken::new(),
                "svc",
                "OBJ",
                "GET",
                serde_json::Map::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::DeadlineExceeded));
    }
}
