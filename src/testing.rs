//! Test doubles for the service fabric.
//!
//! Deterministic, explicitly programmed backends: nothing here fails on
//! a hidden schedule. Used by the unit and integration suites, and handy
//! for downstream crates wiring the engine in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use serde_json::json;

use service_fabric::{Backend, BackendRequest, FabricError};

/// Initialize a tracing subscriber for tests, once per process.
/// `RUST_LOG` controls the filter; defaults to warnings only.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Records every invocation and answers `{"ok": true}`.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendRequest>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn invoke(&self, request: &BackendRequest) -> Result<serde_json::Value, FabricError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(json!({"ok": true}))
    }
}

/// Answers from a programmed script, one entry per invocation; an
/// exhausted script falls through to `{"ok": true}`.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<serde_json::Value, FabricError>>>,
    calls: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<serde_json::Value, FabricError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
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
            .unwrap_or_else(|| Ok(json!({"ok": true})))
    }
}

/// A backend answering fixed text, for prompt-pipeline tests.
pub struct EchoBackend {
    pub prefix: String,
}

impl EchoBackend {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Backend for EchoBackend {
    async fn invoke(&self, request: &BackendRequest) -> Result<serde_json::Value, FabricError> {
        let prompt = request
            .params
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(json!(format!("{}{}", self.prefix, prompt)))
    }
}
