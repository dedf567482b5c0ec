//! Configuration documents.
//!
//! Serde-backed settings for every tunable the core exposes, loadable
//! from YAML. Millisecond fields convert into the typed configs of the
//! member crates; unknown fields are rejected.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use policy_core::PipelineSettings;
use service_fabric::{CircuitBreakerConfig, ServiceClientConfig};

use crate::engine::EngineConfig;
use crate::error::EngineError;
use crate::logging::{Level, LogFormat, LoggerConfig};

/// Top-level configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PromptgateConfig {
    pub engine: EngineSettings,
    pub client: ClientSettings,
    pub breaker: BreakerSettings,
    pub pipeline: PipelineDefaults,
    pub logging: LoggingSettings,
}

impl PromptgateConfig {
    pub fn from_yaml(text: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(text)
            .map_err(|e| EngineError::Validation(format!("invalid configuration: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::Validation(format!(
                "cannot read configuration '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&text)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineSettings {
    pub max_command_length: usize,
    pub max_chain_depth: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            max_command_length: config.max_command_length,
            max_chain_depth: config.max_chain_depth,
        }
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_command_length: settings.max_command_length,
            max_chain_depth: settings.max_chain_depth,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientSettings {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub health_check_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let config = ServiceClientConfig::default();
        Self {
            request_timeout_ms: config.request_timeout.as_millis() as u64,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff.as_millis() as u64,
            health_check_interval_ms: config.health_check_interval.as_millis() as u64,
            probe_timeout_ms: config.probe_timeout.as_millis() as u64,
        }
    }
}

impl ClientSettings {
    pub fn to_client_config(&self, breaker: &BreakerSettings) -> ServiceClientConfig {
        ServiceClientConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            breaker: breaker.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub half_open_probe_count: u32,
    pub min_requests_to_trip: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout_ms: config.recovery_timeout.as_millis() as u64,
            half_open_probe_count: config.half_open_probe_count,
            min_requests_to_trip: config.min_requests_to_trip,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_millis(settings.recovery_timeout_ms),
            half_open_probe_count: settings.half_open_probe_count,
            min_requests_to_trip: settings.min_requests_to_trip,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineDefaults {
    pub max_stages: usize,
    pub stage_timeout_ms: u64,
    pub total_timeout_ms: u64,
    pub fail_open: bool,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            max_stages: settings.max_stages,
            stage_timeout_ms: settings.stage_timeout.as_millis() as u64,
            total_timeout_ms: settings.total_timeout.as_millis() as u64,
            fail_open: settings.fail_open,
        }
    }
}

impl From<&PipelineDefaults> for PipelineSettings {
    fn from(defaults: &PipelineDefaults) -> Self {
        Self {
            max_stages: defaults.max_stages,
            stage_timeout: Duration::from_millis(defaults.stage_timeout_ms),
            total_timeout: Duration::from_millis(defaults.total_timeout_ms),
            fail_open: defaults.fail_open,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSettings {
    pub level: Level,
    pub format: LogFormat,
    pub async_mode: bool,
    pub buffer_size: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let config = LoggerConfig::default();
        Self {
            level: config.min_level,
            format: config.format,
            async_mode: config.async_mode,
            buffer_size: config.buffer_size,
        }
    }
}

impl From<&LoggingSettings> for LoggerConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            min_level: settings.level,
            format: settings.format,
            async_mode: settings.async_mode,
            buffer_size: settings.buffer_size,
        }
    }
}
