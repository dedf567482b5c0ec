//! Pipeline definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables governing one pipeline's execution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Cap on handler stages per phase and on TCOL chain depth.
    pub max_stages: usize,
    /// Budget for a single handler invocation.
    pub stage_timeout: Duration,
    /// Budget for a whole phase.
    pub total_timeout: Duration,
    /// On stage timeout: continue with the text unchanged (true) or fail
    /// the request (false).
    pub fail_open: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_stages: 16,
            stage_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(30),
            fail_open: false,
        }
    }
}

/// A named, ordered chain of handler references.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: PipelineSettings,
    /// Handler names in declaration order.
    pub handlers: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            settings: PipelineSettings::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.handlers = handlers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }
}
