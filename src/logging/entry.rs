//! Log records.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::level::Level;

/// Call-site information attached to a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// One emitted log record. Immutable once created; cloning yields an
/// independent deep copy of the field map.
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub logger: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub error: Option<String>,
    pub error_details: Option<String>,
    pub duration: Option<Duration>,
    pub caller: Option<Caller>,
}

impl LogEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            logger: None,
            request_id: None,
            user_id: None,
            correlation_id: None,
            fields: BTreeMap::new(),
            error: None,
            error_details: None,
            duration: None,
            caller: None,
        }
    }
}
