//! Log output formats.
//!
//! Four wire formats: structured JSON, a human `text` line, `console`
//! (text with an ANSI level color and reset suffix), and logfmt.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entry::LogEntry;
use super::level::Level;

/// Output format selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
    Console,
    Logfmt,
}

/// Failure to parse a format name. There is no sentinel value; callers
/// must handle the error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown log format '{0}'")]
pub struct ParseFormatError(pub String);

impl FromStr for LogFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            "console" => Ok(LogFormat::Console),
            "logfmt" => Ok(LogFormat::Logfmt),
            other => Err(ParseFormatError(other.to_string())),
        }
    }
}

/// A formatter failure; reported to stderr by the logger, never thrown.
#[derive(Clone, Debug, Error)]
#[error("log format error: {0}")]
pub struct FormatError(pub String);

/// ANSI color prefix for a level (console format).
fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m",
        Level::Debug => "\x1b[36m",
        Level::Info => "\x1b[32m",
        Level::Warn => "\x1b[33m",
        Level::Error => "\x1b[31m",
        Level::Fatal => "\x1b[35m",
        Level::Audit => "\x1b[34m",
    }
}

const ANSI_RESET: &str = "\x1b[0m";

/// Render one entry in the given format (no trailing newline).
pub fn format_entry(format: LogFormat, entry: &LogEntry) -> Result<String, FormatError> {
    match format {
        LogFormat::Json => format_json(entry),
        LogFormat::Text => Ok(format_text(entry)),
        LogFormat::Console => {
            let line = format_text(entry);
            Ok(format!("{}{}{}", level_color(entry.level), line, ANSI_RESET))
        }
        LogFormat::Logfmt => Ok(format_logfmt(entry)),
    }
}

fn format_json(entry: &LogEntry) -> Result<String, FormatError> {
    let mut object = serde_json::Map::new();
    object.insert(
        "timestamp".to_string(),
        serde_json::json!(entry.timestamp.to_rfc3339()),
    );
    object.insert("level".to_string(), serde_json::json!(entry.level.as_str()));
    object.insert("message".to_string(), serde_json::json!(entry.message));
    if let Some(logger) = &entry.logger {
        object.insert("logger".to_string(), serde_json::json!(logger));
    }
    if let Some(request_id) = &entry.request_id {
        object.insert("request_id".to_string(), serde_json::json!(request_id));
    }
    if let Some(user_id) = &entry.user_id {
        object.insert("user_id".to_string(), serde_json::json!(user_id));
    }
    if let Some(correlation_id) = &entry.correlation_id {
        object.insert(
            "correlation_id".to_string(),
            serde_json::json!(correlation_id),
        );
    }
    if let Some(error) = &entry.error {
        object.insert("error".to_string(), serde_json::json!(error));
    }
    if let Some(details) = &entry.error_details {
        object.insert("error_details".to_string(), serde_json::json!(details));
    }
    if let Some(duration) = entry.duration {
        object.insert(
            "duration_ms".to_string(),
            serde_json::json!(duration.as_millis() as u64),
        );
    }
    if let Some(caller) = &entry.caller {
        object.insert(
            "caller".to_string(),
            serde_json::json!(format!("{}:{}:{}", caller.function, caller.file, caller.line)),
        );
    }
    for (key, value) in &entry.fields {
        object.entry(key.clone()).or_insert_with(|| value.clone());
    }
    serde_json::to_string(&object).map_err(|e| FormatError(e.to_string()))
}

fn format_text(entry: &LogEntry) -> String {
    let mut line = String::new();
    let _ = write!(
        line,
        "{} [{}]",
        entry.timestamp.to_rfc3339(),
        entry.level.short()
    );
    if let Some(logger) = &entry.logger {
        let _ = write!(line, " {logger}:");
    }
    let _ = write!(line, " {}", entry.message);
    if let Some(request_id) = &entry.request_id {
        let _ = write!(line, " request_id={request_id}");
    }
    if let Some(user_id) = &entry.user_id {
        let _ = write!(line, " user_id={user_id}");
    }
    if let Some(correlation_id) = &entry.correlation_id {
        let _ = write!(line, " correlation_id={correlation_id}");
    }
    for (key, value) in &entry.fields {
        let _ = write!(line, " {key}={}", compact(value));
    }
    if let Some(duration) = entry.duration {
        let _ = write!(line, " duration_ms={}", duration.as_millis());
    }
    if let Some(error) = &entry.error {
        let _ = write!(line, " error=\"{error}\"");
    }
    line
}

fn format_logfmt(entry: &LogEntry) -> String {
    let mut pairs: Vec<(String, String)> = vec![
        ("timestamp".to_string(), entry.timestamp.to_rfc3339()),
        ("level".to_string(), entry.level.as_str().to_string()),
        ("message".to_string(), entry.message.clone()),
    ];
    if let Some(logger) = &entry.logger {
        pairs.push(("logger".to_string(), logger.clone()));
    }
    if let Some(request_id) = &entry.request_id {
        pairs.push(("request_id".to_string(), request_id.clone()));
    }
    if let Some(user_id) = &entry.user_id {
        pairs.push(("user_id".to_string(), user_id.clone()));
    }
    if let Some(correlation_id) = &entry.correlation_id {
        pairs.push(("correlation_id".to_string(), correlation_id.clone()));
    }
    for (key, value) in &entry.fields {
        pairs.push((key.clone(), compact(value)));
    }
    if let Some(duration) = entry.duration {
        pairs.push(("duration_ms".to_string(), duration.as_millis().to_string()));
    }
    if let Some(error) = &entry.error {
        pairs.push(("error".to_string(), error.clone()));
    }

    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={}", logfmt_quote(&value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strings are quoted when they contain spaces (or quotes).
fn logfmt_quote(value: &str) -> String {
    if value.contains(' ') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Compact single-token rendering of a field value.
fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
