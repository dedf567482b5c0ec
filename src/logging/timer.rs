//! Operation timers.
//!
//! A timer captures a start instant and the logger it reports through.
//! Stopping emits one record carrying the elapsed duration; a stopped or
//! cancelled timer goes inert (subsequent stops return zero and emit
//! nothing).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::entry::LogEntry;
use super::level::Level;
use super::logger::Logger;

pub struct Timer {
    logger: Logger,
    operation: String,
    start: Instant,
    finished: bool,
}

impl Timer {
    pub(crate) fn new(logger: Logger, operation: String) -> Self {
        Self {
            logger,
            operation,
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Emit an intermediate measurement without finishing the timer.
    pub fn checkpoint(&self, name: &str, extra_fields: BTreeMap<String, serde_json::Value>) {
        if self.finished {
            return;
        }
        let mut entry = self.entry(Level::Debug, &format!("{} checkpoint", self.operation));
        entry
            .fields
            .insert("checkpoint".to_string(), serde_json::json!(name));
        entry.fields.extend(extra_fields);
        self.logger.emit(&entry);
    }

    /// Finish and report success at Info. Returns the elapsed duration,
    /// or zero if the timer was already finished.
    pub fn stop(&mut self) -> Duration {
        let Some(elapsed) = self.finish() else {
            return Duration::ZERO;
        };
        let entry = self.completed_entry(Level::Info, elapsed, None);
        self.logger.emit(&entry);
        elapsed
    }

    /// Finish and report a failure at Error.
    pub fn stop_with_error(&mut self, err: &dyn std::fmt::Display) -> Duration {
        let Some(elapsed) = self.finish() else {
            return Duration::ZERO;
        };
        let mut entry = self.completed_entry(Level::Error, elapsed, Some("failed"));
        entry.error = Some(err.to_string());
        self.logger.emit(&entry);
        elapsed
    }

    /// Finish and report an outcome. Failures are emitted at Warn at
    /// minimum.
    pub fn stop_with_result(&mut self, success: bool, result: &str) -> Duration {
        let Some(elapsed) = self.finish() else {
            return Duration::ZERO;
        };
        let level = if success { Level::Info } else { Level::Warn };
        let mut entry = self.completed_entry(level, elapsed, None);
        entry
            .fields
            .insert("success".to_string(), serde_json::json!(success));
        entry
            .fields
            .insert("result".to_string(), serde_json::json!(result));
        self.logger.emit(&entry);
        elapsed
    }

    /// Discard the timer without emitting anything.
    pub fn cancel(&mut self) {
        self.finished = true;
    }

    fn finish(&mut self) -> Option<Duration> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.start.elapsed())
    }

    fn entry(&self, level: Level, message: &str) -> LogEntry {
        let mut entry = LogEntry::new(level, message);
        entry
            .fields
            .insert("operation".to_string(), serde_json::json!(self.operation));
        entry
    }

    fn completed_entry(
        &self,
        level: Level,
        elapsed: Duration,
        suffix: Option<&str>,
    ) -> LogEntry {
        let message = match suffix {
            Some(suffix) => format!("{} {suffix}", self.operation),
            None => format!("{} completed", self.operation),
        };
        let mut entry = self.entry(level, &message);
        entry.duration = Some(elapsed);
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::format::LogFormat;
    use crate::logging::logger::LoggerConfig;
    use crate::logging::writer::SharedBuffer;

    fn timer_logger() -> (Logger, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let logger = Logger::with_writer(
            LoggerConfig {
                min_level: Level::Debug,
                format: LogFormat::Json,
                async_mode: false,
                buffer_size: 16,
            },
            Box::new(buffer.clone()),
        );
        (logger, buffer)
    }

    fn parsed(buffer: &SharedBuffer) -> Vec<serde_json::Value> {
        buffer
            .lines()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn stop_emits_once_with_duration() {
        let (logger, buffer) = timer_logger();
        let mut timer = logger.start_timer("fetch");
        let first = timer.stop();
        let second = timer.stop();

        assert!(first >= Duration::ZERO);
        assert_eq!(second, Duration::ZERO);

        let lines = parsed(&buffer);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "fetch completed");
        assert_eq!(lines[0]["operation"], "fetch");
        assert!(lines[0]["duration_ms"].is_u64());
    }

    #[test]
    fn cancel_suppresses_emission() {
        let (logger, buffer) = timer_logger();
        let mut timer = logger.start_timer("aborted");
        timer.cancel();
        assert_eq!(timer.stop(), Duration::ZERO);
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn checkpoint_does_not_finish() {
        let (logger, buffer) = timer_logger();
        let mut timer = logger.start_timer("load");
        timer.checkpoint(
            "halfway",
            BTreeMap::from([("rows".to_string(), serde_json::json!(50))]),
        );
        timer.stop();

        let lines = parsed(&buffer);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["checkpoint"], "halfway");
        assert_eq!(lines[0]["rows"], 50);
        assert_eq!(lines[1]["message"], "load completed");
    }

    #[test]
    fn stop_with_error_reports_at_error() {
        let (logger, buffer) = timer_logger();
        let mut timer = logger.start_timer("call");
        timer.stop_with_error(&"connection refused");

        let lines = parsed(&buffer);
        assert_eq!(lines[0]["level"], "error");
        assert_eq!(lines[0]["error"], "connection refused");
    }

    #[test]
    fn failed_result_is_at_least_warn() {
        let (logger, buffer) = timer_logger();
        let mut ok = logger.start_timer("op");
        ok.stop_with_result(true, "done");
        let mut failed = logger.start_timer("op");
        failed.stop_with_result(false, "degraded");

        let lines = parsed(&buffer);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[1]["level"], "warn");
        assert_eq!(lines[1]["result"], "degraded");
    }
}
