//! Structured, field-carrying logger.
//!
//! Context is copy-on-write: every `with_*` returns a new logger with
//! its own context map and leaves the original untouched. The sink and
//! configuration are shared behind an `Arc`.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use super::entry::{Caller, LogEntry};
use super::format::{format_entry, LogFormat};
use super::level::Level;
use super::timer::Timer;
use super::writer::AsyncLogWriter;

/// Logger configuration.
#[derive(Clone, Copy, Debug)]
pub struct LoggerConfig {
    pub min_level: Level,
    pub format: LogFormat,
    /// Route writes through the bounded queue and worker thread.
    pub async_mode: bool,
    pub buffer_size: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            format: LogFormat::Json,
            async_mode: false,
            buffer_size: 1024,
        }
    }
}

enum Sink {
    Direct(Mutex<Box<dyn Write + Send>>),
    Queued(AsyncLogWriter),
}

struct Core {
    config: LoggerConfig,
    sink: Sink,
}

impl Core {
    fn write(&self, entry: &LogEntry) {
        let line = match format_entry(self.config.format, entry) {
            Ok(line) => line,
            Err(err) => {
                // Surface to stderr, never panic.
                eprintln!("{err}");
                return;
            }
        };
        match &self.sink {
            Sink::Direct(writer) => {
                let mut writer = match writer.lock() {
                    Ok(writer) => writer,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Err(err) = writeln!(writer, "{line}") {
                    eprintln!("log write error: {err}");
                }
            }
            Sink::Queued(writer) => writer.write(line),
        }
    }
}

/// Immutable logging context carried by a logger instance.
#[derive(Clone, Debug, Default)]
struct Context {
    name: Option<String>,
    request_id: Option<String>,
    user_id: Option<String>,
    correlation_id: Option<String>,
    fields: BTreeMap<String, serde_json::Value>,
    caller: Option<Caller>,
}

/// Structured leveled logger with an audit channel.
#[derive(Clone)]
pub struct Logger {
    core: Arc<Core>,
    context: Context,
}

impl Logger {
    /// Logger writing to stdout.
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_writer(config, Box::new(std::io::stdout()))
    }

    /// Logger writing to an arbitrary sink.
    pub fn with_writer(config: LoggerConfig, writer: Box<dyn Write + Send>) -> Self {
        let sink = if config.async_mode {
            Sink::Queued(AsyncLogWriter::new(writer, config.buffer_size))
        } else {
            Sink::Direct(Mutex::new(writer))
        };
        Self {
            core: Arc::new(Core { config, sink }),
            context: Context::default(),
        }
    }

    pub fn min_level(&self) -> Level {
        self.core.config.min_level
    }

    // ── Copy-on-write context ──────────────────────────────────────────

    pub fn with_name(&self, name: impl Into<String>) -> Logger {
        let mut next = self.clone();
        next.context.name = Some(name.into());
        next
    }

    pub fn with_request_id(&self, request_id: impl Into<String>) -> Logger {
        let mut next = self.clone();
        next.context.request_id = Some(request_id.into());
        next
    }

    pub fn with_user_id(&self, user_id: impl Into<String>) -> Logger {
        let mut next = self.clone();
        next.context.user_id = Some(user_id.into());
        next
    }

    pub fn with_correlation_id(&self, correlation_id: impl Into<String>) -> Logger {
        let mut next = self.clone();
        next.context.correlation_id = Some(correlation_id.into());
        next
    }

    pub fn with_field(&self, key: impl Into<String>, value: serde_json::Value) -> Logger {
        let mut next = self.clone();
        next.context.fields.insert(key.into(), value);
        next
    }

    pub fn with_fields(
        &self,
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Logger {
        let mut next = self.clone();
        next.context.fields.extend(fields);
        next
    }

    pub fn with_caller(
        &self,
        function: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Logger {
        let mut next = self.clone();
        next.context.caller = Some(Caller {
            function: function.into(),
            file: file.into(),
            line,
        });
        next
    }

    // ── Emission ───────────────────────────────────────────────────────

    fn make_entry(&self, level: Level, message: &str) -> LogEntry {
        let mut entry = LogEntry::new(level, message);
        entry.logger = self.context.name.clone();
        entry.request_id = self.context.request_id.clone();
        entry.user_id = self.context.user_id.clone();
        entry.correlation_id = self.context.correlation_id.clone();
        entry.fields = self.context.fields.clone();
        entry.caller = self.context.caller.clone();
        entry
    }

    /// Emit a record, subject to the threshold (Audit always passes).
    pub fn log(&self, level: Level, message: &str) {
        if !level.passes(self.core.config.min_level) {
            return;
        }
        let entry = self.make_entry(level, message);
        self.core.write(&entry);
    }

    /// Emit a prepared entry; used by timers.
    pub(crate) fn emit(&self, entry: &LogEntry) {
        if !entry.level.passes(self.core.config.min_level) {
            return;
        }
        self.core.write(entry);
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn fatal(&self, message: &str) {
        self.log(Level::Fatal, message);
    }

    /// Audit records bypass the minimum-level filter.
    pub fn audit(&self, message: &str) {
        self.log(Level::Audit, message);
    }

    /// Start a timer bound to this logger's context.
    pub fn start_timer(&self, operation: impl Into<String>) -> Timer {
        Timer::new(self.clone(), operation.into())
    }

    /// Flush and stop the async worker, if any. Safe to call more than
    /// once; subsequent writes degrade to synchronous.
    pub fn close(&self) {
        if let Sink::Queued(writer) = &self.core.sink {
            writer.close();
        }
    }

    pub(crate) fn context_snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.context.fields.clone()
    }
}
