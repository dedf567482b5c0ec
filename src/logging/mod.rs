//! Structured, leveled logging with an audit channel.
//!
//! - [`Level`]: severity order with the always-emitted `Audit` level
//! - [`LogEntry`]: one immutable record with a typed field map
//! - [`LogFormat`]: json / text / console / logfmt renderings
//! - [`Logger`]: copy-on-write context, level helpers, timers
//! - [`AsyncLogWriter`]: bounded-queue sink with synchronous fallback
//!
//! This layer complements `tracing` (used for internal diagnostics): it
//! is the platform's own audit/event channel with a stable wire format.

mod entry;
mod format;
mod level;
mod logger;
mod timer;
mod writer;

pub use entry::{Caller, LogEntry};
pub use format::{format_entry, FormatError, LogFormat, ParseFormatError};
pub use level::{Level, ParseLevelError};
pub use logger::{Logger, LoggerConfig};
pub use timer::Timer;
pub use writer::{AsyncLogWriter, SharedBuffer};
