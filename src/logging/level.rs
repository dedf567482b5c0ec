//! Log levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity of a log record.
///
/// Priority follows declaration order, with one exception: `Audit`
/// records are always emitted regardless of the configured threshold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    #[serde(alias = "err")]
    Error,
    Fatal,
    Audit,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Audit => "audit",
        }
    }

    /// Three-letter short form used by the text and console formats.
    pub fn short(self) -> &'static str {
        match self {
            Level::Trace => "TRC",
            Level::Debug => "DBG",
            Level::Info => "INF",
            Level::Warn => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FTL",
            Level::Audit => "AUD",
        }
    }

    /// Whether a record at this level passes the given threshold.
    /// Audit bypasses the threshold unconditionally.
    pub fn passes(self, min: Level) -> bool {
        self == Level::Audit || self >= min
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to parse a level name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "trc" => Ok(Level::Trace),
            "debug" | "dbg" => Ok(Level::Debug),
            "info" | "inf" | "information" => Ok(Level::Info),
            "warn" | "wrn" | "warning" => Ok(Level::Warn),
            "error" | "err" => Ok(Level::Error),
            "fatal" | "ftl" => Ok(Level::Fatal),
            "audit" | "aud" => Ok(Level::Audit),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_declaration() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error < Level::Fatal);
        assert!(Level::Fatal < Level::Audit);
    }

    #[test]
    fn audit_bypasses_threshold() {
        assert!(Level::Audit.passes(Level::Fatal));
        assert!(!Level::Debug.passes(Level::Info));
        assert!(Level::Warn.passes(Level::Warn));
    }

    #[test]
    fn parses_names_short_forms_and_aliases() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WRN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("information".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("err".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("AUD".parse::<Level>().unwrap(), Level::Audit);
    }

    #[test]
    fn unknown_level_is_a_typed_error() {
        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err, ParseLevelError("verbose".to_string()));
    }
}
