//! Leveled log sink used for policy messages.
//!
//! Policy messages (blocked operations, warn-list hits, typosquat warnings)
//! go through a [`LogSink`] so embedders can route them wherever they like.
//! The default sink forwards to `tracing`.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Severity of a policy log message, ordered from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing is logged.
    Silent,
    /// Blocked operations in non-enforcing modes.
    Error,
    /// Warn-list hits and suspicious names.
    Warn,
    /// Audit-mode blocks and lifecycle events.
    #[default]
    Info,
    /// Every decision.
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Silent => "silent",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Receiver for policy log messages.
///
/// Sinks only receive message text; formatting beyond that is theirs.
pub trait LogSink {
    /// Record one message.
    fn log(&self, level: LogLevel, message: &str);
}

/// Sink that forwards messages to `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Silent => {}
            LogLevel::Error => tracing::error!(target: "palisade", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "palisade", "{}", message),
            LogLevel::Info => tracing::info!(target: "palisade", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "palisade", "{}", message),
        }
    }
}

/// Sink that keeps every message in memory.
///
/// Handy for tests and for hosts that surface policy messages in their own UI.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages, oldest first.
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Messages recorded at exactly `level`.
    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((level, message.to_string()));
        }
    }
}

impl<T: LogSink + ?Sized> LogSink for std::rc::Rc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

/// Returns true if a message at `level` passes a sink configured for `threshold`.
pub fn enabled(threshold: LogLevel, level: LogLevel) -> bool {
    level != LogLevel::Silent && level <= threshold
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Silent < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn test_enabled_threshold() {
        assert!(enabled(LogLevel::Info, LogLevel::Error));
        assert!(enabled(LogLevel::Info, LogLevel::Info));
        assert!(!enabled(LogLevel::Info, LogLevel::Debug));
        assert!(!enabled(LogLevel::Silent, LogLevel::Error));
        assert!(!enabled(LogLevel::Debug, LogLevel::Silent));
    }

    #[test]
    fn test_memory_sink_filters_by_level() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Error, "one");
        sink.log(LogLevel::Warn, "two");
        sink.log(LogLevel::Error, "three");

        assert_eq!(sink.at(LogLevel::Error), vec!["one", "three"]);
        assert_eq!(sink.entries().len(), 3);
    }

    #[test]
    fn test_level_serde_lowercase() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(serde_json::to_string(&LogLevel::Debug).unwrap(), "\"debug\"");
    }
}
