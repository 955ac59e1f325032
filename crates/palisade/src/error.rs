//! Error types raised by policy enforcement and configuration.

use std::io;

use thiserror::Error;

use crate::config::PackageRule;

/// Stable code carried by every [`SecurityViolation`].
pub const VIOLATION_CODE: &str = "ERR_PALISADE_POLICY_VIOLATION";

/// Raised when an enforced policy blocks an operation.
///
/// This is the only error Palisade raises to abort a caller's operation.
/// Entry points that speak `io::Error` carry it as the inner error of an
/// [`io::ErrorKind::NotFound`] error, so a blocked read fails like a missing
/// file but can still be told apart with [`SecurityViolation::from_io_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[palisade] Blocked by policy: {reason}")]
pub struct SecurityViolation {
    reason: String,
    matched_rule: Option<PackageRule>,
}

impl SecurityViolation {
    /// Create a violation with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            matched_rule: None,
        }
    }

    /// Attach the rule that produced the block.
    pub fn with_rule(mut self, rule: Option<PackageRule>) -> Self {
        self.matched_rule = rule;
        self
    }

    /// The stable error code.
    pub fn code(&self) -> &'static str {
        VIOLATION_CODE
    }

    /// The human-readable reason, without the policy prefix.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The package rule that matched, when the block came from one.
    pub fn matched_rule(&self) -> Option<&PackageRule> {
        self.matched_rule.as_ref()
    }

    /// Wrap this violation in an `io::Error` shaped like a missing resource.
    pub fn into_io_error(self) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, self)
    }

    /// Recover a violation from an `io::Error` produced by [`into_io_error`].
    ///
    /// [`into_io_error`]: SecurityViolation::into_io_error
    pub fn from_io_error(err: &io::Error) -> Option<&SecurityViolation> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<SecurityViolation>())
    }
}

impl From<SecurityViolation> for io::Error {
    fn from(violation: SecurityViolation) -> Self {
        violation.into_io_error()
    }
}

/// Malformed or contradictory configuration input.
///
/// Surfaced when a configuration is built or loaded, never during evaluation.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A package rule has an empty name.
    #[error("empty package rule name in {list} list")]
    EmptyRuleName {
        /// Which list the rule was in.
        list: &'static str,
    },
    /// A wildcard appears anywhere but the end of a rule name.
    #[error("invalid wildcard in rule {name:?}: only a single trailing '*' is supported")]
    InvalidWildcard {
        /// The offending rule name.
        name: String,
    },
    /// A restricted builtin entry is empty.
    #[error("empty restricted builtin name")]
    EmptyRestrictedBuiltin,
    /// The configuration document could not be parsed.
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
