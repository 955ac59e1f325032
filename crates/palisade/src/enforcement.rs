//! Applying decisions according to the response mode.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::config::Mode;
use crate::error::SecurityViolation;
use crate::logging::{LogLevel, LogSink, TracingSink, enabled};
use crate::policy::{Action, PolicyDecision};

/// What the hook should do after a decision has been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Forward to the original handler.
    Proceed,
    /// Abort with this violation.
    Reject(SecurityViolation),
}

/// Turns decisions into outcomes and log messages.
///
/// Shared by every hook of a [`Palisade`](crate::Palisade) context so a
/// reconfiguration changes the mode everywhere at once.
pub struct Enforcer {
    mode: Cell<Mode>,
    level: Cell<LogLevel>,
    pinned: bool,
    sink: Rc<dyn LogSink>,
}

impl fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enforcer")
            .field("mode", &self.mode.get())
            .field("level", &self.level.get())
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

impl Default for Enforcer {
    fn default() -> Self {
        Self::new(Mode::default(), LogLevel::default(), Rc::new(TracingSink))
    }
}

impl Enforcer {
    /// Create an enforcer.
    pub fn new(mode: Mode, level: LogLevel, sink: Rc<dyn LogSink>) -> Self {
        Self {
            mode: Cell::new(mode),
            level: Cell::new(level),
            pinned: false,
            sink,
        }
    }

    /// An enforcer that stays in [`Mode::Enforce`] whatever it is told later.
    ///
    /// Enforce mode rejects without logging, so a pinned enforcer needs no
    /// sink of its own.
    pub fn always_enforce() -> Self {
        Self {
            pinned: true,
            ..Self::default()
        }
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Change the mode. Ignored by pinned enforcers.
    pub fn set_mode(&self, mode: Mode) {
        if !self.pinned {
            self.mode.set(mode);
        }
    }

    /// Change the log threshold.
    pub fn set_level(&self, level: LogLevel) {
        self.level.set(level);
    }

    /// Log through the sink if `level` passes the threshold.
    pub fn log(&self, level: LogLevel, message: &str) {
        if enabled(self.level.get(), level) {
            self.sink.log(level, message);
        }
    }

    /// Apply a decision.
    pub fn apply(&self, decision: &PolicyDecision) -> Outcome {
        let reason = decision.reason();
        match decision.action {
            Action::Block => match self.mode.get() {
                Mode::Enforce => Outcome::Reject(
                    SecurityViolation::new(reason).with_rule(decision.matched_rule.clone()),
                ),
                Mode::Warn => {
                    self.log(
                        LogLevel::Error,
                        &format!("[palisade] Blocked by policy (warn mode, allowing): {}", reason),
                    );
                    Outcome::Proceed
                }
                Mode::Audit => {
                    self.log(
                        LogLevel::Info,
                        &format!("[palisade] Would block (audit mode): {}", reason),
                    );
                    Outcome::Proceed
                }
            },
            Action::Warn => {
                self.log(LogLevel::Warn, &format!("[palisade] Warning: {}", reason));
                Outcome::Proceed
            }
            Action::Analyze => {
                self.log(LogLevel::Debug, &format!("[palisade] Analyze: {}", reason));
                Outcome::Proceed
            }
            Action::Allow => Outcome::Proceed,
        }
    }
}
