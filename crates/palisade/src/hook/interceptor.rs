//! Check-then-forward hooks with exact restoration.

use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::enforcement::{Enforcer, Outcome};
use crate::error::SecurityViolation;
use crate::policy::{Action, PolicyDecision};

use super::entry::{EntryPoint, Handler};

/// Judges the arguments of one call.
pub type Check<A> = Rc<dyn Fn(&A) -> PolicyDecision>;

/// Shapes a violation into the entry point's own return channel.
///
/// A synchronous entry point returns `Err`, a callback entry point hands the
/// error to its callback on a later turn, an async entry point returns a
/// failed future.
pub type Reject<A, R> = Rc<dyn Fn(A, SecurityViolation) -> R>;

/// Secondary inspection run after a call has been allowed.
pub type Analyzer<A> = Rc<dyn Fn(&A) -> Result<(), AnalyzerError>>;

/// Box an analyzer closure.
pub fn analyzer<A>(f: impl Fn(&A) -> Result<(), AnalyzerError> + 'static) -> Analyzer<A> {
    Rc::new(f)
}

/// Error returned by an analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The analyzer wants the call blocked. Always propagates.
    #[error(transparent)]
    Violation(#[from] SecurityViolation),
    /// The analyzer itself failed. Logged and swallowed.
    #[error("analyzer failed: {0}")]
    Failed(Box<dyn StdError>),
}

impl AnalyzerError {
    /// Wrap an arbitrary analyzer failure.
    pub fn failed(err: impl Into<Box<dyn StdError>>) -> Self {
        AnalyzerError::Failed(err.into())
    }
}

struct HookState<A, R> {
    installed: Cell<bool>,
    original: RefCell<Option<Handler<A, R>>>,
    reentrant: Cell<bool>,
    analyzer: RefCell<Option<Analyzer<A>>>,
}

/// Sets the reentrancy flag for as long as it lives.
struct ReentrancyGuard<'a>(&'a Cell<bool>);

impl<'a> ReentrancyGuard<'a> {
    fn arm(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A hook mediating one entry point.
///
/// The hook moves through `uninstalled → installed → uninstalled`:
///
/// - [`install`](Hook::install) captures the current handler once and swaps
///   in a wrapper. Installing again only replaces the analyzer.
/// - [`uninstall`](Hook::uninstall) writes the captured handler back and drops
///   the analyzer. Uninstalling an uninstalled hook does nothing.
///
/// The wrapper checks each call, applies the decision through the shared
/// [`Enforcer`], and forwards to the original handler with the original
/// arguments. A call made while the same hook is already checking or
/// analyzing goes straight to the original.
///
/// ## Threading
///
/// The reentrancy flag is a plain `Cell<bool>`; hooks are `!Send` and only
/// meaningful on the single thread that owns the entry point.
pub struct Hook<A, R> {
    entry: Rc<EntryPoint<A, R>>,
    check: Check<A>,
    reject: Reject<A, R>,
    enforcer: Rc<Enforcer>,
    state: Rc<HookState<A, R>>,
}

impl<A, R> fmt::Debug for Hook<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("entry", &self.entry.name())
            .field("installed", &self.state.installed.get())
            .field("has_analyzer", &self.state.analyzer.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl<A: 'static, R: 'static> Hook<A, R> {
    /// Create an uninstalled hook.
    pub fn new(
        entry: Rc<EntryPoint<A, R>>,
        check: impl Fn(&A) -> PolicyDecision + 'static,
        reject: impl Fn(A, SecurityViolation) -> R + 'static,
        enforcer: Rc<Enforcer>,
    ) -> Self {
        Self {
            entry,
            check: Rc::new(check),
            reject: Rc::new(reject),
            enforcer,
            state: Rc::new(HookState {
                installed: Cell::new(false),
                original: RefCell::new(None),
                reentrant: Cell::new(false),
                analyzer: RefCell::new(None),
            }),
        }
    }

    /// Install the wrapper, or only swap the analyzer if already installed.
    pub fn install(&self, analyzer: Option<Analyzer<A>>) {
        *self.state.analyzer.borrow_mut() = analyzer;
        if self.state.installed.get() {
            return;
        }

        let original = self.entry.handler();
        *self.state.original.borrow_mut() = Some(Rc::clone(&original));
        self.entry.swap(self.wrapper(original));
        self.state.installed.set(true);

        tracing::debug!(entry = %self.entry.name(), "hook installed");
    }

    /// Restore the captured handler.
    pub fn uninstall(&self) {
        if !self.state.installed.get() {
            return;
        }
        if let Some(original) = self.state.original.borrow_mut().take() {
            self.entry.swap(original);
        }
        self.state.analyzer.borrow_mut().take();
        self.state.installed.set(false);

        tracing::debug!(entry = %self.entry.name(), "hook uninstalled");
    }

    /// Whether the wrapper is installed.
    pub fn is_installed(&self) -> bool {
        self.state.installed.get()
    }

    /// Whether an analyzer is registered.
    pub fn has_analyzer(&self) -> bool {
        self.state.analyzer.borrow().is_some()
    }

    /// The mediated entry point.
    pub fn entry(&self) -> &Rc<EntryPoint<A, R>> {
        &self.entry
    }

    fn wrapper(&self, original: Handler<A, R>) -> Handler<A, R> {
        let state = Rc::clone(&self.state);
        let check = Rc::clone(&self.check);
        let reject = Rc::clone(&self.reject);
        let enforcer = Rc::clone(&self.enforcer);
        let name = self.entry.name().to_string();

        Rc::new(move |args: A| -> R {
            if state.reentrant.get() {
                return original(args);
            }

            let decision = {
                let _guard = ReentrancyGuard::arm(&state.reentrant);
                check(&args)
            };

            if let Outcome::Reject(violation) = enforcer.apply(&decision) {
                tracing::debug!(entry = %name, reason = %violation.reason(), "call rejected");
                return reject(args, violation);
            }

            if decision.action != Action::Block {
                let analyzer = state.analyzer.borrow().clone();
                if let Some(analyzer) = analyzer {
                    let result = {
                        let _guard = ReentrancyGuard::arm(&state.reentrant);
                        analyzer(&args)
                    };
                    match result {
                        Ok(()) => {}
                        Err(AnalyzerError::Violation(violation)) => {
                            return reject(args, violation);
                        }
                        Err(AnalyzerError::Failed(err)) => {
                            tracing::warn!(entry = %name, error = %err, "analyzer failed, ignoring");
                        }
                    }
                }
            }

            original(args)
        })
    }
}

impl<A, R> Drop for Hook<A, R> {
    fn drop(&mut self) {
        if self.state.installed.get()
            && let Some(original) = self.state.original.borrow_mut().take()
        {
            self.entry.swap(original);
        }
    }
}
