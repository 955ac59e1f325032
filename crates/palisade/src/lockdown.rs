//! Disabling string-to-code execution.

use std::fmt;
use std::rc::Rc;

use crate::enforcement::Enforcer;
use crate::hook::Hook;
use crate::platform::{Callable, CodeApi, ExecError, FunctionSource, Value};
use crate::policy::PolicyDecision;

/// Replaces the host's code evaluators with stand-ins that always refuse.
///
/// The lockdown ignores the policy mode: even in warn or audit mode a locked
/// evaluator never runs. The entry points keep their identity, so only their
/// behavior changes while locked.
pub struct CodeExecutionLockdown {
    eval: Hook<String, Result<Value, ExecError>>,
    construct: Hook<FunctionSource, Result<Callable, ExecError>>,
}

impl fmt::Debug for CodeExecutionLockdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExecutionLockdown")
            .field("installed", &self.is_installed())
            .finish_non_exhaustive()
    }
}

impl CodeExecutionLockdown {
    /// Create a lockdown over `code`, not yet installed.
    pub fn new(code: &CodeApi) -> Self {
        let enforcer = Rc::new(Enforcer::always_enforce());
        Self {
            eval: Hook::new(
                Rc::clone(&code.eval),
                |_: &String| {
                    PolicyDecision::block("Dynamic code execution via eval is disabled")
                },
                |_, violation| Err(ExecError::Violation(violation)),
                Rc::clone(&enforcer),
            ),
            construct: Hook::new(
                Rc::clone(&code.construct),
                |_: &FunctionSource| {
                    PolicyDecision::block("Dynamic function construction is disabled")
                },
                |_, violation| Err(ExecError::Violation(violation)),
                enforcer,
            ),
        }
    }

    /// Lock both evaluators. Installing twice does nothing.
    pub fn install(&self) {
        self.eval.install(None);
        self.construct.install(None);
        tracing::debug!("code execution locked down");
    }

    /// Put the original evaluators back. Restoring twice does nothing.
    pub fn restore(&self) {
        self.eval.uninstall();
        self.construct.uninstall();
        tracing::debug!("code execution restored");
    }

    /// Whether the evaluators are locked.
    pub fn is_installed(&self) -> bool {
        self.eval.is_installed()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn host_code() -> CodeApi {
        CodeApi::new(
            |src| Ok(Value::from(src.len())),
            |_| {
                let f: Callable = Rc::new(|_: &[Value]| Ok(Value::Null));
                Ok(f)
            },
        )
    }

    #[test]
    fn test_locked_evaluators_refuse() {
        let code = host_code();
        let lockdown = CodeExecutionLockdown::new(&code);
        lockdown.install();

        match code.eval.call("1 + 1".into()) {
            Err(ExecError::Violation(violation)) => {
                assert!(violation.to_string().starts_with("[palisade] Blocked by policy:"));
            }
            other => panic!("expected a violation, got {other:?}"),
        }
        assert!(matches!(
            code.construct.call(FunctionSource::new(["a"], "return a")),
            Err(ExecError::Violation(_))
        ));
    }

    #[test]
    fn test_identity_preserved_and_restored_exactly() {
        let code = host_code();
        let eval_id = code.eval.id();
        let eval_native = code.eval.handler();
        let construct_native = code.construct.handler();

        let lockdown = CodeExecutionLockdown::new(&code);
        lockdown.install();
        lockdown.install();
        assert!(lockdown.is_installed());
        assert_eq!(code.eval.id(), eval_id);
        assert_eq!(code.eval.name(), "eval");
        assert_eq!(code.construct.name(), "Function");

        lockdown.restore();
        lockdown.restore();
        assert!(!lockdown.is_installed());
        assert!(code.eval.is_current(&eval_native));
        assert!(code.construct.is_current(&construct_native));
        assert_eq!(code.eval.call("abc".into()).unwrap(), Value::from(3));
    }
}
