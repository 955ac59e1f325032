//! Dynamic code execution entry points.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::error::SecurityViolation;
use crate::hook::EntryPoint;

/// A value produced or consumed by evaluated code.
pub type Value = serde_json::Value;

/// A function built from source text.
pub type Callable = Rc<dyn Fn(&[Value]) -> Result<Value, ExecError>>;

/// Source of a function to construct at runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSource {
    /// Parameter names.
    pub params: Vec<String>,
    /// Function body.
    pub body: String,
}

impl FunctionSource {
    /// A function with the given parameters and body.
    pub fn new<I, S>(params: I, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }
}

/// Error returned by code execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Execution was blocked by policy.
    #[error(transparent)]
    Violation(#[from] SecurityViolation),
    /// The host has no evaluator.
    #[error("code execution is not supported by this host")]
    Unsupported,
    /// The evaluated code failed.
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Entry points that turn text into running code.
pub struct CodeApi {
    /// Evaluate source text.
    pub eval: Rc<EntryPoint<String, Result<Value, ExecError>>>,
    /// Construct a function from source text.
    pub construct: Rc<EntryPoint<FunctionSource, Result<Callable, ExecError>>>,
}

impl fmt::Debug for CodeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeApi")
            .field("eval", &self.eval)
            .field("construct", &self.construct)
            .finish()
    }
}

impl CodeApi {
    /// Entry points backed by the host's evaluator.
    pub fn new(
        eval: impl Fn(String) -> Result<Value, ExecError> + 'static,
        construct: impl Fn(FunctionSource) -> Result<Callable, ExecError> + 'static,
    ) -> Self {
        Self {
            eval: Rc::new(EntryPoint::new("eval", eval)),
            construct: Rc::new(EntryPoint::new("Function", construct)),
        }
    }

    /// Entry points for a host without an evaluator.
    pub fn unsupported() -> Self {
        Self::new(|_| Err(ExecError::Unsupported), |_| Err(ExecError::Unsupported))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_host() {
        let code = CodeApi::unsupported();
        assert!(matches!(code.eval.call("1 + 1".into()), Err(ExecError::Unsupported)));
        assert!(matches!(
            code.construct.call(FunctionSource::new(["a"], "return a")),
            Err(ExecError::Unsupported)
        ));
    }

    #[test]
    fn test_host_evaluator() {
        let code = CodeApi::new(
            |src| src.trim().parse::<i64>().map(Value::from).map_err(|e| ExecError::Failed(e.to_string())),
            |source| {
                let first = source.params.first().cloned();
                let f: Callable = Rc::new(move |args: &[Value]| {
                    Ok(first.as_ref().and_then(|_| args.first().cloned()).unwrap_or(Value::Null))
                });
                Ok(f)
            },
        );

        assert_eq!(code.eval.call(" 42 ".into()).unwrap(), Value::from(42));
        assert!(matches!(code.eval.call("x".into()), Err(ExecError::Failed(_))));

        let identity = code.construct.call(FunctionSource::new(["x"], "return x")).unwrap();
        assert_eq!(identity(&[Value::from("hi")]).unwrap(), Value::from("hi"));
    }
}
