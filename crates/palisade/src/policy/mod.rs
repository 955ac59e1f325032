//! Policy decisions for module specifiers.
//!
//! The engine answers one question: given a specifier such as `lodash/fp`,
//! `@scope/pkg`, `node:fs` or `./local`, should loading it be allowed,
//! blocked, allowed with a warning, or handed to deeper analysis?
//!
//! ## Design Philosophy
//!
//! The engine only decides. Applying a decision (raising, logging, or
//! forwarding) happens in the hook that intercepted the request, according to
//! the configured [`Mode`](crate::config::Mode). This keeps evaluation pure and
//! testable without installing anything.
//!
//! ## Example
//!
//! ```rust
//! use palisade::policy::{Action, PolicyBuilder, PolicyHandler, ResolveContext};
//!
//! let engine = PolicyBuilder::new()
//!     .builtins(false)
//!     .allow("events")
//!     .block("node:*", "no scheme imports")
//!     .build()
//!     .unwrap();
//!
//! let ctx = ResolveContext::default();
//! assert_eq!(engine.evaluate("events", &ctx).action, Action::Allow);
//! assert_eq!(engine.evaluate("node:fs", &ctx).action, Action::Block);
//! ```

mod builtins;
mod handler;
mod pattern;

pub use builtins::{BUILTIN_SCHEME, builtin_name};
pub use handler::{
    Action, AllowAllPolicy, DenyAllPolicy, PolicyBuilder, PolicyDecision, PolicyEngine,
    PolicyHandler, ResolveContext,
};
pub use pattern::{is_relative, matches, root_package_name};
