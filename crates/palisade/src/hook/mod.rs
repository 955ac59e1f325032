//! Interception of entry points.
//!
//! Every mediated operation is reached through an [`EntryPoint`]. A [`Hook`]
//! swaps the entry point's handler for a wrapper that checks each call before
//! forwarding it, and swaps the original back on uninstall. Shields and the
//! code execution lockdown are all built from hooks; they only differ in which
//! entry points they wrap and how they judge a call.
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use palisade::enforcement::Enforcer;
//! use palisade::hook::{EntryPoint, Hook};
//! use palisade::policy::PolicyDecision;
//! use palisade::SecurityViolation;
//!
//! let read = Rc::new(EntryPoint::new("read", |path: String| -> Result<String, SecurityViolation> {
//!     Ok(format!("contents of {path}"))
//! }));
//!
//! let hook = Hook::new(
//!     Rc::clone(&read),
//!     |path: &String| {
//!         if path.ends_with(".env") {
//!             PolicyDecision::block("environment file")
//!         } else {
//!             PolicyDecision::allow("ok")
//!         }
//!     },
//!     |_, violation| Err(violation),
//!     Rc::new(Enforcer::default()),
//! );
//! hook.install(None);
//!
//! assert!(read.call("/app/.env".to_string()).is_err());
//! assert!(read.call("/app/main.rs".to_string()).is_ok());
//!
//! hook.uninstall();
//! assert!(read.call("/app/.env".to_string()).is_ok());
//! ```

mod entry;
mod interceptor;

pub use entry::{EntryId, EntryPoint, Handler};
pub use interceptor::{Analyzer, AnalyzerError, Check, Hook, Reject, analyzer};
