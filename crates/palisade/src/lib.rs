//! Palisade: policy-mediated access to sensitive entry points
//!
//! Palisade sits between a process and the operations a compromised
//! dependency would reach for: loading other modules, reading credential
//! files, talking to cloud metadata endpoints and turning strings into code.
//! Each of those is an [`EntryPoint`](hook::EntryPoint); Palisade swaps in a
//! checking wrapper, evaluates the request against a declarative policy and
//! either forwards it unchanged or refuses it with a [`SecurityViolation`].
//!
//! ```rust
//! use palisade::platform::{ModuleRequest, Platform};
//! use palisade::{FlatConfig, Palisade};
//!
//! let palisade = Palisade::init(
//!     Platform::native(),
//!     FlatConfig {
//!         blocklist: vec!["event-stream".into()],
//!         ..FlatConfig::default()
//!     },
//! )
//! .unwrap();
//! palisade.install_module_hook();
//!
//! let load = &palisade.platform().modules.load;
//! let err = load.call(ModuleRequest::new("event-stream")).unwrap_err();
//! assert!(err.violation().is_some());
//! ```

pub mod config;
pub mod enforcement;
pub mod error;
pub mod hook;
pub mod lockdown;
pub mod logging;
pub mod platform;
pub mod policy;
pub mod shield;
pub mod similarity;

mod runtime;


pub use config::{ConfigInput, FlatConfig, Mode, PackageRule, PolicyConfiguration, load_config};
pub use error::{ConfigurationError, SecurityViolation};
pub use lockdown::CodeExecutionLockdown;
pub use logging::{LogLevel, LogSink};
pub use policy::{Action, PolicyDecision, PolicyEngine, PolicyHandler, ResolveContext};
pub use runtime::Palisade;
pub use shield::{FileShield, NetworkShield, Shield};
pub use similarity::{SimilarityResult, check_typosquat};
