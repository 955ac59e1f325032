//! The host's mediated entry points.
//!
//! A [`Platform`] bundles every entry point Palisade knows how to guard:
//!
//! - [`FsApi`] - file reads, opens and directory listings
//! - [`NetApi`] - stream connects, name lookups and outbound requests
//! - [`ModuleApi`] - module loading
//! - [`CodeApi`] - string evaluation and function construction
//!
//! Each entry point comes in the shapes the host offers: synchronous,
//! callback-based and future-based. Callback deliveries are scheduled with
//! [`defer`], so callback entry points must be called from inside a
//! `tokio::task::LocalSet`.

mod code;
mod fs;
mod modules;
mod net;

use std::fmt;
use std::rc::Rc;

pub use code::{Callable, CodeApi, ExecError, FunctionSource, Value};
pub use fs::{FileTarget, FsApi, ListResult, ReadResult};
pub use modules::{LoadError, LoadedModule, ModuleApi, ModuleRequest};
pub use net::{ConnectOptions, ConnectTarget, LookupResult, NetApi, OutboundRequest, ParsedUrl};

/// Completion callback for callback-style entry points.
pub type Callback<T> = Box<dyn FnOnce(T)>;

/// Run `f` on a later turn of the current `LocalSet`.
///
/// # Panics
///
/// Panics when called outside a `tokio::task::LocalSet`.
pub fn defer(f: impl FnOnce() + 'static) {
    tokio::task::spawn_local(async move { f() });
}

/// All entry points of one host.
pub struct Platform {
    /// File system entry points.
    pub fs: FsApi,
    /// Network entry points.
    pub net: NetApi,
    /// Module loading.
    pub modules: ModuleApi,
    /// Dynamic code execution.
    pub code: CodeApi,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("fs", &self.fs)
            .field("net", &self.net)
            .field("modules", &self.modules)
            .field("code", &self.code)
            .finish()
    }
}

impl Platform {
    /// Entry points backed by the real file system and network, with no
    /// code evaluator registered.
    pub fn native() -> Rc<Self> {
        Rc::new(Self {
            fs: FsApi::native(),
            net: NetApi::native(),
            modules: ModuleApi::native(),
            code: CodeApi::unsupported(),
        })
    }

    /// Native entry points with the host's code evaluator.
    pub fn with_code(code: CodeApi) -> Rc<Self> {
        Rc::new(Self {
            fs: FsApi::native(),
            net: NetApi::native(),
            modules: ModuleApi::native(),
            code,
        })
    }
}
