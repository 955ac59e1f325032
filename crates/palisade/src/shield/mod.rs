//! Resource shields.
//!
//! A shield is a set of hooks over one family of entry points, judged by a
//! fixed rule set instead of the package policy:
//!
//! - [`FileShield`] keeps credential files and directories out of reach of
//!   every file read, open and listing entry point.
//! - [`NetworkShield`] keeps cloud metadata endpoints out of reach of
//!   connects, lookups and outbound requests.
//!
//! Rules can be appended while a shield is active; they are never removed.
//! Blocks go through the context's [`Enforcer`](crate::enforcement::Enforcer),
//! so warn and audit modes apply to shields exactly as to module loading.

mod file;
mod network;

use std::io;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};

use crate::error::SecurityViolation;
use crate::platform::{Callback, defer};

pub use file::{FileRule, FileRules, FileShield};
pub use network::{NetworkRule, NetworkRules, NetworkShield};

/// A switchable group of hooks.
pub trait Shield {
    /// Install every hook. Activating an active shield does nothing.
    fn activate(&self);

    /// Restore every original handler. Deactivating an inactive shield does
    /// nothing.
    fn deactivate(&self);

    /// Whether the hooks are installed.
    fn is_active(&self) -> bool;
}

fn reject_sync<A, T>(_: A, violation: SecurityViolation) -> io::Result<T> {
    Err(violation.into_io_error())
}

fn reject_async<A, T: 'static>(
    _: A,
    violation: SecurityViolation,
) -> LocalBoxFuture<'static, io::Result<T>> {
    future::ready(Err(violation.into_io_error())).boxed_local()
}

// Callback entry points never fail synchronously; the error arrives on a
// later turn like any other completion.
fn reject_callback<X, T: 'static>(
    (_, callback): (X, Callback<io::Result<T>>),
    violation: SecurityViolation,
) {
    defer(move || callback(Err(violation.into_io_error())));
}
