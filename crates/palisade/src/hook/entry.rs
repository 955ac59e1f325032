//! Swappable entry points.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The callable behind an entry point.
pub type Handler<A, R> = Rc<dyn Fn(A) -> R>;

/// Stable identity of an entry point, unchanged by interception.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// An indirection slot every caller goes through to reach an operation.
///
/// Interception replaces the handler; the entry point's identity (its
/// [`EntryId`] and name) never changes, so code that checks "is this the
/// entry point I think it is" keeps working while a hook is installed.
pub struct EntryPoint<A, R> {
    id: EntryId,
    name: String,
    handler: RefCell<Handler<A, R>>,
}

impl<A, R> fmt::Debug for EntryPoint<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<A: 'static, R: 'static> EntryPoint<A, R> {
    /// Create an entry point with its native handler.
    pub fn new(name: impl Into<String>, handler: impl Fn(A) -> R + 'static) -> Self {
        Self {
            id: EntryId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            handler: RefCell::new(Rc::new(handler)),
        }
    }
}

impl<A, R> EntryPoint<A, R> {
    /// Invoke whatever handler is current.
    ///
    /// The handler is cloned out before the call, so a handler may swap the
    /// slot (or call back into it) while running.
    pub fn call(&self, args: A) -> R {
        let handler = Rc::clone(&self.handler.borrow());
        handler(args)
    }

    /// Stable identity.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Human-readable name, e.g. `fs.readFileSync`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current handler.
    pub fn handler(&self) -> Handler<A, R> {
        Rc::clone(&self.handler.borrow())
    }

    /// Install `handler` and return the one it replaced.
    ///
    /// Nothing stops a later caller from swapping over an installed hook.
    pub fn swap(&self, handler: Handler<A, R>) -> Handler<A, R> {
        self.handler.replace(handler)
    }

    /// Returns true if `handler` is exactly the current handler.
    pub fn is_current(&self, handler: &Handler<A, R>) -> bool {
        Rc::ptr_eq(&self.handler.borrow(), handler)
    }
}
