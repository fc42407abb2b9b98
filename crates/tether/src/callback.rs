//! Pinning managed objects behind opaque callback tokens.
//!
//! Native code can only carry an opaque pointer-sized value through a
//! callback. A [`CallbackToken`] is that value: a non-zero integer key into a
//! per-thread table of pinned objects. The table holds a strong reference, so
//! a pinned object stays alive until it is unpinned no matter who else lets
//! go of it.
//!
//! Tokens are never reused on a thread, which turns a stale token into a
//! detectable lookup miss rather than a silent alias of a newer object.
//! Resolving an unknown token, or one pinned as a different type, is a
//! contract violation.

use crate::error::contract_violation;
use fxhash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::rc::Rc;
use tether_log::trace;

/// Opaque key for a pinned object. Converts losslessly to and from the
/// `void*` client-data pointer native callbacks carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(NonZeroUsize);

impl CallbackToken {
    /// The token as a native client-data pointer.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    /// Recovers a token from a client-data pointer. Null gives `None`.
    #[must_use]
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(CallbackToken)
    }

    /// The table key, equal to the pointer's address.
    #[must_use]
    pub fn id(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct TokenTable {
    next: Cell<NonZeroUsize>,
    entries: RefCell<FxHashMap<usize, Rc<dyn Any>>>,
}

thread_local! {
    static TOKENS: TokenTable = TokenTable {
        next: Cell::new(NonZeroUsize::MIN),
        entries: RefCell::new(FxHashMap::default()),
    };
}

/// Pins `object` and returns the guard that unpins it.
pub fn pin<T: Any>(object: Rc<T>) -> Pinned {
    pin_any(object)
}

/// Pins an already type-erased object.
pub fn pin_any(object: Rc<dyn Any>) -> Pinned {
    let token = TOKENS.with(|table| {
        let id = table.next.get();
        match id.checked_add(1) {
            Some(next) => table.next.set(next),
            None => contract_violation(format_args!("callback token space exhausted")),
        }
        table.entries.borrow_mut().insert(id.get(), object);
        CallbackToken(id)
    });
    trace!("pinned callback object {token}");
    Pinned {
        token,
        _local: PhantomData,
    }
}

/// Resolves a token to the pinned object, checking its type.
///
/// # Panics
///
/// Contract violation if the token is not pinned on this thread or was
/// pinned as a different type.
#[track_caller]
pub fn resolve<T: Any>(token: CallbackToken) -> Rc<T> {
    match resolve_any(token).downcast::<T>() {
        Ok(object) => object,
        Err(_) => contract_violation(format_args!(
            "callback token {token} does not refer to a {}",
            std::any::type_name::<T>()
        )),
    }
}

/// Resolves a token without checking the type.
///
/// # Panics
///
/// Contract violation if the token is not pinned on this thread.
#[track_caller]
pub fn resolve_any(token: CallbackToken) -> Rc<dyn Any> {
    match try_resolve_any(token) {
        Some(object) => object,
        None => contract_violation(format_args!("callback token {token} is not pinned")),
    }
}

/// Resolves a raw client-data pointer.
///
/// # Panics
///
/// Contract violation if `ptr` is null or does not resolve to a `T`.
#[track_caller]
pub fn resolve_ptr<T: Any>(ptr: *const c_void) -> Rc<T> {
    match CallbackToken::from_ptr(ptr) {
        Some(token) => resolve(token),
        None => contract_violation(format_args!("null callback token")),
    }
}

/// Resolves a token, or `None` if nothing is pinned under it.
#[must_use]
pub fn try_resolve_any(token: CallbackToken) -> Option<Rc<dyn Any>> {
    TOKENS.with(|table| table.entries.borrow().get(&token.id()).cloned())
}

/// Whether `token` is currently pinned on this thread.
#[must_use]
pub fn is_pinned(token: CallbackToken) -> bool {
    TOKENS.with(|table| table.entries.borrow().contains_key(&token.id()))
}

/// Number of objects currently pinned on this thread.
#[must_use]
pub fn pinned_count() -> usize {
    TOKENS.with(|table| table.entries.borrow().len())
}

fn unpin(token: CallbackToken) {
    let removed = TOKENS.with(|table| table.entries.borrow_mut().remove(&token.id()));
    match removed {
        // Dropped outside the table borrow: the object may own pins itself.
        Some(object) => {
            drop(object);
            trace!("unpinned callback object {token}");
        }
        None => contract_violation(format_args!("callback token {token} unpinned twice")),
    }
}

/// Guard for a pinned object. Unpins on drop.
///
/// Not `Send`: tokens are only meaningful on the thread that created them.
#[must_use = "dropping the guard unpins the object immediately"]
pub struct Pinned {
    token: CallbackToken,
    _local: PhantomData<Rc<()>>,
}

impl Pinned {
    #[must_use]
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// The token as a native client-data pointer.
    #[must_use]
    pub fn as_ptr(&self) -> *mut c_void {
        self.token.as_ptr()
    }
}

impl Drop for Pinned {
    fn drop(&mut self) {
        unpin(self.token);
    }
}

impl fmt::Debug for Pinned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pinned").field(&self.token).finish()
    }
}

/// Objects handed to native code during one operation.
///
/// Each tracked object is pinned until [`release_all`](Self::release_all) or
/// until the set is dropped, so client data attached to native entities
/// survives for the whole operation and no longer.
#[derive(Default)]
pub struct ClientObjects {
    pins: RefCell<Vec<Pinned>>,
}

impl ClientObjects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `object` for the lifetime of this set and returns its token.
    pub fn track(&self, object: Rc<dyn Any>) -> CallbackToken {
        let pinned = pin_any(object);
        let token = pinned.token();
        self.pins.borrow_mut().push(pinned);
        token
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.borrow().is_empty()
    }

    /// Unpins every tracked object.
    pub fn release_all(&self) {
        let pins = self.pins.take();
        drop(pins);
    }
}

impl fmt::Debug for ClientObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientObjects").field("len", &self.len()).finish()
    }
}
