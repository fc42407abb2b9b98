//! Disposable native resources.
//!
//! A [`Resource`] wraps one native value (a handle, pointer or small POD
//! struct of pointers) together with the function that releases it. It may
//! name an owner; while it lives the owner cannot be released, and it cannot
//! be borrowed once the owner is disposed.
//!
//! # Disposal
//!
//! | call                      | borrows outstanding     | otherwise                  |
//! |---------------------------|-------------------------|----------------------------|
//! | [`Resource::dispose`]     | contract violation      | close, release if possible |
//! | [`Resource::try_dispose`] | `Err(Error::InUse)`     | close, release if possible |
//! | dropping the handle       | close, release deferred | close, release if possible |
//!
//! "Release if possible" means the native disposal function runs right away
//! if no dependents remain, and otherwise when the last dependent is released.

use crate::chain::{self, Anchor, Header, Liveness, Node};
use crate::error::{Error, Result, contract_violation};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tether_log::{debug, trace};

struct Slot<T> {
    header: Header,
    value: Cell<Option<T>>,
    dispose: Option<fn(T)>,
}

impl<T: Copy + 'static> Node for Slot<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    fn release_native(&self) {
        // References keep their value; the owner releases it.
        if let Some(dispose) = self.dispose
            && let Some(value) = self.value.take()
        {
            dispose(value);
        }
    }
}

/// Owning handle to a native value.
///
/// `T` is the raw native value; it is copied out on every borrow, so it must
/// be `Copy`. The handle is not `Clone`: share it by reference, or share its
/// [`Anchor`] when only the ownership link is needed.
pub struct Resource<T: Copy + 'static> {
    slot: Rc<Slot<T>>,
}

impl<T: Copy + 'static> Resource<T> {
    /// Takes ownership of `value`, to be released with `dispose`.
    ///
    /// If `owner` is given it gains a dependent and is kept unreleased until
    /// this resource is released.
    ///
    /// # Errors
    ///
    /// [`Error::DisposedAncestor`] if `owner` is already disposed. `value` is
    /// passed to `dispose` before returning so it is never leaked.
    pub fn new(kind: &'static str, value: T, dispose: fn(T), owner: Option<&Anchor>) -> Result<Self> {
        Self::build(kind, value, Some(dispose), owner)
    }

    /// Wraps a value that is owned elsewhere (normally by `owner`).
    ///
    /// Nothing is released when this resource goes away; it only tracks
    /// liveness so that borrows fail once the owner is gone.
    ///
    /// # Errors
    ///
    /// [`Error::DisposedAncestor`] if `owner` is already disposed.
    pub fn reference(kind: &'static str, value: T, owner: &Anchor) -> Result<Self> {
        Self::build(kind, value, None, Some(owner))
    }

    fn build(kind: &'static str, value: T, dispose: Option<fn(T)>, owner: Option<&Anchor>) -> Result<Self> {
        if let Some(owner) = owner
            && let Err(owner_kind) = chain::attach(owner)
        {
            debug!("{kind}: owner {owner_kind} already disposed, releasing value");
            if let Some(dispose) = dispose {
                dispose(value);
            }
            return Err(Error::DisposedAncestor { kind: owner_kind });
        }

        trace!("{kind}: created");
        Ok(Resource {
            slot: Rc::new(Slot {
                header: Header::new(kind, owner.cloned()),
                value: Cell::new(Some(value)),
                dispose,
            }),
        })
    }

    pub(crate) fn node(&self) -> &dyn Node {
        &*self.slot
    }

    /// The wrapped value, or `None` once released.
    pub(crate) fn value(&self) -> Option<T> {
        self.slot.value.get()
    }

    /// Requests disposal.
    ///
    /// Idempotent: a second call does nothing. If other resources still
    /// depend on this one, the native release is deferred until they are
    /// gone; borrowing fails from this point on either way.
    ///
    /// # Panics
    ///
    /// Contract violation if a borrow of this resource (or of a descendant)
    /// is outstanding. Use [`try_dispose`](Self::try_dispose) to get an error
    /// instead.
    #[track_caller]
    pub fn dispose(&self) {
        let header = self.slot.header();
        if header.state() != Liveness::Live {
            return;
        }
        if header.borrows() > 0 {
            contract_violation(format_args!(
                "{} disposed while {} borrow(s) are outstanding{}",
                header.kind(),
                header.borrows(),
                header.origin()
            ));
        }
        chain::close(self.node());
    }

    /// Like [`dispose`](Self::dispose), but reports outstanding borrows.
    ///
    /// # Errors
    ///
    /// [`Error::InUse`] if the resource is borrowed; the resource stays live.
    pub fn try_dispose(&self) -> Result<()> {
        let header = self.slot.header();
        if header.state() != Liveness::Live {
            return Ok(());
        }
        if header.borrows() > 0 {
            return Err(Error::InUse {
                kind: header.kind(),
                borrows: header.borrows(),
            });
        }
        chain::close(self.node());
        Ok(())
    }

    /// Shared ownership link to this resource.
    #[must_use]
    pub fn anchor(&self) -> Anchor {
        Anchor(self.slot.clone())
    }

    /// The owner named at creation.
    #[must_use]
    pub fn owner(&self) -> Option<Anchor> {
        self.slot.header().owner().cloned()
    }

    /// Diagnostic name given at creation, such as `"TranslationUnit"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.slot.header().kind()
    }

    /// Where this resource is in its life: live, closed with the native
    /// release pending, or released.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.slot.header().state()
    }

    /// Whether disposal has been requested, explicitly or through drop.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.liveness() != Liveness::Live
    }

    /// Whether this resource or any of its ancestors has been disposed.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        let mut current = Some(self.node());
        while let Some(node) = current {
            if node.header().state() != Liveness::Live {
                return false;
            }
            current = node.header().owner().map(Anchor::node);
        }
        true
    }

    /// Outstanding borrows of this resource and of its descendants.
    #[must_use]
    pub fn borrow_count(&self) -> u32 {
        self.slot.header().borrows()
    }

    /// Resources that name this one as their owner and are not yet released.
    #[must_use]
    pub fn dependent_count(&self) -> u32 {
        self.slot.header().dependents()
    }
}

impl<T: Copy + 'static> Drop for Resource<T> {
    fn drop(&mut self) {
        chain::close(self.node());
    }
}

impl<T: Copy + 'static> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind())
            .field("liveness", &self.liveness())
            .field("borrows", &self.borrow_count())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static RELEASED: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    }

    fn record(value: u32) {
        RELEASED.with(|r| r.borrow_mut().push(value));
    }

    fn released() -> Vec<u32> {
        RELEASED.with(|r| r.borrow().clone())
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let r = Resource::new("Thing", 1, record, None).unwrap();
        r.dispose();
        r.dispose();
        assert!(r.try_dispose().is_ok());
        drop(r);
        assert_eq!(released(), [1]);
    }

    #[test]
    fn test_drop_disposes() {
        {
            let _r = Resource::new("Thing", 2, record, None).unwrap();
        }
        assert_eq!(released(), [2]);
    }

    #[test]
    fn test_parent_released_after_last_child() {
        let parent = Resource::new("Parent", 10, record, None).unwrap();
        let a = Resource::new("Child", 11, record, Some(&parent.anchor())).unwrap();
        let b = Resource::new("Child", 12, record, Some(&parent.anchor())).unwrap();
        assert_eq!(parent.dependent_count(), 2);

        parent.dispose();
        assert!(parent.is_disposed());
        assert_eq!(parent.liveness(), Liveness::Closed);
        assert!(released().is_empty());

        drop(b);
        assert_eq!(released(), [12]);
        a.dispose();
        assert_eq!(released(), [12, 11, 10]);
        assert_eq!(parent.liveness(), Liveness::Released);
    }

    #[test]
    fn test_create_under_disposed_owner_releases_value() {
        let parent = Resource::new("Parent", 20, record, None).unwrap();
        let anchor = parent.anchor();
        parent.dispose();

        match Resource::new("Child", 21, record, Some(&anchor)) {
            Err(Error::DisposedAncestor { kind }) => assert_eq!(kind, "Parent"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(released(), [20, 21]);
    }

    #[test]
    fn test_reference_never_releases() {
        let owner = Resource::new("Owner", 30, record, None).unwrap();
        let view = Resource::reference("View", 31u32, &owner.anchor()).unwrap();
        view.dispose();
        owner.dispose();
        assert_eq!(released(), [30]);
        assert_eq!(view.value(), Some(31));
        assert_eq!(owner.value(), None);
    }

    #[test]
    fn test_is_usable_checks_ancestors() {
        let root = Resource::new("Root", 40, record, None).unwrap();
        let mid = Resource::reference("Mid", 0u32, &root.anchor()).unwrap();
        let leaf = Resource::reference("Leaf", 0u32, &mid.anchor()).unwrap();
        assert!(leaf.is_usable());

        root.dispose();
        assert!(!leaf.is_disposed());
        assert!(!leaf.is_usable());
    }

    #[test]
    fn test_debug_output() {
        let r = Resource::new("Thing", 50, record, None).unwrap();
        let text = format!("{r:?}");
        assert!(text.contains("kind: \"Thing\""));
        assert!(text.contains("Live"));
    }

    #[test]
    fn test_dropped_reference_releases_closed_owner() {
        let owner = Resource::new("Owner", 60, record, None).unwrap();
        let view = Resource::reference("View", 61u32, &owner.anchor()).unwrap();
        drop(owner);
        assert!(released().is_empty(), "the view still depends on the owner");

        drop(view);
        assert_eq!(released(), [60]);
    }

    #[cfg(feature = "resource-backtrace")]
    #[test]
    #[should_panic(expected = "created at")]
    fn test_dispose_violation_reports_creation_site() {
        let r = Resource::new("Traced", 70, record, None).unwrap();
        let _borrow = r.borrow().unwrap();
        r.dispose();
    }
}
