//! Ownership chain bookkeeping shared by every resource.
//!
//! Each resource carries a [`Header`] with four counters worth of state:
//!
//! - its lifecycle ([`Liveness`]),
//! - the number of outstanding borrows that pass through it,
//! - the number of live dependents (resources that name it as owner),
//! - an optional owner link ([`Anchor`]).
//!
//! A resource is *released* (its native disposal runs) only once it is closed
//! and both counters are zero. Releasing a resource drops the hold it has on
//! its owner, which may release the owner in turn. That cascade runs in a
//! loop, never by recursion, so chains of any depth unwind in constant stack.

use crate::error::contract_violation;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tether_log::{debug, trace};

/// Lifecycle of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Usable: borrows succeed.
    Live,
    /// Disposal requested. New borrows fail; native release waits for
    /// outstanding borrows and dependents to drain.
    Closed,
    /// The native disposal function has run.
    Released,
}

pub(crate) struct Header {
    kind: &'static str,
    state: Cell<Liveness>,
    borrows: Cell<u32>,
    dependents: Cell<u32>,
    owner: Option<Anchor>,
    #[cfg(feature = "resource-backtrace")]
    origin: backtrace::Backtrace,
}

impl Header {
    pub(crate) fn new(kind: &'static str, owner: Option<Anchor>) -> Self {
        Header {
            kind,
            state: Cell::new(Liveness::Live),
            borrows: Cell::new(0),
            dependents: Cell::new(0),
            owner,
            #[cfg(feature = "resource-backtrace")]
            origin: backtrace::Backtrace::new_unresolved(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn state(&self) -> Liveness {
        self.state.get()
    }

    pub(crate) fn borrows(&self) -> u32 {
        self.borrows.get()
    }

    pub(crate) fn dependents(&self) -> u32 {
        self.dependents.get()
    }

    pub(crate) fn owner(&self) -> Option<&Anchor> {
        self.owner.as_ref()
    }

    fn can_release(&self) -> bool {
        self.state.get() == Liveness::Closed && self.borrows.get() == 0 && self.dependents.get() == 0
    }

    /// Where this resource was created, if backtraces are being captured.
    #[cfg(feature = "resource-backtrace")]
    pub(crate) fn origin(&self) -> String {
        let mut origin = self.origin.clone();
        origin.resolve();
        format!("\ncreated at:\n{origin:?}")
    }

    #[cfg(not(feature = "resource-backtrace"))]
    pub(crate) fn origin(&self) -> String {
        String::new()
    }
}

impl Drop for Header {
    fn drop(&mut self) {
        // Detach owner links one at a time so dropping the last handle of a
        // long chain does not recurse once per link.
        let mut next = self.owner.take();
        while let Some(mut anchor) = next {
            next = Rc::get_mut(&mut anchor.0).and_then(|node| node.header_mut().owner.take());
        }
    }
}

/// A node in an ownership chain.
///
/// Implemented by the storage behind every [`Resource`](crate::Resource);
/// `release_native` is called exactly once, by [`finalize`].
pub(crate) trait Node {
    fn header(&self) -> &Header;
    fn header_mut(&mut self) -> &mut Header;
    fn release_native(&self);
}

/// Type-erased, shared reference to a resource, used as an owner link.
///
/// Holding an anchor keeps the resource's bookkeeping alive but does not keep
/// the resource usable: once it is disposed, borrows through the anchor fail.
#[derive(Clone)]
pub struct Anchor(pub(crate) Rc<dyn Node>);

impl Anchor {
    pub(crate) fn node(&self) -> &dyn Node {
        &*self.0
    }

    /// Kind name given when the resource was created.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.0.header().kind()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.0.header().state()
    }

    /// Whether disposal has been requested.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.liveness() != Liveness::Live
    }

    /// Number of borrows passing through this resource.
    #[must_use]
    pub fn borrow_count(&self) -> u32 {
        self.0.header().borrows()
    }

    /// Number of live resources owned by this one.
    #[must_use]
    pub fn dependent_count(&self) -> u32 {
        self.0.header().dependents()
    }

    /// The owner of this resource, if any.
    #[must_use]
    pub fn owner(&self) -> Option<Anchor> {
        self.0.header().owner().cloned()
    }

    /// Whether both anchors refer to the same resource.
    #[must_use]
    pub fn ptr_eq(&self, other: &Anchor) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("kind", &self.kind())
            .field("liveness", &self.liveness())
            .field("borrows", &self.borrow_count())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

/// Registers a new dependent on `owner`.
///
/// Fails if the owner is already closed or released.
pub(crate) fn attach(owner: &Anchor) -> Result<(), &'static str> {
    let header = owner.0.header();
    if header.state() != Liveness::Live {
        return Err(header.kind());
    }
    let count = header.dependents.get();
    if count == u32::MAX {
        contract_violation(format_args!("dependent count overflow on {}", header.kind()));
    }
    header.dependents.set(count + 1);
    Ok(())
}

/// Takes one borrow on a single node. Fails if the node is not live.
pub(crate) fn acquire(node: &dyn Node) -> Result<(), &'static str> {
    let header = node.header();
    if header.state() != Liveness::Live {
        return Err(header.kind());
    }
    let count = header.borrows.get();
    if count == u32::MAX {
        contract_violation(format_args!("borrow count overflow on {}", header.kind()));
    }
    header.borrows.set(count + 1);
    Ok(())
}

/// Drops one borrow on a single node, releasing it if that was the last
/// thing keeping a closed node alive.
pub(crate) fn release_borrow(node: &dyn Node) {
    let header = node.header();
    let count = header.borrows.get();
    if count == 0 {
        contract_violation(format_args!("borrow released twice on {}", header.kind()));
    }
    header.borrows.set(count - 1);
    if header.can_release() {
        debug!("{}: last borrow ended, completing deferred release", header.kind());
        finalize(node);
    }
}

/// Requests disposal. Returns `false` if the node was already closed.
///
/// Releases immediately when nothing is outstanding; otherwise the release
/// happens when the last borrow or dependent goes away.
pub(crate) fn close(node: &dyn Node) -> bool {
    let header = node.header();
    if header.state() != Liveness::Live {
        return false;
    }
    header.state.set(Liveness::Closed);
    if header.can_release() {
        finalize(node);
    } else {
        debug!(
            "{}: closed with {} borrow(s) and {} dependent(s), release deferred",
            header.kind(),
            header.borrows(),
            header.dependents()
        );
    }
    true
}

/// Runs native disposal for `node` and walks up the owner chain releasing
/// every ancestor that this leaves with nothing outstanding.
pub(crate) fn finalize(node: &dyn Node) {
    let mut current = node;
    loop {
        let header = current.header();
        if header.state() == Liveness::Released {
            contract_violation(format_args!("{} released twice", header.kind()));
        }
        header.state.set(Liveness::Released);
        current.release_native();
        trace!("{}: released", header.kind());

        let Some(owner) = header.owner() else {
            break;
        };
        let parent = owner.node().header();
        parent.dependents.set(parent.dependents.get() - 1);
        if !parent.can_release() {
            break;
        }
        debug!("{}: last dependent released, completing deferred release", parent.kind());
        current = owner.node();
    }
}
