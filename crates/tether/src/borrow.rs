//! Scoped borrows across a whole ownership chain.

use crate::chain::{self, Anchor, Node};
use crate::error::{Error, Result};
use crate::resource::Resource;
use std::fmt;

/// Proof that a resource and every ancestor are live, for as long as the
/// borrow exists.
///
/// Creating a borrow takes one borrow on each link from the root down to the
/// resource; dropping it gives them back from the resource up to the root.
/// While any borrow is outstanding no link in the chain can be released, so
/// the raw value returned by [`get`](Self::get) is safe to hand to native
/// code.
pub struct Borrow<'a, T: Copy + 'static> {
    resource: &'a Resource<T>,
}

impl<T: Copy + 'static> Resource<T> {
    /// Borrows this resource and all of its ancestors.
    ///
    /// # Errors
    ///
    /// [`Error::ObjectDisposed`] naming the first disposed link, counting
    /// from the root. Links acquired before the failure are given back.
    pub fn borrow(&self) -> Result<Borrow<'_, T>> {
        acquire_chain(self.node())?;
        Ok(Borrow { resource: self })
    }
}

fn acquire_chain(leaf: &dyn Node) -> Result<()> {
    let mut links: Vec<&dyn Node> = Vec::new();
    let mut current = Some(leaf);
    while let Some(node) = current {
        links.push(node);
        current = node.header().owner().map(Anchor::node);
    }

    // Root first.
    for (acquired, node) in links.iter().rev().enumerate() {
        if let Err(kind) = chain::acquire(*node) {
            for held in links.iter().rev().take(acquired).rev() {
                chain::release_borrow(*held);
            }
            return Err(Error::ObjectDisposed { kind });
        }
    }
    Ok(())
}

fn release_chain(leaf: &dyn Node) {
    let mut current = Some(leaf);
    while let Some(node) = current {
        chain::release_borrow(node);
        current = node.header().owner().map(Anchor::node);
    }
}

impl<'a, T: Copy + 'static> Borrow<'a, T> {
    /// The native value.
    #[must_use]
    pub fn get(&self) -> T {
        match self.resource.value() {
            Some(value) => value,
            // A borrowed resource is never released.
            None => unreachable!("{} released while borrowed", self.resource.kind()),
        }
    }

    /// The borrowed resource.
    #[must_use]
    pub fn resource(&self) -> &'a Resource<T> {
        self.resource
    }
}

impl<T: Copy + 'static> Drop for Borrow<'_, T> {
    fn drop(&mut self) {
        release_chain(self.resource.node());
    }
}

impl<T: Copy + 'static> fmt::Debug for Borrow<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Borrow").field("kind", &self.resource.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Liveness;
    use std::cell::RefCell;

    thread_local! {
        static RELEASED: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }

    fn record(name: &'static str) {
        RELEASED.with(|r| r.borrow_mut().push(name));
    }

    fn released() -> Vec<&'static str> {
        RELEASED.with(|r| r.borrow().clone())
    }

    #[test]
    fn test_borrow_counts_whole_chain() {
        let root = Resource::new("Root", "root", record, None).unwrap();
        let mid = Resource::new("Mid", "mid", record, Some(&root.anchor())).unwrap();
        let leaf = Resource::new("Leaf", "leaf", record, Some(&mid.anchor())).unwrap();

        {
            let borrow = leaf.borrow().unwrap();
            assert_eq!(borrow.get(), "leaf");
            assert_eq!(root.borrow_count(), 1);
            assert_eq!(mid.borrow_count(), 1);
            assert_eq!(leaf.borrow_count(), 1);
        }
        assert_eq!(root.borrow_count(), 0);
        assert_eq!(leaf.borrow_count(), 0);
    }

    #[test]
    fn test_failed_borrow_rolls_back() {
        let root = Resource::new("Root", "root", record, None).unwrap();
        let mid = Resource::new("Mid", "mid", record, Some(&root.anchor())).unwrap();
        let leaf = Resource::new("Leaf", "leaf", record, Some(&mid.anchor())).unwrap();
        mid.dispose();

        match leaf.borrow() {
            Err(Error::ObjectDisposed { kind }) => assert_eq!(kind, "Mid"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(root.borrow_count(), 0);
        assert_eq!(leaf.borrow_count(), 0);
        assert!(released().is_empty());
    }

    #[test]
    fn test_try_dispose_in_use_through_descendant() {
        let a = Resource::new("A", "a", record, None).unwrap();
        let b = Resource::new("B", "b", record, Some(&a.anchor())).unwrap();

        let borrow = b.borrow().unwrap();
        match a.try_dispose() {
            Err(Error::InUse { kind, borrows }) => {
                assert_eq!(kind, "A");
                assert_eq!(borrows, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!a.is_disposed());
        drop(borrow);

        a.try_dispose().unwrap();
        assert_eq!(a.liveness(), Liveness::Closed);
        drop(b);
        assert_eq!(released(), ["b", "a"]);
    }

    #[test]
    #[should_panic(expected = "contract violation: A disposed while 1 borrow(s) are outstanding")]
    fn test_dispose_while_borrowed_is_violation() {
        let a = Resource::new("A", "a", record, None).unwrap();
        let _borrow = a.borrow().unwrap();
        a.dispose();
    }

    #[test]
    fn test_ancestor_drop_defers_until_borrow_ends() {
        let root = Resource::new("Root", "root", record, None).unwrap();
        let leaf = Resource::new("Leaf", "leaf", record, Some(&root.anchor())).unwrap();
        let root_anchor = root.anchor();

        let borrow = leaf.borrow().unwrap();
        drop(root);
        assert_eq!(root_anchor.liveness(), Liveness::Closed);
        assert_eq!(borrow.get(), "leaf");
        drop(borrow);

        assert!(leaf.borrow().is_err());
        drop(leaf);
        assert_eq!(released(), ["leaf", "root"]);
        assert_eq!(root_anchor.liveness(), Liveness::Released);
    }

    #[test]
    fn test_nested_borrows_balance() {
        let root = Resource::new("Root", "root", record, None).unwrap();
        let first = root.borrow().unwrap();
        let second = root.borrow().unwrap();
        assert_eq!(root.borrow_count(), 2);
        drop(first);
        assert_eq!(second.resource().borrow_count(), 1);
        drop(second);
        assert_eq!(root.borrow_count(), 0);
    }
}
