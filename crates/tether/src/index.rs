//! The root of every ownership chain.

use crate::chain::Anchor;
use crate::error::{Error, Result};
use crate::index_action::IndexAction;
use crate::resource::Resource;
use crate::translation_unit::TranslationUnit;
use std::ffi::c_int;
use std::fmt;
use tether_log::debug;
use tether_native::{TxIndex, tx_create_index, tx_dispose_index, tx_index_excludes_declarations_from_pch};

fn dispose_index(index: TxIndex) {
    unsafe { tx_dispose_index(index) };
}

/// A set of translation units and indexing sessions.
///
/// Dropping or disposing the index does not invalidate native memory that
/// is still in use: the native index is released only after every
/// translation unit and index action created from it.
///
/// # Example
///
/// ```rust
/// use tether::Index;
///
/// let index = Index::new().unwrap();
/// let tu = index.parse("main.c", "fn main\n").unwrap();
///
/// index.dispose();
/// assert!(tu.cursor().is_err());
/// ```
pub struct Index {
    handle: Resource<TxIndex>,
}

impl Index {
    /// Creates an index.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the native library could not create one.
    pub fn new() -> Result<Self> {
        Self::with_options(false)
    }

    /// Creates an index with the "exclude declarations from precompiled
    /// headers" flag set as given.
    ///
    /// The engine has no precompiled headers, so the flag is only stored and
    /// reported back by
    /// [`excludes_declarations_from_pch`](Self::excludes_declarations_from_pch).
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the native library could not create one.
    pub fn with_options(exclude_declarations_from_pch: bool) -> Result<Self> {
        let raw = unsafe { tx_create_index(c_int::from(exclude_declarations_from_pch)) };
        if raw.is_null() {
            return Err(Error::OutOfMemory);
        }
        debug!("created index");
        Ok(Index {
            handle: Resource::new("Index", raw, dispose_index, None)?,
        })
    }

    /// The flag passed to [`with_options`](Self::with_options).
    ///
    /// # Errors
    ///
    /// [`Error::ObjectDisposed`] once the index is disposed.
    pub fn excludes_declarations_from_pch(&self) -> Result<bool> {
        let raw = self.handle.borrow()?;
        Ok(unsafe { tx_index_excludes_declarations_from_pch(raw.get()) } != 0)
    }

    /// Parses `source` as the contents of `filename`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if either string contains a NUL byte,
    /// [`Error::NativeOperationFailed`] if the library rejects the input.
    pub fn parse(&self, filename: &str, source: &str) -> Result<TranslationUnit> {
        TranslationUnit::parse(&self.handle, filename, source)
    }

    /// Creates an indexing session that can index translation units.
    pub fn create_action(&self) -> Result<IndexAction> {
        IndexAction::create(&self.handle)
    }

    /// See [`Resource::dispose`].
    #[track_caller]
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    /// See [`Resource::try_dispose`].
    pub fn try_dispose(&self) -> Result<()> {
        self.handle.try_dispose()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    #[must_use]
    pub fn anchor(&self) -> Anchor {
        self.handle.anchor()
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index").field("handle", &self.handle).finish()
    }
}
