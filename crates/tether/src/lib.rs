//! `tether`: lifetime-safe handles for a callback-driven native index library.
//!
//! Native libraries hand out raw handles whose validity depends on other
//! handles (a token buffer dies with its translation unit, which dies with
//! its index) and report results through synchronous callbacks that carry a
//! single opaque pointer. `tether` makes both safe:
//!
//! - **Ownership chains**: every [`Resource`] may name an owner. An owner is
//!   never released while anything it owns is still alive, however the
//!   handles are dropped, and release cascades up the chain iteratively.
//! - **Scoped borrows**: a [`Borrow`] pins a resource and every ancestor for
//!   the duration of a native call. Disposal requested meanwhile is either a
//!   contract violation (explicit) or deferred (drop).
//! - **Callback tokens**: [`callback::pin`] turns a shared object into an
//!   opaque pointer-sized token that native code can carry through a
//!   callback and that resolves back to the object on the other side.
//! - **Fault-safe traversals**: callbacks never unwind into native code.
//!   Handler errors and panics are captured, the traversal is stopped, and
//!   the fault surfaces after the native call returns.
//!
//! The wrappers ([`Index`], [`TranslationUnit`], [`Cursor`], [`TokenSet`],
//! [`CompletionResults`], [`IndexAction`], ...) are built on those pieces over the `tether-native`
//! engine.
//!
//! # Example
//!
//! ```rust
//! use tether::{ChildVisit, Index};
//!
//! let index = Index::new().unwrap();
//! let tu = index.parse("shapes.c", "struct Point\n  field x\n  field y\n").unwrap();
//!
//! let mut names = Vec::new();
//! tu.cursor()
//!     .unwrap()
//!     .visit_children(|cursor, _parent| {
//!         names.push(cursor.spelling()?);
//!         Ok(ChildVisit::Recurse)
//!     })
//!     .unwrap();
//! assert_eq!(names, ["Point", "x", "y"]);
//! ```
//!
//! # Threading
//!
//! Everything here is single-threaded: handles are `!Send` and callback
//! tokens are per thread. Native calls are synchronous and callbacks run on
//! the calling thread.

mod borrow;
pub mod callback;
mod chain;
mod completion;
mod cursor;
pub mod error;
mod file;
mod index;
mod index_action;
mod resource;
mod token;
mod translation_unit;
mod traversal;

pub use borrow::Borrow;
pub use callback::{CallbackToken, ClientObjects, Pinned};
pub use chain::{Anchor, Liveness};
pub use completion::{
    CompletionChunk, CompletionChunkKind, CompletionOptions, CompletionResult, CompletionResults,
    CompletionString,
};
pub use cursor::{ChildVisit, Cursor, CursorKind, ReferenceVisit};
pub use error::{Error, HandlerError, NativeErrorCode, Result};
pub use file::{File, Location, SourceRange};
pub use index::Index;
pub use index_action::{
    ContainerResult, Diagnostics, HandlerResult, IncludedFile, IndexAction, IndexContainer,
    IndexDeclaration, IndexEntity, IndexEntityReference, IndexHandler, IndexOptions,
};
pub use resource::Resource;
pub use token::{Token, TokenKind, TokenSet};
pub use translation_unit::TranslationUnit;
pub use traversal::{CallbackPhase, TraversalState};

/// Configures logging from the `TETHER_LOG` environment variable.
///
/// Call once at startup; without it only warnings and errors are printed.
pub fn init_logging() -> tether_log::Level {
    tether_log::init_from_env()
}
