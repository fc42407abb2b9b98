//! Cursors and child visitation.

use crate::callback;
use crate::chain::Anchor;
use crate::error::{Error, HandlerError, NativeErrorCode, Result};
use crate::file::{Location, SourceRange, owned_string};
use crate::resource::Resource;
use crate::translation_unit::c_string;
use crate::traversal::Traversal;
use std::ffi::{c_int, c_void};
use std::fmt;
use std::rc::Rc;
use tether_native::*;

/// What a cursor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    Invalid,
    TranslationUnit,
    Function,
    Struct,
    Field,
    Variable,
    Reference,
}

impl CursorKind {
    #[must_use]
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            TX_CURSOR_TRANSLATION_UNIT => CursorKind::TranslationUnit,
            TX_CURSOR_FUNCTION => CursorKind::Function,
            TX_CURSOR_STRUCT => CursorKind::Struct,
            TX_CURSOR_FIELD => CursorKind::Field,
            TX_CURSOR_VARIABLE => CursorKind::Variable,
            TX_CURSOR_REFERENCE => CursorKind::Reference,
            _ => CursorKind::Invalid,
        }
    }

    /// Whether this kind names a declaration.
    #[must_use]
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            CursorKind::Function | CursorKind::Struct | CursorKind::Field | CursorKind::Variable
        )
    }
}

/// Visitor reply for [`Cursor::visit_children`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildVisit {
    /// Stop the whole traversal.
    Break,
    /// Move on to the next sibling.
    Continue,
    /// Visit this cursor's children before its next sibling.
    Recurse,
}

impl ChildVisit {
    fn raw(self) -> c_int {
        match self {
            ChildVisit::Break => TX_VISIT_BREAK,
            ChildVisit::Continue => TX_VISIT_CONTINUE,
            ChildVisit::Recurse => TX_VISIT_RECURSE,
        }
    }
}

/// Visitor reply for [`Cursor::find_references_in_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceVisit {
    Break,
    Continue,
}

impl ReferenceVisit {
    fn raw(self) -> c_int {
        match self {
            ReferenceVisit::Break => TX_VISIT_BREAK,
            ReferenceVisit::Continue => TX_VISIT_CONTINUE,
        }
    }
}

/// A position in a translation unit's syntax tree.
pub struct Cursor {
    handle: Resource<TxCursor>,
    owner: Anchor,
}

impl Cursor {
    pub(crate) fn new(cursor: TxCursor, owner: &Anchor) -> Result<Self> {
        Ok(Cursor {
            handle: Resource::reference("Cursor", cursor, owner)?,
            owner: owner.clone(),
        })
    }

    pub fn kind(&self) -> Result<CursorKind> {
        let cursor = self.handle.borrow()?;
        Ok(CursorKind::from_raw(unsafe { tx_cursor_kind(cursor.get()) }))
    }

    pub fn spelling(&self) -> Result<String> {
        let cursor = self.handle.borrow()?;
        // SAFETY: the borrow keeps the translation unit alive, and the
        // returned string is owned by it.
        Ok(unsafe { owned_string(tx_cursor_spelling(cursor.get())) })
    }

    pub fn location(&self) -> Result<Location> {
        let cursor = self.handle.borrow()?;
        Ok(unsafe { Location::from_native(tx_cursor_location(cursor.get())) })
    }

    /// Visits this cursor's children in source order.
    ///
    /// `visitor` receives each child and its parent and decides whether to
    /// recurse, continue or stop. Child cursors share this cursor's owner,
    /// so they stay usable after the visit. Returns `true` if the visitor
    /// stopped the traversal.
    ///
    /// # Errors
    ///
    /// The first error returned by `visitor` (wrapped in
    /// [`Error::Handler`]) stops the traversal and is returned once it has
    /// unwound. A panic in `visitor` is resumed the same way.
    pub fn visit_children<F>(&self, mut visitor: F) -> Result<bool>
    where
        F: FnMut(&Cursor, &Cursor) -> std::result::Result<ChildVisit, HandlerError>,
    {
        let cursor = self.handle.borrow()?;
        let session = Rc::new(VisitSession {
            visitor: &mut visitor as *mut F as *mut c_void,
            owner: self.owner.clone(),
            traversal: Traversal::new("tx_visit_children"),
        });
        let pinned = callback::pin(Rc::clone(&session));

        session.traversal.start();
        let broke = unsafe { tx_visit_children(cursor.get(), visit_child::<F>, pinned.as_ptr()) };
        drop(pinned);

        session.traversal.finish(Ok(()))?;
        Ok(broke != 0)
    }

    /// Visits every declaration of and reference to this cursor's entity in
    /// `filename`, with the range of the name at each one. Found cursors
    /// share this cursor's owner. Returns `true` if the visitor stopped early.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `filename` is not part of the unit.
    /// - [`Error::NativeOperationFailed`] if this cursor names no entity.
    /// - [`Error::Handler`] with the first error `visitor` returned. Panics
    ///   are resumed after the native call has returned.
    pub fn find_references_in_file<F>(&self, filename: &str, mut visitor: F) -> Result<bool>
    where
        F: FnMut(&Cursor, &SourceRange) -> std::result::Result<ReferenceVisit, HandlerError>,
    {
        let c_filename = c_string("filename", filename)?;
        let cursor = self.handle.borrow()?;
        let file = unsafe { tx_get_file(cursor.get().tu, c_filename.as_ptr()) };
        if file.is_null() {
            return Err(Error::InvalidArgument {
                name: "filename",
                reason: format!("{filename} is not part of the translation unit"),
            });
        }

        let session = Rc::new(ReferenceSession {
            visitor: &mut visitor as *mut F as *mut c_void,
            owner: self.owner.clone(),
            traversal: Traversal::new(FIND_REFERENCES),
        });
        let pinned = callback::pin(Rc::clone(&session));
        let native_visitor = TxCursorAndRangeVisitor {
            context: pinned.as_ptr(),
            visit: Some(visit_reference::<F>),
        };

        session.traversal.start();
        let code = unsafe { tx_find_references_in_file(cursor.get(), file, native_visitor) };
        drop(pinned);

        let native = match code {
            TX_FIND_SUCCESS | TX_FIND_VISIT_BREAK => Ok(()),
            _ => Err(Error::NativeOperationFailed {
                operation: FIND_REFERENCES,
                code: NativeErrorCode::InvalidArguments,
            }),
        };
        session.traversal.finish(native)?;
        Ok(code == TX_FIND_VISIT_BREAK)
    }

    /// Whether the cursor can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Cursor");
        if let Ok(kind) = self.kind() {
            out.field("kind", &kind);
        }
        if let Ok(spelling) = self.spelling() {
            out.field("spelling", &spelling);
        }
        out.field("valid", &self.is_valid()).finish()
    }
}

struct VisitSession {
    /// `&mut F` of the running `visit_children` call.
    visitor: *mut c_void,
    owner: Anchor,
    traversal: Traversal,
}

unsafe extern "C" fn visit_child<F>(cursor: TxCursor, parent: TxCursor, client_data: TxClientData) -> c_int
where
    F: FnMut(&Cursor, &Cursor) -> std::result::Result<ChildVisit, HandlerError>,
{
    let session = callback::resolve_ptr::<VisitSession>(client_data);
    let visit = session.traversal.callback(|| {
        let cursor = Cursor::new(cursor, &session.owner)?;
        let parent = Cursor::new(parent, &session.owner)?;
        session.traversal.invoking_handler();
        // SAFETY: `visit_children` is blocked in the native call and holds no
        // other reference to the visitor.
        let visitor = unsafe { &mut *(session.visitor as *mut F) };
        visitor(&cursor, &parent).map_err(Error::Handler)
    });
    visit.unwrap_or(ChildVisit::Break).raw()
}

const FIND_REFERENCES: &str = "tx_find_references_in_file";

struct ReferenceSession {
    /// `&mut F` of the running `find_references_in_file` call.
    visitor: *mut c_void,
    owner: Anchor,
    traversal: Traversal,
}

unsafe extern "C" fn visit_reference<F>(context: TxClientData, cursor: TxCursor, range: TxSourceRange) -> c_int
where
    F: FnMut(&Cursor, &SourceRange) -> std::result::Result<ReferenceVisit, HandlerError>,
{
    let session = callback::resolve_ptr::<ReferenceSession>(context);
    let visit = session.traversal.callback(|| {
        let cursor = Cursor::new(cursor, &session.owner)?;
        let range = unsafe { SourceRange::from_native(range) };
        session.traversal.invoking_handler();
        // SAFETY: `find_references_in_file` is blocked in the native call.
        let visitor = unsafe { &mut *(session.visitor as *mut F) };
        visitor(&cursor, &range).map_err(Error::Handler)
    });
    visit.unwrap_or(ReferenceVisit::Break).raw()
}
