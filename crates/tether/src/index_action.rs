//! Indexing sessions and the objects handed to index callbacks.
//!
//! [`IndexAction::index_translation_unit`] walks a translation unit and
//! reports what it finds to an [`IndexHandler`]. Every callback runs in its
//! own scope: the wrappers passed to the handler ([`File`],
//! [`IncludedFile`], [`IndexDeclaration`], [`IndexEntityReference`],
//! [`Diagnostics`] and everything reachable from them) are owned by that
//! scope and stop working when the callback returns, even if the handler
//! keeps them. Copy out anything needed later (names, [`Location`]s), or
//! attach it to an entity with [`IndexEntity::set_client_data`] or to a
//! container with [`IndexContainer::set_client_data`].

use crate::callback::{self, CallbackToken, ClientObjects};
use crate::chain::Anchor;
use crate::cursor::{Cursor, CursorKind};
use crate::error::{Error, HandlerError, Result};
use crate::file::{File, Location, owned_string};
use crate::resource::Resource;
use crate::translation_unit::TranslationUnit;
use crate::traversal::{Traversal, TraversalState};
use std::any::Any;
use std::cell::Cell;
use std::ffi::{c_int, c_uint, c_void};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::ptr;
use std::rc::Rc;
use tether_log::debug;
use tether_native::*;

/// Result of an [`IndexHandler`] callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Result of [`IndexHandler::started_translation_unit`]: client data for the
/// translation unit's container, if any.
pub type ContainerResult = std::result::Result<Option<Rc<dyn Any>>, HandlerError>;

/// Options for [`IndexAction::index_translation_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexOptions(c_uint);

impl IndexOptions {
    pub const NONE: IndexOptions = IndexOptions(TX_INDEX_NONE);
    /// Do not report references to entities.
    pub const SUPPRESS_REFERENCES: IndexOptions = IndexOptions(TX_INDEX_SUPPRESS_REFERENCES);
    /// Do not report diagnostics.
    pub const SUPPRESS_WARNINGS: IndexOptions = IndexOptions(TX_INDEX_SUPPRESS_WARNINGS);

    #[must_use]
    pub fn bits(self) -> c_uint {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: IndexOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for IndexOptions {
    type Output = IndexOptions;

    fn bitor(self, rhs: IndexOptions) -> IndexOptions {
        IndexOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for IndexOptions {
    fn bitor_assign(&mut self, rhs: IndexOptions) {
        self.0 |= rhs.0;
    }
}

/// Receives indexing events.
///
/// Every method has a default that ignores the event. `state` is the object
/// passed to [`IndexAction::index_translation_unit`], if any.
///
/// Returning `Err` (or panicking) stops indexing: no further callbacks are
/// made and the error is returned, or the panic resumed, once the native
/// call has unwound.
pub trait IndexHandler {
    /// Polled between events; `true` stops indexing without an error.
    fn abort(&mut self, _state: Option<&dyn Any>) -> bool {
        false
    }

    /// The returned object becomes the client data of the container every
    /// top-level declaration reports as its semantic container.
    fn started_translation_unit(&mut self, _state: Option<&dyn Any>) -> ContainerResult {
        Ok(None)
    }

    fn entered_main_file(&mut self, _state: Option<&dyn Any>, _file: &File) -> HandlerResult {
        Ok(())
    }

    fn included_file(&mut self, _state: Option<&dyn Any>, _include: &IncludedFile) -> HandlerResult {
        Ok(())
    }

    fn declaration(&mut self, _state: Option<&dyn Any>, _declaration: &IndexDeclaration) -> HandlerResult {
        Ok(())
    }

    fn entity_reference(
        &mut self,
        _state: Option<&dyn Any>,
        _reference: &IndexEntityReference,
    ) -> HandlerResult {
        Ok(())
    }

    fn diagnostics(&mut self, _state: Option<&dyn Any>, _diagnostics: &Diagnostics) -> HandlerResult {
        Ok(())
    }
}

fn dispose_action(action: TxIndexAction) {
    unsafe { tx_index_action_dispose(action) };
}

const OPERATION: &str = "tx_index_translation_unit";

/// An indexing session, owned by its [`Index`](crate::Index).
pub struct IndexAction {
    handle: Resource<TxIndexAction>,
    state: Rc<Cell<TraversalState>>,
}

impl IndexAction {
    pub(crate) fn create(index: &Resource<TxIndex>) -> Result<Self> {
        let index_ref = index.borrow()?;
        let raw = unsafe { tx_index_action_create(index_ref.get()) };
        if raw.is_null() {
            return Err(Error::OutOfMemory);
        }
        Ok(IndexAction {
            handle: Resource::new("IndexAction", raw, dispose_action, Some(&index.anchor()))?,
            state: Rc::new(Cell::new(TraversalState::NotStarted)),
        })
    }

    /// Indexes `tu`, reporting to `handler`.
    ///
    /// Both this action and `tu` are borrowed for the whole call, so neither
    /// can be released by the handler. Client data attached to entities and
    /// containers lives until the call returns.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDisposed`] if the action, `tu` or their index is
    ///   disposed.
    /// - [`Error::Handler`] with the first error a handler method returned.
    /// - [`Error::NativeOperationFailed`] if the library failed, including
    ///   when this action is already indexing further up the stack.
    ///
    /// # Panics
    ///
    /// Resumes the first panic raised by a handler method, after native code
    /// has unwound and every callback object has been released.
    pub fn index_translation_unit<H: IndexHandler>(
        &self,
        tu: &TranslationUnit,
        options: IndexOptions,
        state: Option<Rc<dyn Any>>,
        handler: &mut H,
    ) -> Result<()> {
        let action = self.handle.borrow()?;
        let unit = tu.handle().borrow()?;

        // A nested call on a busy action is rejected natively; keep it from
        // clobbering the state of the call that is running.
        let traversal = match self.state.get() {
            TraversalState::Running | TraversalState::InCallback(_) => Traversal::new(OPERATION),
            _ => Traversal::observed(OPERATION, Rc::clone(&self.state)),
        };
        let clients = Rc::new(ClientObjects::new());
        let session = Rc::new(IndexSession {
            handler: handler as *mut H as *mut c_void,
            state,
            action: self.handle.anchor(),
            traversal,
            clients: Rc::clone(&clients),
        });
        let pinned = callback::pin(Rc::clone(&session));

        let callbacks = TxIndexerCallbacks {
            abort_query: Some(abort_query::<H>),
            diagnostic: Some(diagnostic::<H>),
            entered_main_file: Some(entered_main_file::<H>),
            pp_included_file: Some(included_file::<H>),
            started_translation_unit: Some(started_translation_unit::<H>),
            index_declaration: Some(declaration::<H>),
            index_entity_reference: Some(entity_reference::<H>),
        };

        debug!("indexing {} with options {:#x}", tu.filename(), options.bits());
        session.traversal.start();
        let code = unsafe {
            tx_index_translation_unit(
                action.get(),
                pinned.as_ptr(),
                &callbacks,
                std::mem::size_of::<TxIndexerCallbacks>() as c_uint,
                options.bits(),
                unit.get(),
            )
        };
        drop(pinned);
        clients.release_all();

        session.traversal.finish(Error::native(OPERATION, code))
    }

    /// State of the current or most recent indexing call.
    #[must_use]
    pub fn state(&self) -> TraversalState {
        self.state.get()
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

impl fmt::Debug for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexAction")
            .field("state", &self.state())
            .field("handle", &self.handle)
            .finish()
    }
}

struct IndexSession {
    /// `&mut H` of the running `index_translation_unit` call.
    handler: *mut c_void,
    state: Option<Rc<dyn Any>>,
    action: Anchor,
    traversal: Traversal,
    clients: Rc<ClientObjects>,
}

impl IndexSession {
    /// # Safety
    ///
    /// `H` must be the handler type this session was created with, and the
    /// result must not outlive the callback.
    unsafe fn handler<'h, H>(&self) -> &'h mut H {
        unsafe { &mut *(self.handler as *mut H) }
    }

    fn state(&self) -> Option<&dyn Any> {
        self.state.as_deref()
    }

    /// Runs a callback body inside a fresh scope owned by the action. The
    /// scope is closed when the body returns, invalidating every wrapper
    /// created under it.
    fn scoped(&self, body: impl FnOnce(&Anchor) -> Result<()>) {
        self.traversal.callback(|| {
            let scope = Resource::reference("IndexCallback", (), &self.action)?;
            body(&scope.anchor())
        });
    }
}

unsafe extern "C" fn abort_query<H: IndexHandler>(client_data: TxClientData, _reserved: *mut c_void) -> c_int {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    let abort = session.traversal.callback(|| {
        session.traversal.invoking_handler();
        Ok(unsafe { session.handler::<H>() }.abort(session.state()))
    });
    // A failed callback must stop the walk too.
    c_int::from(abort.unwrap_or(true))
}

unsafe extern "C" fn started_translation_unit<H: IndexHandler>(
    client_data: TxClientData,
    _reserved: *mut c_void,
) -> TxIdxClientContainer {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    let client = session.traversal.callback(|| {
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .started_translation_unit(session.state())
            .map_err(Error::Handler)
    });
    match client.flatten() {
        Some(data) => session.clients.track(data).as_ptr(),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn entered_main_file<H: IndexHandler>(
    client_data: TxClientData,
    file: TxFile,
    _reserved: *mut c_void,
) -> TxIdxClientFile {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    session.scoped(|scope| {
        let file = File::new(file, scope)?;
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .entered_main_file(session.state(), &file)
            .map_err(Error::Handler)
    });
    ptr::null_mut()
}

unsafe extern "C" fn included_file<H: IndexHandler>(
    client_data: TxClientData,
    info: *const TxIdxIncludedFileInfo,
) -> TxIdxClientFile {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    session.scoped(|scope| {
        let include = IncludedFile::new(info, scope)?;
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .included_file(session.state(), &include)
            .map_err(Error::Handler)
    });
    ptr::null_mut()
}

unsafe extern "C" fn declaration<H: IndexHandler>(client_data: TxClientData, info: *const TxIdxDeclInfo) {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    session.scoped(|scope| {
        let declaration = IndexDeclaration::new(info, scope, &session.clients)?;
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .declaration(session.state(), &declaration)
            .map_err(Error::Handler)
    });
}

unsafe extern "C" fn entity_reference<H: IndexHandler>(
    client_data: TxClientData,
    info: *const TxIdxEntityRefInfo,
) {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    session.scoped(|scope| {
        let reference = IndexEntityReference::new(info, scope, &session.clients)?;
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .entity_reference(session.state(), &reference)
            .map_err(Error::Handler)
    });
}

unsafe extern "C" fn diagnostic<H: IndexHandler>(
    client_data: TxClientData,
    set: TxDiagnosticSet,
    _reserved: *mut c_void,
) {
    let session = callback::resolve_ptr::<IndexSession>(client_data);
    session.scoped(|scope| {
        let diagnostics = Diagnostics::new(set, scope)?;
        session.traversal.invoking_handler();
        unsafe { session.handler::<H>() }
            .diagnostics(session.state(), &diagnostics)
            .map_err(Error::Handler)
    });
}

// ============================================================================
// Callback wrappers
// ============================================================================

/// An `#include` seen while indexing.
pub struct IncludedFile {
    handle: Resource<*const TxIdxIncludedFileInfo>,
}

impl IncludedFile {
    fn new(info: *const TxIdxIncludedFileInfo, scope: &Anchor) -> Result<Self> {
        Ok(IncludedFile {
            handle: Resource::reference("IncludedFile", info, scope)?,
        })
    }

    fn with_info<R>(&self, read: impl FnOnce(&TxIdxIncludedFileInfo) -> R) -> Result<R> {
        let info = self.handle.borrow()?;
        // SAFETY: the borrow proves the callback that received the info has
        // not returned yet.
        Ok(read(unsafe { &*info.get() }))
    }

    /// The name as written in the directive.
    pub fn filename(&self) -> Result<String> {
        self.with_info(|info| unsafe { owned_string(info.filename) })
    }

    /// Whether the name was written in angle brackets.
    pub fn is_angled(&self) -> Result<bool> {
        self.with_info(|info| info.is_angled != 0)
    }

    /// Location of the `#` that starts the directive.
    pub fn location(&self) -> Result<Location> {
        self.with_info(|info| unsafe { Location::from_native(info.hash_loc) })
    }

    /// The included file.
    pub fn file(&self) -> Result<File> {
        let file = self.with_info(|info| info.file)?;
        File::new(file, &self.handle.anchor())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for IncludedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludedFile").field("valid", &self.is_valid()).finish()
    }
}

/// A declaration seen while indexing.
pub struct IndexDeclaration {
    handle: Resource<*const TxIdxDeclInfo>,
    clients: Rc<ClientObjects>,
}

impl IndexDeclaration {
    fn new(info: *const TxIdxDeclInfo, scope: &Anchor, clients: &Rc<ClientObjects>) -> Result<Self> {
        Ok(IndexDeclaration {
            handle: Resource::reference("IndexDeclaration", info, scope)?,
            clients: Rc::clone(clients),
        })
    }

    fn with_info<R>(&self, read: impl FnOnce(&TxIdxDeclInfo) -> R) -> Result<R> {
        let info = self.handle.borrow()?;
        // SAFETY: valid until the callback returns, see `IncludedFile`.
        Ok(read(unsafe { &*info.get() }))
    }

    /// The declared entity.
    pub fn entity(&self) -> Result<IndexEntity> {
        let entity = self.with_info(|info| info.entity_info)?;
        IndexEntity::new(entity, &self.handle.anchor(), &self.clients)
    }

    /// Cursor at the declaration.
    pub fn cursor(&self) -> Result<Cursor> {
        let cursor = self.with_info(|info| info.cursor)?;
        Cursor::new(cursor, &self.handle.anchor())
    }

    pub fn location(&self) -> Result<Location> {
        self.with_info(|info| unsafe { Location::from_native(info.loc) })
    }

    pub fn is_definition(&self) -> Result<bool> {
        self.with_info(|info| info.is_definition != 0)
    }

    /// The scope the declaration belongs to: the enclosing struct or
    /// function, or the translation unit.
    pub fn semantic_container(&self) -> Result<IndexContainer> {
        let container = self.with_info(|info| info.semantic_container)?;
        IndexContainer::new(container, &self.handle.anchor(), &self.clients)
    }

    /// The scope the declaration is written in. The same as
    /// [`semantic_container`](Self::semantic_container) here, since nothing
    /// is declared out of line.
    pub fn lexical_container(&self) -> Result<IndexContainer> {
        let container = self.with_info(|info| info.lexical_container)?;
        IndexContainer::new(container, &self.handle.anchor(), &self.clients)
    }

    /// The container this declaration opens, for structs and functions.
    pub fn declaration_as_container(&self) -> Result<Option<IndexContainer>> {
        let container = self.with_info(|info| info.decl_as_container)?;
        if container.is_null() {
            return Ok(None);
        }
        IndexContainer::new(container, &self.handle.anchor(), &self.clients).map(Some)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for IndexDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDeclaration")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A reference to an entity seen while indexing.
pub struct IndexEntityReference {
    handle: Resource<*const TxIdxEntityRefInfo>,
    clients: Rc<ClientObjects>,
}

impl IndexEntityReference {
    fn new(info: *const TxIdxEntityRefInfo, scope: &Anchor, clients: &Rc<ClientObjects>) -> Result<Self> {
        Ok(IndexEntityReference {
            handle: Resource::reference("IndexEntityReference", info, scope)?,
            clients: Rc::clone(clients),
        })
    }

    fn with_info<R>(&self, read: impl FnOnce(&TxIdxEntityRefInfo) -> R) -> Result<R> {
        let info = self.handle.borrow()?;
        // SAFETY: valid until the callback returns, see `IncludedFile`.
        Ok(read(unsafe { &*info.get() }))
    }

    /// The entity being referred to.
    pub fn referenced_entity(&self) -> Result<IndexEntity> {
        let entity = self.with_info(|info| info.referenced_entity)?;
        IndexEntity::new(entity, &self.handle.anchor(), &self.clients)
    }

    pub fn cursor(&self) -> Result<Cursor> {
        let cursor = self.with_info(|info| info.cursor)?;
        Cursor::new(cursor, &self.handle.anchor())
    }

    pub fn location(&self) -> Result<Location> {
        self.with_info(|info| unsafe { Location::from_native(info.loc) })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for IndexEntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexEntityReference")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// An entity (function, struct, field, variable) known to the indexer.
///
/// The same entity is reported to every declaration of and reference to it,
/// so client data attached in one callback is visible in later ones.
pub struct IndexEntity {
    handle: Resource<*const TxIdxEntityInfo>,
    clients: Rc<ClientObjects>,
}

impl IndexEntity {
    fn new(info: *const TxIdxEntityInfo, owner: &Anchor, clients: &Rc<ClientObjects>) -> Result<Self> {
        Ok(IndexEntity {
            handle: Resource::reference("IndexEntity", info, owner)?,
            clients: Rc::clone(clients),
        })
    }

    fn with_info<R>(&self, read: impl FnOnce(*const TxIdxEntityInfo) -> R) -> Result<R> {
        let info = self.handle.borrow()?;
        Ok(read(info.get()))
    }

    pub fn name(&self) -> Result<String> {
        self.with_info(|info| unsafe { owned_string((*info).name) })
    }

    /// Unified symbol resolution string, e.g. `c:@F@main`. Empty for
    /// entities only ever referenced.
    pub fn usr(&self) -> Result<String> {
        self.with_info(|info| unsafe { owned_string((*info).usr) })
    }

    pub fn kind(&self) -> Result<CursorKind> {
        self.with_info(|info| CursorKind::from_raw(unsafe { (*info).kind }))
    }

    /// Attaches `data` to this entity for the rest of the indexing call.
    pub fn set_client_data(&self, data: Rc<dyn Any>) -> Result<()> {
        let info = self.handle.borrow()?;
        let token = self.clients.track(data);
        unsafe { tx_index_set_client_entity(info.get(), token.as_ptr()) };
        Ok(())
    }

    /// Data attached with [`set_client_data`](Self::set_client_data).
    pub fn client_data(&self) -> Result<Option<Rc<dyn Any>>> {
        let raw = self.with_info(|info| unsafe { tx_index_get_client_entity(info) })?;
        Ok(CallbackToken::from_ptr(raw).map(callback::resolve_any))
    }

    /// Like [`client_data`](Self::client_data), downcast to `T`. `None` if
    /// nothing is attached or it is not a `T`.
    pub fn client_data_as<T: Any>(&self) -> Result<Option<Rc<T>>> {
        Ok(self.client_data()?.and_then(|data| data.downcast::<T>().ok()))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for IndexEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("IndexEntity");
        if let Ok(name) = self.name() {
            out.field("name", &name);
        }
        out.field("valid", &self.is_valid()).finish()
    }
}

/// A scope that declarations live in.
///
/// Like entities, containers are shared by every declaration inside them,
/// so client data attached from one declaration is seen by the rest.
pub struct IndexContainer {
    handle: Resource<*const TxIdxContainerInfo>,
    clients: Rc<ClientObjects>,
}

impl IndexContainer {
    fn new(info: *const TxIdxContainerInfo, owner: &Anchor, clients: &Rc<ClientObjects>) -> Result<Self> {
        Ok(IndexContainer {
            handle: Resource::reference("IndexContainer", info, owner)?,
            clients: Rc::clone(clients),
        })
    }

    /// Cursor at the struct, function or translation unit.
    pub fn cursor(&self) -> Result<Cursor> {
        let info = self.handle.borrow()?;
        // SAFETY: container infos live until indexing returns, and the borrow
        // proves the callback has not.
        let cursor = unsafe { (*info.get()).cursor };
        Cursor::new(cursor, &self.handle.anchor())
    }

    /// Attaches `data` to this container for the rest of the indexing call.
    pub fn set_client_data(&self, data: Rc<dyn Any>) -> Result<()> {
        let info = self.handle.borrow()?;
        let token = self.clients.track(data);
        unsafe { tx_index_set_client_container(info.get(), token.as_ptr()) };
        Ok(())
    }

    pub fn client_data(&self) -> Result<Option<Rc<dyn Any>>> {
        let info = self.handle.borrow()?;
        let raw = unsafe { tx_index_get_client_container(info.get()) };
        Ok(CallbackToken::from_ptr(raw).map(callback::resolve_any))
    }

    /// Like [`client_data`](Self::client_data), downcast to `T`.
    pub fn client_data_as<T: Any>(&self) -> Result<Option<Rc<T>>> {
        Ok(self.client_data()?.and_then(|data| data.downcast::<T>().ok()))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for IndexContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexContainer")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Diagnostics reported at the end of indexing.
pub struct Diagnostics {
    handle: Resource<TxDiagnosticSet>,
}

impl Diagnostics {
    fn new(set: TxDiagnosticSet, scope: &Anchor) -> Result<Self> {
        Ok(Diagnostics {
            handle: Resource::reference("Diagnostics", set, scope)?,
        })
    }

    pub fn len(&self) -> Result<usize> {
        let set = self.handle.borrow()?;
        Ok(unsafe { tx_diagnostic_set_count(set.get()) } as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn message(&self, index: usize) -> Result<String> {
        let len = self.len()?;
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let set = self.handle.borrow()?;
        Ok(unsafe { owned_string(tx_diagnostic_set_message(set.get(), index as c_uint)) })
    }

    /// Every message, copied out.
    pub fn messages(&self) -> Result<Vec<String>> {
        (0..self.len()?).map(|index| self.message(index)).collect()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("valid", &self.handle.is_usable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_options_combine() {
        let options = IndexOptions::SUPPRESS_REFERENCES | IndexOptions::SUPPRESS_WARNINGS;
        assert_eq!(options.bits(), 0x3);
        assert!(options.contains(IndexOptions::SUPPRESS_WARNINGS));
        assert!(!IndexOptions::NONE.contains(IndexOptions::SUPPRESS_REFERENCES));

        let mut options = IndexOptions::default();
        options |= IndexOptions::SUPPRESS_REFERENCES;
        assert_eq!(options, IndexOptions::SUPPRESS_REFERENCES);
    }

    #[test]
    fn test_default_handler_ignores_everything() {
        struct Quiet;
        impl IndexHandler for Quiet {}

        let mut handler = Quiet;
        assert!(!handler.abort(None));
        assert!(matches!(handler.started_translation_unit(None), Ok(None)));
    }
}
