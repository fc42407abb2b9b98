//! The exported C ABI.
//!
//! Every function follows the conventions of a C library: handles come in as
//! raw pointers, results go out through return values or out-parameters, and
//! misuse that a real library would turn into memory corruption (double
//! dispose, disposing a parent with live children, touching a stale handle)
//! aborts the process instead.

use crate::abi::*;
use crate::model::Model;
use crate::{check, fatal, track, untrack};
use fxhash::FxHashMap;
use std::cell::Cell;
use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_void};
use std::ptr;

const KIND_INDEX: &str = "Index";
const KIND_TRANSLATION_UNIT: &str = "TranslationUnit";
const KIND_TOKEN_BUFFER: &str = "TokenBuffer";
const KIND_INDEX_ACTION: &str = "IndexAction";
const KIND_DIAGNOSTIC_SET: &str = "DiagnosticSet";
const KIND_ENTITY: &str = "IndexEntity";
const KIND_CONTAINER: &str = "IndexContainer";
const KIND_COMPLETE_RESULTS: &str = "CodeCompleteResults";
const KIND_COMPLETION_STRING: &str = "CompletionString";

struct IndexData {
    exclude_declarations: bool,
    children: Cell<usize>,
}

struct TranslationUnitData {
    index: *const IndexData,
    model: Model,
    token_buffers: Cell<usize>,
    completions: Cell<usize>,
}

struct IndexActionData {
    index: *const IndexData,
    running: Cell<bool>,
}

#[repr(C)]
struct EntityRecord {
    info: TxIdxEntityInfo,
    client: Cell<TxIdxClientEntity>,
}

#[repr(C)]
struct ContainerRecord {
    info: TxIdxContainerInfo,
    client: Cell<TxIdxClientContainer>,
}

struct CompletionStringData {
    chunks: Vec<(c_int, CString)>,
}

impl CompletionStringData {
    /// Typed text first appears after any informative prefix.
    fn typed_text(&self) -> &[u8] {
        self.chunks
            .iter()
            .find(|(kind, _)| *kind == TX_CHUNK_TYPED_TEXT)
            .map_or(&[][..], |(_, text)| text.as_bytes())
    }
}

/// `results` is first so the public pointer is the allocation.
#[repr(C)]
struct CompleteResultsData {
    results: TxCodeCompleteResults,
    tu: *const TranslationUnitData,
    entries: Vec<TxCompletionResult>,
    strings: Vec<Box<CompletionStringData>>,
}

unsafe fn index_ref<'a>(index: TxIndex) -> &'a IndexData {
    check(index as *const c_void, KIND_INDEX);
    // SAFETY: `check` proved the pointer came from `tx_create_index` and has
    // not been disposed.
    unsafe { &*(index as *const IndexData) }
}

unsafe fn unit_ref<'a>(tu: TxTranslationUnit) -> &'a TranslationUnitData {
    check(tu as *const c_void, KIND_TRANSLATION_UNIT);
    // SAFETY: live translation unit pointer, see `check`.
    unsafe { &*(tu as *const TranslationUnitData) }
}

unsafe fn action_ref<'a>(action: TxIndexAction) -> &'a IndexActionData {
    check(action as *const c_void, KIND_INDEX_ACTION);
    // SAFETY: live index action pointer, see `check`.
    unsafe { &*(action as *const IndexActionData) }
}

unsafe fn container_ref<'a>(info: *const TxIdxContainerInfo) -> &'a ContainerRecord {
    check(info as *const c_void, KIND_CONTAINER);
    // SAFETY: as for entities, the info is the first field of a live record.
    unsafe { &*(info as *const ContainerRecord) }
}

unsafe fn string_ref<'a>(string: TxCompletionString) -> &'a CompletionStringData {
    check(string as *const c_void, KIND_COMPLETION_STRING);
    // SAFETY: live strings are boxed and owned by live completion results.
    unsafe { &*(string as *const CompletionStringData) }
}

unsafe fn entity_ref<'a>(info: *const TxIdxEntityInfo) -> &'a EntityRecord {
    check(info as *const c_void, KIND_ENTITY);
    // SAFETY: entity infos handed out by the indexer are the first field of a
    // live `EntityRecord` (`repr(C)`).
    unsafe { &*(info as *const EntityRecord) }
}

fn release_child(index: *const IndexData) {
    // SAFETY: children keep their index alive; disposing an index with
    // children aborts in `tx_dispose_index`.
    let index = unsafe { &*index };
    index.children.set(index.children.get() - 1);
}

// ============================================================================
// Index
// ============================================================================

/// Creates an index. Returns null only if allocation fails.
pub unsafe extern "C" fn tx_create_index(exclude_declarations_from_pch: c_int) -> TxIndex {
    let data = Box::new(IndexData {
        exclude_declarations: exclude_declarations_from_pch != 0,
        children: Cell::new(0),
    });
    let ptr = Box::into_raw(data);
    track(ptr as *const c_void, KIND_INDEX);
    ptr as TxIndex
}

/// Returns the flag the index was created with. The engine never loads
/// precompiled headers, so the flag is recorded but changes no output.
pub unsafe extern "C" fn tx_index_excludes_declarations_from_pch(index: TxIndex) -> c_int {
    c_int::from(unsafe { index_ref(index) }.exclude_declarations)
}

pub unsafe extern "C" fn tx_dispose_index(index: TxIndex) {
    if index.is_null() {
        return;
    }
    let data = unsafe { index_ref(index) };
    if data.children.get() != 0 {
        fatal(&format!(
            "index {index:p} disposed with {} live translation units or actions",
            data.children.get()
        ));
    }
    untrack(index as *const c_void, KIND_INDEX);
    // SAFETY: pointer came from Box::into_raw in tx_create_index and was just
    // removed from the live set, so this is the only release.
    drop(unsafe { Box::from_raw(index as *mut IndexData) });
}

// ============================================================================
// Translation units
// ============================================================================

/// Parses `source` as the contents of `filename`.
///
/// # Safety
///
/// `filename` and `source` must be null or valid NUL-terminated strings and
/// `out` must be valid for a pointer write.
pub unsafe extern "C" fn tx_parse_translation_unit(
    index: TxIndex,
    filename: *const c_char,
    source: *const c_char,
    out: *mut TxTranslationUnit,
) -> c_int {
    if index.is_null() || filename.is_null() || out.is_null() {
        return TX_ERROR_INVALID_ARGUMENTS;
    }
    let index_data = unsafe { index_ref(index) };

    // SAFETY: caller contract, both are NUL-terminated.
    let filename = unsafe { CStr::from_ptr(filename) };
    let Ok(filename) = filename.to_str() else {
        return TX_ERROR_INVALID_ARGUMENTS;
    };
    if filename.is_empty() {
        return TX_ERROR_INVALID_ARGUMENTS;
    }
    if source.is_null() {
        return TX_ERROR_FAILURE;
    }
    let Ok(source) = (unsafe { CStr::from_ptr(source) }).to_str() else {
        return TX_ERROR_AST_READ_ERROR;
    };

    let data = Box::new(TranslationUnitData {
        index: index_data as *const IndexData,
        model: Model::parse(filename, source),
        token_buffers: Cell::new(0),
        completions: Cell::new(0),
    });
    index_data.children.set(index_data.children.get() + 1);

    let ptr = Box::into_raw(data);
    track(ptr as *const c_void, KIND_TRANSLATION_UNIT);
    // SAFETY: `out` checked non-null above.
    unsafe { *out = ptr as TxTranslationUnit };
    TX_ERROR_SUCCESS
}

pub unsafe extern "C" fn tx_dispose_translation_unit(tu: TxTranslationUnit) {
    if tu.is_null() {
        return;
    }
    let data = unsafe { unit_ref(tu) };
    if data.token_buffers.get() != 0 {
        fatal(&format!(
            "translation unit {tu:p} disposed with {} live token buffers",
            data.token_buffers.get()
        ));
    }
    if data.completions.get() != 0 {
        fatal(&format!(
            "translation unit {tu:p} disposed with {} live completion results",
            data.completions.get()
        ));
    }
    untrack(tu as *const c_void, KIND_TRANSLATION_UNIT);
    // SAFETY: unique release of a Box::into_raw pointer.
    let data = unsafe { Box::from_raw(tu as *mut TranslationUnitData) };
    release_child(data.index);
}

// ============================================================================
// Cursors
// ============================================================================

pub unsafe extern "C" fn tx_get_translation_unit_cursor(tu: TxTranslationUnit) -> TxCursor {
    let _ = unsafe { unit_ref(tu) };
    TxCursor {
        kind: TX_CURSOR_TRANSLATION_UNIT,
        node: 0,
        tu,
    }
}

pub unsafe extern "C" fn tx_cursor_kind(cursor: TxCursor) -> c_int {
    cursor.kind
}

/// Returns the cursor's name. The string is owned by the translation unit.
pub unsafe extern "C" fn tx_cursor_spelling(cursor: TxCursor) -> *const c_char {
    let data = unsafe { unit_ref(cursor.tu) };
    match data.model.nodes.get(cursor.node as usize) {
        Some(node) => node.name.as_ptr(),
        None => ptr::null(),
    }
}

pub unsafe extern "C" fn tx_cursor_location(cursor: TxCursor) -> TxSourceLocation {
    let data = unsafe { unit_ref(cursor.tu) };
    match data.model.nodes.get(cursor.node as usize) {
        Some(node) => data.model.location(node.line, node.column),
        None => data.model.location(0, 0),
    }
}

/// Visits the children of `cursor`. Returns non-zero if the visitor broke
/// out of the traversal.
///
/// # Safety
///
/// `visitor` is called synchronously with `client_data` and may re-enter any
/// function of this library except disposing the translation unit.
pub unsafe extern "C" fn tx_visit_children(
    cursor: TxCursor,
    visitor: TxCursorVisitor,
    client_data: TxClientData,
) -> c_uint {
    let data = unsafe { unit_ref(cursor.tu) };
    if cursor.node as usize >= data.model.nodes.len() {
        return 0;
    }
    let broke = unsafe { visit_node(&data.model, cursor, visitor, client_data) };
    c_uint::from(broke)
}

unsafe fn visit_node(
    model: &Model,
    parent: TxCursor,
    visitor: TxCursorVisitor,
    client_data: TxClientData,
) -> bool {
    for &child in &model.nodes[parent.node as usize].children {
        let cursor = TxCursor {
            kind: model.nodes[child as usize].kind,
            node: child,
            tu: parent.tu,
        };
        match unsafe { visitor(cursor, parent, client_data) } {
            TX_VISIT_BREAK => return true,
            TX_VISIT_RECURSE => {
                if unsafe { visit_node(model, cursor, visitor, client_data) } {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Returns the file of `tu` called `name`, or null if there is none.
pub unsafe extern "C" fn tx_get_file(tu: TxTranslationUnit, name: *const c_char) -> TxFile {
    let data = unsafe { unit_ref(tu) };
    if name.is_null() {
        return ptr::null();
    }
    let name = unsafe { CStr::from_ptr(name) };
    match data.model.files.iter().position(|f| f.name.as_c_str() == name) {
        Some(index) => data.model.file_ptr(index),
        None => ptr::null(),
    }
}

/// Reports every declaration of and reference to the entity under `cursor`
/// that lies in `file`, in source order.
///
/// Returns `TX_FIND_INVALID` for a null file or visitor or a cursor that
/// names no entity, and `TX_FIND_VISIT_BREAK` if the visitor stopped early.
///
/// # Safety
///
/// `visitor.visit` is called synchronously with `visitor.context` and may
/// re-enter any function of this library except disposing the translation
/// unit.
pub unsafe extern "C" fn tx_find_references_in_file(
    cursor: TxCursor,
    file: TxFile,
    visitor: TxCursorAndRangeVisitor,
) -> c_int {
    let data = unsafe { unit_ref(cursor.tu) };
    let model = &data.model;
    let Some(visit) = visitor.visit else {
        return TX_FIND_INVALID;
    };
    if file.is_null() || cursor.node == 0 {
        return TX_FIND_INVALID;
    }
    let Some(target) = model.nodes.get(cursor.node as usize) else {
        return TX_FIND_INVALID;
    };
    // Only the main file has a syntax tree.
    if file != model.file_ptr(0) {
        return TX_FIND_SUCCESS;
    }

    for id in model.preorder() {
        let node = &model.nodes[id as usize];
        if node.name != target.name {
            continue;
        }
        let found = TxCursor {
            kind: node.kind,
            node: id,
            tu: cursor.tu,
        };
        let length = node.name.as_bytes().len() as u32;
        let range = TxSourceRange {
            start: model.location(node.line, node.name_column),
            end: model.location(node.line, node.name_column + length),
        };
        if unsafe { visit(visitor.context, found, range) } == TX_VISIT_BREAK {
            return TX_FIND_VISIT_BREAK;
        }
    }
    TX_FIND_SUCCESS
}

// ============================================================================
// Code completion
// ============================================================================

fn completion_chunks(kind: c_int, name: &CString) -> Vec<(c_int, CString)> {
    let mut chunks = Vec::with_capacity(3);
    if kind == TX_CURSOR_STRUCT {
        chunks.push((TX_CHUNK_INFORMATIVE, c"struct".to_owned()));
    }
    chunks.push((TX_CHUNK_TYPED_TEXT, name.clone()));
    if kind == TX_CURSOR_FUNCTION {
        chunks.push((TX_CHUNK_LEFT_PAREN, c"(".to_owned()));
        chunks.push((TX_CHUNK_RIGHT_PAREN, c")".to_owned()));
    }
    chunks
}

/// Completes the identifier that ends just before `line`:`column` of
/// `filename` against every declaration in the unit.
///
/// Returns null if `filename` is not the unit's main file or the position is
/// outside it. The results must be released with
/// `tx_dispose_code_complete_results` before the translation unit.
pub unsafe extern "C" fn tx_code_complete_at(
    tu: TxTranslationUnit,
    filename: *const c_char,
    line: c_uint,
    column: c_uint,
    options: c_uint,
) -> *mut TxCodeCompleteResults {
    let data = unsafe { unit_ref(tu) };
    let model = &data.model;
    if filename.is_null() || unsafe { CStr::from_ptr(filename) } != model.files[0].name.as_c_str() {
        return ptr::null_mut();
    }
    let Some(prefix) = model.prefix_at(line, column) else {
        return ptr::null_mut();
    };

    let candidates = model.completions(prefix);
    let strings: Vec<Box<CompletionStringData>> = candidates
        .iter()
        .map(|&id| {
            let node = &model.nodes[id as usize];
            Box::new(CompletionStringData {
                chunks: completion_chunks(node.kind, &node.name),
            })
        })
        .collect();
    let mut entries: Vec<TxCompletionResult> = candidates
        .iter()
        .zip(&strings)
        .map(|(&id, string)| TxCompletionResult {
            cursor_kind: model.nodes[id as usize].kind,
            completion_string: &**string as *const CompletionStringData as TxCompletionString,
        })
        .collect();

    let results = TxCodeCompleteResults {
        results: entries.as_mut_ptr(),
        num_results: entries.len() as c_uint,
    };
    let ptr = Box::into_raw(Box::new(CompleteResultsData {
        results,
        tu: data as *const TranslationUnitData,
        entries,
        strings,
    }));
    // SAFETY: just allocated; the entry vector's buffer did not move when
    // the vector itself was moved into the box.
    let boxed = unsafe { &*ptr };
    for string in &boxed.strings {
        track(&**string as *const CompletionStringData as *const c_void, KIND_COMPLETION_STRING);
    }
    track(ptr as *const c_void, KIND_COMPLETE_RESULTS);
    data.completions.set(data.completions.get() + 1);

    if options & TX_COMPLETE_SORT_ALPHABETICAL != 0 {
        unsafe { tx_sort_code_completion_results(boxed.results.results, boxed.results.num_results) };
    }
    ptr as *mut TxCodeCompleteResults
}

pub unsafe extern "C" fn tx_dispose_code_complete_results(results: *mut TxCodeCompleteResults) {
    if results.is_null() {
        return;
    }
    untrack(results as *const c_void, KIND_COMPLETE_RESULTS);
    // SAFETY: the pointer came from Box::into_raw in tx_code_complete_at and
    // was just removed from the live set.
    let data = unsafe { Box::from_raw(results as *mut CompleteResultsData) };
    for string in &data.strings {
        untrack(&**string as *const CompletionStringData as *const c_void, KIND_COMPLETION_STRING);
    }
    // SAFETY: results never outlive their translation unit, see
    // tx_dispose_translation_unit.
    let unit = unsafe { &*data.tu };
    unit.completions.set(unit.completions.get() - 1);
}

/// Sorts results by their typed text, in place.
pub unsafe extern "C" fn tx_sort_code_completion_results(results: *mut TxCompletionResult, count: c_uint) {
    if results.is_null() || count == 0 {
        return;
    }
    // SAFETY: caller passes an array of `count` results.
    let results = unsafe { std::slice::from_raw_parts_mut(results, count as usize) };
    results.sort_by(|a, b| {
        let a = unsafe { string_ref(a.completion_string) }.typed_text();
        let b = unsafe { string_ref(b.completion_string) }.typed_text();
        a.cmp(b)
    });
}

pub unsafe extern "C" fn tx_completion_num_chunks(string: TxCompletionString) -> c_uint {
    unsafe { string_ref(string) }.chunks.len() as c_uint
}

/// Kind of chunk `index`, or -1 past the end.
pub unsafe extern "C" fn tx_completion_chunk_kind(string: TxCompletionString, index: c_uint) -> c_int {
    unsafe { string_ref(string) }
        .chunks
        .get(index as usize)
        .map_or(-1, |(kind, _)| *kind)
}

/// Text of chunk `index`, owned by the completion results. Null past the end.
pub unsafe extern "C" fn tx_completion_chunk_text(string: TxCompletionString, index: c_uint) -> *const c_char {
    unsafe { string_ref(string) }
        .chunks
        .get(index as usize)
        .map_or(ptr::null(), |(_, text)| text.as_ptr())
}

// ============================================================================
// Tokens
// ============================================================================

/// Tokenizes the whole translation unit into a freshly allocated buffer that
/// must be released with `tx_dispose_tokens`. An empty unit yields a null
/// buffer and a zero count.
pub unsafe extern "C" fn tx_tokenize(
    tu: TxTranslationUnit,
    tokens: *mut *mut TxToken,
    count: *mut c_uint,
) {
    if tokens.is_null() || count.is_null() {
        return;
    }
    let data = unsafe { unit_ref(tu) };
    let buffer: Box<[TxToken]> = data
        .model
        .tokens
        .iter()
        .enumerate()
        .map(|(i, t)| TxToken {
            kind: t.kind,
            spelling: i as c_uint,
            line: t.line,
            column: t.column,
        })
        .collect();

    if buffer.is_empty() {
        // SAFETY: out-parameters checked non-null.
        unsafe {
            *tokens = ptr::null_mut();
            *count = 0;
        }
        return;
    }

    let len = buffer.len() as c_uint;
    let ptr = Box::into_raw(buffer) as *mut TxToken;
    track(ptr as *const c_void, KIND_TOKEN_BUFFER);
    data.token_buffers.set(data.token_buffers.get() + 1);
    // SAFETY: out-parameters checked non-null.
    unsafe {
        *tokens = ptr;
        *count = len;
    }
}

pub unsafe extern "C" fn tx_dispose_tokens(tu: TxTranslationUnit, tokens: *mut TxToken, count: c_uint) {
    if tokens.is_null() {
        return;
    }
    let data = unsafe { unit_ref(tu) };
    untrack(tokens as *const c_void, KIND_TOKEN_BUFFER);
    data.token_buffers.set(data.token_buffers.get() - 1);
    // SAFETY: the buffer came from Box::<[TxToken]>::into_raw with this length.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(tokens, count as usize)) });
}

/// Returns the spelling of a token. The string is owned by the translation
/// unit, not the token buffer.
pub unsafe extern "C" fn tx_token_spelling(tu: TxTranslationUnit, token: TxToken) -> *const c_char {
    let data = unsafe { unit_ref(tu) };
    data.model
        .spellings
        .get(token.spelling as usize)
        .map_or(ptr::null(), |s| s.as_ptr())
}

// ============================================================================
// Files and inclusions
// ============================================================================

pub unsafe extern "C" fn tx_file_name(file: TxFile) -> *const c_char {
    if file.is_null() {
        return ptr::null();
    }
    // SAFETY: files are boxed `FileEntry` values owned by a live translation
    // unit; callers guarantee the unit outlives the file pointer.
    unsafe { (*(file as *const crate::model::FileEntry)).name.as_ptr() }
}

/// Visits the main file (empty inclusion stack) followed by every included
/// file with the location of its `#include`.
pub unsafe extern "C" fn tx_get_inclusions(
    tu: TxTranslationUnit,
    visitor: TxInclusionVisitor,
    client_data: TxClientData,
) {
    let data = unsafe { unit_ref(tu) };
    let model = &data.model;

    unsafe { visitor(model.file_ptr(0), ptr::null(), 0, client_data) };

    for inclusion in &model.inclusions {
        let stack = [model.location(inclusion.line, 1)];
        unsafe { visitor(model.file_ptr(inclusion.file), stack.as_ptr(), 1, client_data) };
    }
}

// ============================================================================
// Indexing
// ============================================================================

pub unsafe extern "C" fn tx_index_action_create(index: TxIndex) -> TxIndexAction {
    if index.is_null() {
        return ptr::null_mut();
    }
    let index_data = unsafe { index_ref(index) };
    index_data.children.set(index_data.children.get() + 1);

    let ptr = Box::into_raw(Box::new(IndexActionData {
        index: index_data as *const IndexData,
        running: Cell::new(false),
    }));
    track(ptr as *const c_void, KIND_INDEX_ACTION);
    ptr as TxIndexAction
}

pub unsafe extern "C" fn tx_index_action_dispose(action: TxIndexAction) {
    if action.is_null() {
        return;
    }
    let data = unsafe { action_ref(action) };
    if data.running.get() {
        fatal(&format!("index action {action:p} disposed while indexing"));
    }
    untrack(action as *const c_void, KIND_INDEX_ACTION);
    // SAFETY: unique release of a Box::into_raw pointer.
    let data = unsafe { Box::from_raw(action as *mut IndexActionData) };
    release_child(data.index);
}

pub unsafe extern "C" fn tx_index_set_client_entity(info: *const TxIdxEntityInfo, client: TxIdxClientEntity) {
    if info.is_null() {
        return;
    }
    unsafe { entity_ref(info) }.client.set(client);
}

pub unsafe extern "C" fn tx_index_get_client_entity(info: *const TxIdxEntityInfo) -> TxIdxClientEntity {
    if info.is_null() {
        return ptr::null_mut();
    }
    unsafe { entity_ref(info) }.client.get()
}

pub unsafe extern "C" fn tx_index_set_client_container(
    info: *const TxIdxContainerInfo,
    client: TxIdxClientContainer,
) {
    if info.is_null() {
        return;
    }
    unsafe { container_ref(info) }.client.set(client);
}

pub unsafe extern "C" fn tx_index_get_client_container(info: *const TxIdxContainerInfo) -> TxIdxClientContainer {
    if info.is_null() {
        return ptr::null_mut();
    }
    unsafe { container_ref(info) }.client.get()
}

pub unsafe extern "C" fn tx_diagnostic_set_count(set: TxDiagnosticSet) -> c_uint {
    check(set as *const c_void, KIND_DIAGNOSTIC_SET);
    // SAFETY: live diagnostic sets point at the unit's diagnostic vector.
    unsafe { (*(set as *const Vec<CString>)).len() as c_uint }
}

pub unsafe extern "C" fn tx_diagnostic_set_message(set: TxDiagnosticSet, index: c_uint) -> *const c_char {
    check(set as *const c_void, KIND_DIAGNOSTIC_SET);
    // SAFETY: as above.
    let messages = unsafe { &*(set as *const Vec<CString>) };
    messages.get(index as usize).map_or(ptr::null(), |m| m.as_ptr())
}

/// Walks a translation unit and reports what it finds through `callbacks`.
///
/// Every pointer handed to a callback (declaration info, entity info,
/// diagnostic set) is valid only until that callback returns, except entity
/// and container infos which stay valid until this function returns. The
/// value returned by `started_translation_unit` becomes the client data of
/// the translation unit's container. A non-zero
/// `abort_query` stops the walk; the call still reports success.
///
/// # Safety
///
/// `callbacks` must point to at least `callbacks_size` readable bytes.
pub unsafe extern "C" fn tx_index_translation_unit(
    action: TxIndexAction,
    client_data: TxClientData,
    callbacks: *const TxIndexerCallbacks,
    callbacks_size: c_uint,
    options: c_uint,
    tu: TxTranslationUnit,
) -> c_int {
    if action.is_null() || tu.is_null() || callbacks.is_null() {
        return TX_ERROR_INVALID_ARGUMENTS;
    }
    if (callbacks_size as usize) < std::mem::size_of::<TxIndexerCallbacks>() {
        return TX_ERROR_INVALID_ARGUMENTS;
    }
    let action_data = unsafe { action_ref(action) };
    let unit = unsafe { unit_ref(tu) };
    if action_data.running.replace(true) {
        return TX_ERROR_FAILURE;
    }

    // SAFETY: size checked above.
    let callbacks = unsafe { *callbacks };
    let mut indexer = Indexer {
        client_data,
        callbacks,
        options,
        tu,
        model: &unit.model,
        entities: FxHashMap::default(),
        containers: FxHashMap::default(),
    };
    unsafe { indexer.run() };
    indexer.release_records();

    action_data.running.set(false);
    TX_ERROR_SUCCESS
}

struct Indexer<'a> {
    client_data: TxClientData,
    callbacks: TxIndexerCallbacks,
    options: c_uint,
    tu: TxTranslationUnit,
    model: &'a Model,
    entities: FxHashMap<&'a [u8], Box<EntityRecord>>,
    containers: FxHashMap<u32, Box<ContainerRecord>>,
}

fn is_container(kind: c_int) -> bool {
    matches!(kind, TX_CURSOR_TRANSLATION_UNIT | TX_CURSOR_STRUCT | TX_CURSOR_FUNCTION)
}

impl<'a> Indexer<'a> {
    unsafe fn aborted(&self) -> bool {
        match self.callbacks.abort_query {
            Some(abort_query) => unsafe { abort_query(self.client_data, ptr::null_mut()) != 0 },
            None => false,
        }
    }

    fn entity(&mut self, node: u32) -> *const TxIdxEntityInfo {
        let model = self.model;
        let node = &model.nodes[node as usize];
        let record = self.entities.entry(node.name.as_bytes()).or_insert_with(|| {
            let record = Box::new(EntityRecord {
                info: TxIdxEntityInfo {
                    kind: node.kind,
                    name: node.name.as_ptr(),
                    usr: node.usr.as_ptr(),
                },
                client: Cell::new(ptr::null_mut()),
            });
            track(&record.info as *const TxIdxEntityInfo as *const c_void, KIND_ENTITY);
            record
        });
        // A declaration after a forward reference upgrades the entity.
        if record.info.kind == TX_CURSOR_REFERENCE && node.kind != TX_CURSOR_REFERENCE {
            record.info.kind = node.kind;
            record.info.usr = node.usr.as_ptr();
        }
        &record.info
    }

    fn container(&mut self, node: u32) -> *const TxIdxContainerInfo {
        let tu = self.tu;
        let kind = self.model.nodes[node as usize].kind;
        let record = self.containers.entry(node).or_insert_with(|| {
            let record = Box::new(ContainerRecord {
                info: TxIdxContainerInfo {
                    cursor: TxCursor { kind, node, tu },
                },
                client: Cell::new(ptr::null_mut()),
            });
            track(&record.info as *const TxIdxContainerInfo as *const c_void, KIND_CONTAINER);
            record
        });
        &record.info
    }

    /// Nearest container above `node`; the root if nothing closer.
    fn enclosing_container(&mut self, node: u32) -> *const TxIdxContainerInfo {
        let model = self.model;
        let mut current = model.nodes[node as usize].parent;
        while let Some(id) = current {
            if is_container(model.nodes[id as usize].kind) {
                return self.container(id);
            }
            current = model.nodes[id as usize].parent;
        }
        self.container(0)
    }

    unsafe fn run(&mut self) {
        let model = self.model;
        let cb = self.callbacks;

        let root = self.container(0);
        if let Some(started) = cb.started_translation_unit {
            let client = unsafe { started(self.client_data, ptr::null_mut()) };
            unsafe { container_ref(root) }.client.set(client);
        }
        if unsafe { self.aborted() } {
            return;
        }

        if let Some(entered) = cb.entered_main_file {
            unsafe { entered(self.client_data, model.file_ptr(0), ptr::null_mut()) };
        }

        for inclusion in &model.inclusions {
            if unsafe { self.aborted() } {
                return;
            }
            if let Some(included) = cb.pp_included_file {
                let info = TxIdxIncludedFileInfo {
                    hash_loc: model.location(inclusion.line, 1),
                    filename: model.files[inclusion.file].name.as_ptr(),
                    file: model.file_ptr(inclusion.file),
                    is_angled: c_int::from(inclusion.angled),
                };
                unsafe { included(self.client_data, &info) };
            }
        }

        for id in model.preorder() {
            if unsafe { self.aborted() } {
                return;
            }
            let node = &model.nodes[id as usize];
            let cursor = TxCursor {
                kind: node.kind,
                node: id,
                tu: self.tu,
            };
            let loc = model.location(node.line, node.column);
            let entity = self.entity(id);

            if node.kind == TX_CURSOR_REFERENCE {
                if self.options & TX_INDEX_SUPPRESS_REFERENCES != 0 {
                    continue;
                }
                if let Some(reference) = cb.index_entity_reference {
                    let info = TxIdxEntityRefInfo {
                        referenced_entity: entity,
                        cursor,
                        loc,
                    };
                    unsafe { reference(self.client_data, &info) };
                }
            } else if let Some(declaration) = cb.index_declaration {
                let container = self.enclosing_container(id);
                let decl_as_container = if is_container(node.kind) {
                    self.container(id)
                } else {
                    ptr::null()
                };
                let info = TxIdxDeclInfo {
                    entity_info: entity,
                    cursor,
                    loc,
                    is_definition: c_int::from(node.kind != TX_CURSOR_FIELD),
                    semantic_container: container,
                    lexical_container: container,
                    decl_as_container,
                };
                unsafe { declaration(self.client_data, &info) };
            }
        }

        if self.options & TX_INDEX_SUPPRESS_WARNINGS != 0 {
            return;
        }
        if let Some(diagnostic) = cb.diagnostic {
            let set = &model.diagnostics as *const Vec<CString> as TxDiagnosticSet;
            track(set as *const c_void, KIND_DIAGNOSTIC_SET);
            unsafe { diagnostic(self.client_data, set, ptr::null_mut()) };
            untrack(set as *const c_void, KIND_DIAGNOSTIC_SET);
        }
    }

    fn release_records(&mut self) {
        for record in self.entities.values() {
            untrack(&record.info as *const TxIdxEntityInfo as *const c_void, KIND_ENTITY);
        }
        self.entities.clear();
        for record in self.containers.values() {
            untrack(&record.info as *const TxIdxContainerInfo as *const c_void, KIND_CONTAINER);
        }
        self.containers.clear();
    }
}
