//! C ABI types shared with callers.
//!
//! Everything in this module is `#[repr(C)]` or a raw pointer alias so the
//! layout matches what a C header for the engine would declare. Handle types
//! are pointers to zero-sized marker structs: callers can hold and pass them
//! but never look inside.

use std::ffi::{c_char, c_int, c_uint, c_void};

macro_rules! opaque {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque! {
    /// Opaque index object.
    TxIndexImpl;
    /// Opaque translation unit.
    TxTranslationUnitImpl;
    /// Opaque indexing session.
    TxIndexActionImpl;
    /// Opaque file entry, owned by its translation unit.
    TxFileImpl;
    /// Opaque diagnostic set, valid for one callback.
    TxDiagnosticSetImpl;
    /// Opaque completion string, owned by its completion results.
    TxCompletionStringImpl;
}

pub type TxIndex = *mut TxIndexImpl;
pub type TxTranslationUnit = *mut TxTranslationUnitImpl;
pub type TxIndexAction = *mut TxIndexActionImpl;
pub type TxFile = *const TxFileImpl;
pub type TxDiagnosticSet = *const TxDiagnosticSetImpl;
pub type TxCompletionString = *const TxCompletionStringImpl;

/// Caller-owned context pointer threaded through every callback.
pub type TxClientData = *mut c_void;
pub type TxIdxClientFile = *mut c_void;
pub type TxIdxClientContainer = *mut c_void;
pub type TxIdxClientEntity = *mut c_void;

// Error codes
pub const TX_ERROR_SUCCESS: c_int = 0;
pub const TX_ERROR_FAILURE: c_int = 1;
pub const TX_ERROR_CRASHED: c_int = 2;
pub const TX_ERROR_INVALID_ARGUMENTS: c_int = 3;
pub const TX_ERROR_AST_READ_ERROR: c_int = 4;

// Cursor kinds
pub const TX_CURSOR_INVALID: c_int = 0;
pub const TX_CURSOR_TRANSLATION_UNIT: c_int = 1;
pub const TX_CURSOR_FUNCTION: c_int = 2;
pub const TX_CURSOR_STRUCT: c_int = 3;
pub const TX_CURSOR_FIELD: c_int = 4;
pub const TX_CURSOR_VARIABLE: c_int = 5;
pub const TX_CURSOR_REFERENCE: c_int = 6;

// Child visitation results
pub const TX_VISIT_BREAK: c_int = 0;
pub const TX_VISIT_CONTINUE: c_int = 1;
pub const TX_VISIT_RECURSE: c_int = 2;

// Token kinds
pub const TX_TOKEN_PUNCTUATION: c_int = 0;
pub const TX_TOKEN_KEYWORD: c_int = 1;
pub const TX_TOKEN_IDENTIFIER: c_int = 2;
pub const TX_TOKEN_LITERAL: c_int = 3;

// Find-references results
pub const TX_FIND_SUCCESS: c_int = 0;
pub const TX_FIND_INVALID: c_int = 1;
pub const TX_FIND_VISIT_BREAK: c_int = 2;

// Completion chunk kinds
pub const TX_CHUNK_TYPED_TEXT: c_int = 0;
pub const TX_CHUNK_TEXT: c_int = 1;
pub const TX_CHUNK_INFORMATIVE: c_int = 2;
pub const TX_CHUNK_LEFT_PAREN: c_int = 3;
pub const TX_CHUNK_RIGHT_PAREN: c_int = 4;

// Completion options
pub const TX_COMPLETE_NONE: c_uint = 0x0;
pub const TX_COMPLETE_SORT_ALPHABETICAL: c_uint = 0x1;

// Indexing options
pub const TX_INDEX_NONE: c_uint = 0x0;
pub const TX_INDEX_SUPPRESS_REFERENCES: c_uint = 0x1;
pub const TX_INDEX_SUPPRESS_WARNINGS: c_uint = 0x2;

/// A cursor is a plain value: it stays meaningful exactly as long as the
/// translation unit it points into.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxCursor {
    pub kind: c_int,
    pub node: c_uint,
    pub tu: TxTranslationUnit,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxToken {
    pub kind: c_int,
    /// Index into the translation unit's spelling table.
    pub spelling: c_uint,
    pub line: c_uint,
    pub column: c_uint,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSourceLocation {
    pub file: TxFile,
    pub line: c_uint,
    pub column: c_uint,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSourceRange {
    pub start: TxSourceLocation,
    /// One past the last character.
    pub end: TxSourceLocation,
}

pub type TxCursorVisitor =
    unsafe extern "C" fn(cursor: TxCursor, parent: TxCursor, client_data: TxClientData) -> c_int;

pub type TxInclusionVisitor = unsafe extern "C" fn(
    included: TxFile,
    stack: *const TxSourceLocation,
    stack_len: c_uint,
    client_data: TxClientData,
);

/// Callback pair for `tx_find_references_in_file`. The visitor returns
/// `TX_VISIT_BREAK` to stop or `TX_VISIT_CONTINUE` to go on.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TxCursorAndRangeVisitor {
    pub context: TxClientData,
    pub visit: Option<unsafe extern "C" fn(TxClientData, TxCursor, TxSourceRange) -> c_int>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TxCompletionResult {
    pub cursor_kind: c_int,
    pub completion_string: TxCompletionString,
}

/// Results of `tx_code_complete_at`, released with
/// `tx_dispose_code_complete_results`.
#[repr(C)]
pub struct TxCodeCompleteResults {
    pub results: *mut TxCompletionResult,
    pub num_results: c_uint,
}

#[repr(C)]
pub struct TxIdxEntityInfo {
    pub kind: c_int,
    pub name: *const c_char,
    pub usr: *const c_char,
}

/// A scope that declarations live in: the translation unit, a struct or a
/// function. Valid until `tx_index_translation_unit` returns.
#[repr(C)]
pub struct TxIdxContainerInfo {
    pub cursor: TxCursor,
}

#[repr(C)]
pub struct TxIdxDeclInfo {
    pub entity_info: *const TxIdxEntityInfo,
    pub cursor: TxCursor,
    pub loc: TxSourceLocation,
    pub is_definition: c_int,
    pub semantic_container: *const TxIdxContainerInfo,
    pub lexical_container: *const TxIdxContainerInfo,
    /// Null unless the declaration is itself a container.
    pub decl_as_container: *const TxIdxContainerInfo,
}

#[repr(C)]
pub struct TxIdxEntityRefInfo {
    pub referenced_entity: *const TxIdxEntityInfo,
    pub cursor: TxCursor,
    pub loc: TxSourceLocation,
}

#[repr(C)]
pub struct TxIdxIncludedFileInfo {
    pub hash_loc: TxSourceLocation,
    pub filename: *const c_char,
    pub file: TxFile,
    pub is_angled: c_int,
}

/// Callback table for `tx_index_translation_unit`. Every entry is optional.
#[repr(C)]
#[derive(Default, Clone, Copy)]
pub struct TxIndexerCallbacks {
    pub abort_query: Option<unsafe extern "C" fn(TxClientData, *mut c_void) -> c_int>,
    pub diagnostic: Option<unsafe extern "C" fn(TxClientData, TxDiagnosticSet, *mut c_void)>,
    pub entered_main_file:
        Option<unsafe extern "C" fn(TxClientData, TxFile, *mut c_void) -> TxIdxClientFile>,
    pub pp_included_file:
        Option<unsafe extern "C" fn(TxClientData, *const TxIdxIncludedFileInfo) -> TxIdxClientFile>,
    pub started_translation_unit:
        Option<unsafe extern "C" fn(TxClientData, *mut c_void) -> TxIdxClientContainer>,
    pub index_declaration: Option<unsafe extern "C" fn(TxClientData, *const TxIdxDeclInfo)>,
    pub index_entity_reference:
        Option<unsafe extern "C" fn(TxClientData, *const TxIdxEntityRefInfo)>,
}
