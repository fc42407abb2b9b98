//! `tether-native`: an in-process source index engine behind a C ABI.
//!
//! The engine parses a tiny line-oriented language (see [`model`]) and exposes
//! the result the way a C compiler-introspection library does: opaque
//! handles, one disposal function per handle kind, and traversal functions
//! that take a callback table plus an opaque client-data pointer and call
//! back synchronously.
//!
//! It keeps per-thread books on every handle it hands out so tests can prove
//! that each one is disposed exactly once and that children are always
//! disposed before their parents. Misuse aborts the process, which is the
//! closest safe stand-in for the memory corruption a real library would
//! suffer.
//!
//! # Example
//!
//! ```rust
//! use std::ffi::CString;
//! use tether_native::*;
//!
//! let name = CString::new("demo.c").unwrap();
//! let source = CString::new("fn main\n").unwrap();
//! unsafe {
//!     let index = tx_create_index(0);
//!     let mut tu = std::ptr::null_mut();
//!     let code = tx_parse_translation_unit(index, name.as_ptr(), source.as_ptr(), &mut tu);
//!     assert_eq!(code, TX_ERROR_SUCCESS);
//!     assert_eq!(live_handles(), 2);
//!
//!     tx_dispose_translation_unit(tu);
//!     tx_dispose_index(index);
//! }
//! assert_eq!(live_handles(), 0);
//! ```

pub mod abi;
mod api;
pub(crate) mod model;

pub use abi::*;
pub use api::*;

use fxhash::FxHashMap;
use std::cell::RefCell;
use std::ffi::c_void;

thread_local! {
    static LIVE: RefCell<FxHashMap<usize, &'static str>> = RefCell::new(FxHashMap::default());
}

/// Aborts the process after reporting a misuse of the ABI.
pub(crate) fn fatal(message: &str) -> ! {
    eprintln!("tether-native: fatal: {message}");
    std::process::abort()
}

pub(crate) fn track(ptr: *const c_void, kind: &'static str) {
    LIVE.with(|live| {
        if let Some(existing) = live.borrow_mut().insert(ptr as usize, kind) {
            fatal(&format!("{kind} {ptr:p} allocated over live {existing}"));
        }
    });
}

pub(crate) fn untrack(ptr: *const c_void, kind: &'static str) {
    LIVE.with(|live| match live.borrow_mut().remove(&(ptr as usize)) {
        Some(found) if found == kind => {}
        Some(found) => fatal(&format!("{ptr:p} disposed as {kind} but is a {found}")),
        None => fatal(&format!("{kind} {ptr:p} disposed twice or never created")),
    });
}

pub(crate) fn check(ptr: *const c_void, kind: &'static str) {
    LIVE.with(|live| match live.borrow().get(&(ptr as usize)) {
        Some(found) if *found == kind => {}
        Some(found) => fatal(&format!("{ptr:p} used as {kind} but is a {found}")),
        None => fatal(&format!("{kind} {ptr:p} used after dispose")),
    });
}

/// Number of handles created on this thread and not yet disposed.
pub fn live_handles() -> usize {
    LIVE.with(|live| live.borrow().len())
}

/// Number of live handles of one kind (`"Index"`, `"TranslationUnit"`,
/// `"TokenBuffer"`, `"IndexAction"`, `"CodeCompleteResults"`, ...).
pub fn live_handles_of(kind: &str) -> usize {
    LIVE.with(|live| live.borrow().values().filter(|k| **k == kind).count())
}

/// Whether `ptr` is a live handle on this thread.
pub fn is_live(ptr: *const c_void) -> bool {
    LIVE.with(|live| live.borrow().contains_key(&(ptr as usize)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString, c_int, c_uint};
    use std::ptr;

    fn parse(index: TxIndex, source: &str) -> TxTranslationUnit {
        let name = CString::new("test.c").unwrap();
        let source = CString::new(source).unwrap();
        let mut tu = ptr::null_mut();
        let code = unsafe { tx_parse_translation_unit(index, name.as_ptr(), source.as_ptr(), &mut tu) };
        assert_eq!(code, TX_ERROR_SUCCESS);
        tu
    }

    #[test]
    fn test_handles_are_tracked_until_disposed() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "fn a\nfn b\n");
            let mut tokens = ptr::null_mut();
            let mut count = 0;
            tx_tokenize(tu, &mut tokens, &mut count);

            assert_eq!(count, 4);
            assert_eq!(live_handles_of("TokenBuffer"), 1);
            assert_eq!(live_handles(), 3);

            tx_dispose_tokens(tu, tokens, count);
            tx_dispose_translation_unit(tu);
            assert!(is_live(index as *const c_void));
            tx_dispose_index(index);
        }
        assert_eq!(live_handles(), 0);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        unsafe {
            let index = tx_create_index(0);
            let empty = CString::new("").unwrap();
            let source = CString::new("fn a").unwrap();
            let mut tu = ptr::null_mut();

            assert_eq!(
                tx_parse_translation_unit(index, empty.as_ptr(), source.as_ptr(), &mut tu),
                TX_ERROR_INVALID_ARGUMENTS
            );
            let name = CString::new("a.c").unwrap();
            assert_eq!(
                tx_parse_translation_unit(index, name.as_ptr(), ptr::null(), &mut tu),
                TX_ERROR_FAILURE
            );
            assert!(tu.is_null());
            tx_dispose_index(index);
        }
    }

    #[test]
    fn test_token_spelling_outlives_buffer() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "var counter\n");
            let mut tokens = ptr::null_mut();
            let mut count = 0;
            tx_tokenize(tu, &mut tokens, &mut count);
            let second = *tokens.add(1);
            tx_dispose_tokens(tu, tokens, count);

            let spelling = CStr::from_ptr(tx_token_spelling(tu, second));
            assert_eq!(spelling.to_str().unwrap(), "counter");

            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
    }

    unsafe extern "C" fn count_and_stop(cursor: TxCursor, _parent: TxCursor, data: TxClientData) -> c_int {
        let seen = unsafe { &mut *(data as *mut Vec<c_int>) };
        seen.push(cursor.kind);
        if cursor.kind == TX_CURSOR_FIELD {
            TX_VISIT_BREAK
        } else {
            TX_VISIT_RECURSE
        }
    }

    #[test]
    fn test_visit_children_honours_break() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "fn f\nstruct S\n  field a\n  field b\nvar v\n");
            let mut seen: Vec<c_int> = Vec::new();
            let root = tx_get_translation_unit_cursor(tu);
            let broke = tx_visit_children(root, count_and_stop, &mut seen as *mut Vec<c_int> as TxClientData);

            assert_eq!(broke, 1);
            assert_eq!(seen, [TX_CURSOR_FUNCTION, TX_CURSOR_STRUCT, TX_CURSOR_FIELD]);

            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
    }

    unsafe extern "C" fn record_inclusion(
        file: TxFile,
        _stack: *const TxSourceLocation,
        depth: c_uint,
        data: TxClientData,
    ) {
        let seen = unsafe { &mut *(data as *mut Vec<(String, c_uint)>) };
        let name = unsafe { CStr::from_ptr(tx_file_name(file)) };
        seen.push((name.to_string_lossy().into_owned(), depth));
    }

    #[test]
    fn test_inclusions_start_with_main_file() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "#include \"a.h\"\n#include <b.h>\n");
            let mut seen: Vec<(String, c_uint)> = Vec::new();
            tx_get_inclusions(tu, record_inclusion, &mut seen as *mut _ as TxClientData);

            assert_eq!(
                seen,
                [("test.c".to_string(), 0), ("a.h".to_string(), 1), ("b.h".to_string(), 1)]
            );

            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
    }

    #[test]
    fn test_index_remembers_pch_flag() {
        unsafe {
            let plain = tx_create_index(0);
            let excluding = tx_create_index(1);
            assert_eq!(tx_index_excludes_declarations_from_pch(plain), 0);
            assert_eq!(tx_index_excludes_declarations_from_pch(excluding), 1);
            tx_dispose_index(plain);
            tx_dispose_index(excluding);
        }
    }

    unsafe fn chunk_texts(string: TxCompletionString) -> Vec<(c_int, String)> {
        (0..unsafe { tx_completion_num_chunks(string) })
            .map(|i| unsafe {
                let text = CStr::from_ptr(tx_completion_chunk_text(string, i));
                (tx_completion_chunk_kind(string, i), text.to_string_lossy().into_owned())
            })
            .collect()
    }

    #[test]
    fn test_code_completion_results() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "fn shade\nstruct Shape\nvar size\nfn main\n  use Sh\n");
            let name = CString::new("test.c").unwrap();
            let results = tx_code_complete_at(tu, name.as_ptr(), 5, 9, TX_COMPLETE_SORT_ALPHABETICAL);
            assert!(!results.is_null());
            assert_eq!(live_handles_of("CodeCompleteResults"), 1);
            assert_eq!(live_handles_of("CompletionString"), 1);

            let entries = std::slice::from_raw_parts((*results).results, (*results).num_results as usize);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].cursor_kind, TX_CURSOR_STRUCT);
            assert_eq!(
                chunk_texts(entries[0].completion_string),
                [(TX_CHUNK_INFORMATIVE, "struct".to_string()), (TX_CHUNK_TYPED_TEXT, "Shape".to_string())]
            );
            assert_eq!(tx_completion_chunk_kind(entries[0].completion_string, 9), -1);

            tx_dispose_code_complete_results(results);
            assert_eq!(live_handles_of("CompletionString"), 0);

            let lowercase = tx_code_complete_at(tu, name.as_ptr(), 5, 7, TX_COMPLETE_SORT_ALPHABETICAL);
            let entries = std::slice::from_raw_parts((*lowercase).results, (*lowercase).num_results as usize);
            let names: Vec<String> = entries
                .iter()
                .map(|entry| {
                    let chunks = chunk_texts(entry.completion_string);
                    chunks.into_iter().find(|(kind, _)| *kind == TX_CHUNK_TYPED_TEXT).unwrap().1
                })
                .collect();
            assert_eq!(names, ["Shape", "main", "shade", "size"]);
            tx_dispose_code_complete_results(lowercase);

            let other = CString::new("other.c").unwrap();
            assert!(tx_code_complete_at(tu, other.as_ptr(), 1, 1, TX_COMPLETE_NONE).is_null());
            assert!(tx_code_complete_at(tu, name.as_ptr(), 40, 1, TX_COMPLETE_NONE).is_null());

            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
        assert_eq!(live_handles(), 0);
    }

    unsafe extern "C" fn collect_reference(context: TxClientData, cursor: TxCursor, range: TxSourceRange) -> c_int {
        let seen = unsafe { &mut *(context as *mut Vec<(c_int, c_uint, c_uint, c_uint)>) };
        seen.push((cursor.kind, range.start.line, range.start.column, range.end.column));
        if seen.len() == 3 {
            TX_VISIT_BREAK
        } else {
            TX_VISIT_CONTINUE
        }
    }

    #[test]
    fn test_find_references_in_file() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "#include \"p.h\"\nstruct Point\nfn f\n  use Point\nfn g\n  use Point\n");
            let main = CString::new("test.c").unwrap();
            let header = CString::new("p.h").unwrap();
            let missing = CString::new("none.h").unwrap();
            let file = tx_get_file(tu, main.as_ptr());
            assert!(!file.is_null());
            assert!(!tx_get_file(tu, header.as_ptr()).is_null());
            assert!(tx_get_file(tu, missing.as_ptr()).is_null());

            let point = TxCursor { kind: TX_CURSOR_STRUCT, node: 1, tu };
            let mut seen: Vec<(c_int, c_uint, c_uint, c_uint)> = Vec::new();
            let visitor = TxCursorAndRangeVisitor {
                context: &mut seen as *mut _ as TxClientData,
                visit: Some(collect_reference),
            };
            assert_eq!(tx_find_references_in_file(point, file, visitor), TX_FIND_VISIT_BREAK);
            assert_eq!(
                seen,
                [(TX_CURSOR_STRUCT, 2, 8, 13), (TX_CURSOR_REFERENCE, 4, 7, 12), (TX_CURSOR_REFERENCE, 6, 7, 12)]
            );

            let in_header = tx_find_references_in_file(point, tx_get_file(tu, header.as_ptr()), visitor);
            assert_eq!(in_header, TX_FIND_SUCCESS);
            assert_eq!(tx_find_references_in_file(point, ptr::null(), visitor), TX_FIND_INVALID);
            let root = tx_get_translation_unit_cursor(tu);
            assert_eq!(tx_find_references_in_file(root, file, visitor), TX_FIND_INVALID);

            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
    }

    unsafe extern "C" fn root_client(_client_data: TxClientData, _reserved: *mut c_void) -> TxIdxClientContainer {
        0x40usize as TxIdxClientContainer
    }

    unsafe extern "C" fn record_containers(client_data: TxClientData, info: *const TxIdxDeclInfo) {
        let seen = unsafe { &mut *(client_data as *mut Vec<(c_uint, usize, bool)>) };
        let info = unsafe { &*info };
        let container = unsafe { &*info.semantic_container };
        let client = unsafe { tx_index_get_client_container(info.semantic_container) } as usize;
        seen.push((container.cursor.node, client, !info.decl_as_container.is_null()));
        if !info.decl_as_container.is_null() {
            unsafe { tx_index_set_client_container(info.decl_as_container, info.cursor.node as usize as *mut c_void) };
        }
    }

    #[test]
    fn test_indexing_reports_containers() {
        unsafe {
            let index = tx_create_index(0);
            let tu = parse(index, "struct S\n  field a\nvar v\n");
            let action = tx_index_action_create(index);
            let callbacks = TxIndexerCallbacks {
                started_translation_unit: Some(root_client),
                index_declaration: Some(record_containers),
                ..TxIndexerCallbacks::default()
            };
            let mut seen: Vec<(c_uint, usize, bool)> = Vec::new();
            let code = tx_index_translation_unit(
                action,
                &mut seen as *mut _ as TxClientData,
                &callbacks,
                std::mem::size_of::<TxIndexerCallbacks>() as c_uint,
                TX_INDEX_NONE,
                tu,
            );
            assert_eq!(code, TX_ERROR_SUCCESS);
            // The field sees the client set on the struct's own container.
            assert_eq!(seen, [(0, 0x40, true), (1, 1, false), (0, 0x40, false)]);
            assert_eq!(live_handles_of("IndexContainer"), 0);

            tx_index_action_dispose(action);
            tx_dispose_translation_unit(tu);
            tx_dispose_index(index);
        }
    }
}
