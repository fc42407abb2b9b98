// Code Completion Integration Tests
//
// These tests verify that completion results are owned by their translation
// unit and that results, strings and chunks read from them are references
// that die with the results.

mod common;

use common::{assert_all_released, live_of, parse};
use tether::{CompletionChunkKind, CompletionOptions, CursorKind, Error, NativeErrorCode};

/// Declarations with a shared prefix, and a half-typed reference on line 6.
const PAINT: &str = "\
fn paint
struct Palette
  field shade
var pad
fn main
  use pa
";

/// Test that completion offers every matching declaration with its chunks
#[test]
fn test_complete_prefix() {
    let (_index, tu) = parse(PAINT);
    let results = tu.code_complete_at("shapes.c", 6, 9, CompletionOptions::NONE).unwrap();
    assert_eq!(results.len(), 2);

    let paint = results.get(0).unwrap();
    assert_eq!(paint.kind().unwrap(), CursorKind::Function);
    let string = paint.completion_string().unwrap();
    let chunks: Vec<(Option<CompletionChunkKind>, String)> = string
        .chunks()
        .unwrap()
        .iter()
        .map(|chunk| (chunk.kind().unwrap(), chunk.text().unwrap()))
        .collect();
    assert_eq!(
        chunks,
        [
            (Some(CompletionChunkKind::TypedText), "paint".to_string()),
            (Some(CompletionChunkKind::LeftParen), "(".to_string()),
            (Some(CompletionChunkKind::RightParen), ")".to_string()),
        ]
    );

    let pad = results.get(1).unwrap();
    assert_eq!(pad.kind().unwrap(), CursorKind::Variable);
    assert_eq!(pad.completion_string().unwrap().typed_text().unwrap().as_deref(), Some("pad"));
    assert!(matches!(results.get(2), Err(Error::IndexOutOfRange { index: 2, len: 2 })));
}

/// Test alphabetical ordering and an empty prefix
#[test]
fn test_sorted_completion() {
    let (_index, tu) = parse(PAINT);
    let results = tu
        .code_complete_at("shapes.c", 6, 7, CompletionOptions::SORT_ALPHABETICAL)
        .unwrap();
    let names: Vec<String> = results
        .results()
        .unwrap()
        .iter()
        .map(|result| result.completion_string().unwrap().typed_text().unwrap().unwrap())
        .collect();
    assert_eq!(names, ["Palette", "main", "pad", "paint", "shade"]);

    let informative = results.get(0).unwrap().completion_string().unwrap().chunk(0).unwrap();
    assert_eq!(informative.kind().unwrap(), Some(CompletionChunkKind::Informative));
    assert_eq!(informative.text().unwrap(), "struct");
}

/// Test that results keep the translation unit from being released
#[test]
fn test_results_defer_translation_unit_release() {
    let (index, tu) = parse(PAINT);
    let results = tu.code_complete_at("shapes.c", 6, 9, CompletionOptions::NONE).unwrap();
    let chunk = results.get(0).unwrap().completion_string().unwrap().chunk(0).unwrap();

    tu.dispose();
    index.dispose();
    assert_eq!(live_of("TranslationUnit"), 1, "results depend on the unit");
    assert_eq!(live_of("CodeCompleteResults"), 1);
    assert!(matches!(chunk.text(), Err(Error::ObjectDisposed { kind: "Index" })));

    drop(chunk);
    drop(results);
    drop(tu);
    drop(index);
    assert_all_released();
}

/// Test that children taken from disposed results stop working and keep
/// the native buffer until they are gone
#[test]
fn test_children_die_with_results() {
    let (index, tu) = parse(PAINT);
    let results = tu.code_complete_at("shapes.c", 6, 9, CompletionOptions::NONE).unwrap();
    let result = results.get(0).unwrap();
    let string = result.completion_string().unwrap();
    let chunk = string.chunk(1).unwrap();

    results.dispose();
    assert!(results.is_disposed());
    assert!(!chunk.is_valid());
    assert!(matches!(string.chunk_count(), Err(Error::ObjectDisposed { kind: "CompletionResults" })));
    assert!(matches!(chunk.kind(), Err(Error::ObjectDisposed { .. })));
    assert_eq!(live_of("CodeCompleteResults"), 1, "children still hold the buffer");

    drop(result);
    drop(string);
    assert_eq!(live_of("CodeCompleteResults"), 1);
    drop(chunk);
    assert_eq!(live_of("CodeCompleteResults"), 0);
    assert_eq!(live_of("CompletionString"), 0);

    drop(results);
    drop(tu);
    drop(index);
    assert_all_released();
}

/// Test completion failures
#[test]
fn test_completion_errors() {
    let (_index, tu) = parse(PAINT);

    for (file, line) in [("other.c", 1), ("shapes.c", 99)] {
        match tu.code_complete_at(file, line, 1, CompletionOptions::NONE) {
            Err(Error::NativeOperationFailed { operation, code }) => {
                assert_eq!(operation, "tx_code_complete_at");
                assert_eq!(code, NativeErrorCode::Failure);
            }
            other => panic!("expected NativeOperationFailed, got {other:?}"),
        }
    }
    assert!(matches!(
        tu.code_complete_at("shapes\0.c", 1, 1, CompletionOptions::NONE),
        Err(Error::InvalidArgument { name: "filename", .. })
    ));
    assert_eq!(live_of("CodeCompleteResults"), 0);

    tu.dispose();
    assert!(matches!(
        tu.code_complete_at("shapes.c", 6, 9, CompletionOptions::NONE),
        Err(Error::ObjectDisposed { kind: "TranslationUnit" })
    ));
}
