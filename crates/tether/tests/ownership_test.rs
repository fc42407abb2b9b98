// Ownership Chain Integration Tests
//
// These tests verify that native handles are released exactly once, that an
// owner is never released before the resources it owns, and that borrows
// and disposal interact correctly across whole chains.

mod common;

use common::{assert_all_released, live_of, parse};
use std::cell::RefCell;
use tether::{Error, Index, Liveness, Resource};

thread_local! {
    static RELEASED: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

fn record(name: &'static str) {
    RELEASED.with(|r| r.borrow_mut().push(name));
}

fn released() -> Vec<&'static str> {
    RELEASED.with(|r| r.borrow().clone())
}

/// Test that disposing an owner whose child is borrowed is reported
#[test]
fn test_owner_in_use_while_child_borrowed() {
    let a = Resource::new("A", "a", record, None).unwrap();
    let b = Resource::new("B", "b", record, Some(&a.anchor())).unwrap();

    let borrow = b.borrow().unwrap();
    assert_eq!(borrow.get(), "b");

    match a.try_dispose() {
        Err(Error::InUse { kind, borrows }) => {
            assert_eq!(kind, "A");
            assert_eq!(borrows, 1);
        }
        other => panic!("expected InUse, got {other:?}"),
    }
    assert!(released().is_empty(), "nothing may be released while borrowed");

    drop(borrow);
    a.dispose();
    b.dispose();
    assert_eq!(released(), ["b", "a"]);
}

/// Test that explicit disposal of a borrowed ancestor is a contract violation
#[test]
#[should_panic(expected = "contract violation: A disposed while 1 borrow(s) are outstanding")]
fn test_explicit_dispose_of_borrowed_ancestor_panics() {
    let a = Resource::new("A", "a", record, None).unwrap();
    let b = Resource::new("B", "b", record, Some(&a.anchor())).unwrap();
    let _borrow = b.borrow().unwrap();
    a.dispose();
}

/// Test that a translation unit outlives a disposed index
#[test]
fn test_index_released_after_translation_unit() {
    let (index, tu) = parse("fn main\n");

    index.dispose();
    assert!(index.is_disposed());
    assert_eq!(live_of("Index"), 1, "index must wait for its translation unit");

    match tu.cursor() {
        Err(Error::ObjectDisposed { kind }) => assert_eq!(kind, "Index"),
        other => panic!("expected ObjectDisposed, got {other:?}"),
    }

    drop(tu);
    assert_all_released();
}

/// Test that a token set keeps its translation unit alive natively
#[test]
fn test_token_set_outlives_disposed_translation_unit() {
    let (index, tu) = parse("var counter\n");
    let tokens = tu.tokenize().unwrap();
    assert_eq!(tokens.len(), 2);

    tu.dispose();
    assert_eq!(live_of("TranslationUnit"), 1);
    assert_eq!(live_of("TokenBuffer"), 1);

    match tokens.get(0) {
        Err(Error::ObjectDisposed { kind }) => assert_eq!(kind, "TranslationUnit"),
        other => panic!("expected ObjectDisposed, got {other:?}"),
    }

    // The native library aborts if a unit is disposed before its buffers,
    // so reaching the end proves the order.
    drop(tokens);
    assert_eq!(live_of("TranslationUnit"), 0);
    assert_eq!(live_of("TokenBuffer"), 0);

    drop(tu);
    drop(index);
    assert_all_released();
}

/// Test the four-level chain token -> token set -> unit -> index
#[test]
fn test_four_level_chain() {
    let (index, tu) = parse("fn main\n");
    let tokens = tu.tokenize().unwrap();
    let token = tokens.get(1).unwrap();
    assert_eq!(token.spelling().unwrap(), "main");
    assert_eq!(token.position().unwrap(), (1, 4));

    index.dispose();
    match token.spelling() {
        Err(Error::ObjectDisposed { kind }) => assert_eq!(kind, "Index"),
        other => panic!("expected ObjectDisposed, got {other:?}"),
    }
    assert!(!token.is_valid());

    drop(tokens);
    drop(tu);
    assert_eq!(live_of("TokenBuffer"), 1, "token still holds its buffer");
    drop(token);
    drop(index);
    assert_all_released();
}

/// Test that handles can be dropped in any order
#[test]
fn test_drop_order_does_not_matter() {
    let index = Index::new().unwrap();
    let tu = index.parse("a.c", "fn a\nfn b\n").unwrap();
    let tokens = tu.tokenize().unwrap();
    let cursor = tu.cursor().unwrap();
    let action = index.create_action().unwrap();

    drop(index);
    drop(tu);
    assert_eq!(cursor.spelling().err().map(|e| e.is_disposed()), Some(true));
    drop(action);
    drop(cursor);
    drop(tokens);
    assert_all_released();
}

/// Test that dispose is idempotent and survives the handle being dropped
#[test]
fn test_dispose_idempotent() {
    let (index, tu) = parse("fn main\n");
    tu.dispose();
    tu.dispose();
    assert!(tu.try_dispose().is_ok());
    assert_eq!(live_of("TranslationUnit"), 0);

    index.dispose();
    index.dispose();
    drop(tu);
    drop(index);
    assert_all_released();
}

/// Test operations on disposed resources
#[test]
fn test_disposed_resources_reject_use() {
    let (index, tu) = parse("fn main\n");
    tu.dispose();

    assert!(matches!(tu.tokenize(), Err(Error::ObjectDisposed { kind: "TranslationUnit" })));
    assert!(matches!(tu.cursor(), Err(Error::ObjectDisposed { .. })));

    index.dispose();
    assert!(matches!(index.parse("b.c", "fn b\n"), Err(Error::ObjectDisposed { kind: "Index" })));
    assert!(matches!(index.create_action(), Err(Error::ObjectDisposed { .. })));
}

/// Test that creating under a disposed owner releases the value
#[test]
fn test_create_under_disposed_owner() {
    let owner = Resource::new("Owner", "owner", record, None).unwrap();
    let anchor = owner.anchor();
    owner.dispose();
    assert_eq!(anchor.liveness(), Liveness::Released);

    let result = Resource::new("Child", "child", record, Some(&anchor));
    assert!(matches!(result, Err(Error::DisposedAncestor { kind: "Owner" })));
    assert_eq!(released(), ["owner", "child"]);
}

/// Test native argument validation errors
#[test]
fn test_parse_errors() {
    let index = Index::new().unwrap();

    match index.parse("", "fn a\n") {
        Err(Error::NativeOperationFailed { operation, code }) => {
            assert_eq!(operation, "tx_parse_translation_unit");
            assert_eq!(code, tether::NativeErrorCode::InvalidArguments);
        }
        other => panic!("expected NativeOperationFailed, got {other:?}"),
    }
    assert!(matches!(
        index.parse("a.c", "fn \0a"),
        Err(Error::InvalidArgument { name: "source", .. })
    ));
    assert_eq!(live_of("TranslationUnit"), 0);
}

/// Test cursors and tokens read through their chains
#[test]
fn test_cursor_and_token_queries() {
    let (_index, tu) = parse("struct Point\n  field x\n");
    let root = tu.cursor().unwrap();
    assert_eq!(root.kind().unwrap(), tether::CursorKind::TranslationUnit);
    assert_eq!(root.spelling().unwrap(), "shapes.c");

    let tokens = tu.tokenize().unwrap();
    let spelled: Vec<String> = tokens
        .tokens()
        .unwrap()
        .iter()
        .map(|token| token.spelling().unwrap())
        .collect();
    assert_eq!(spelled, ["struct", "Point", "field", "x"]);
    assert!(matches!(tokens.get(4), Err(Error::IndexOutOfRange { index: 4, len: 4 })));
    assert_eq!(
        tokens.get(0).unwrap().kind().unwrap(),
        Some(tether::TokenKind::Keyword)
    );
}

/// Test that an empty unit tokenizes to an empty set
#[test]
fn test_empty_token_set() {
    let (index, tu) = parse("");
    let tokens = tu.tokenize().unwrap();
    assert!(tokens.is_empty());
    assert_eq!(live_of("TokenBuffer"), 0);
    drop(tokens);
    drop(tu);
    drop(index);
    assert_all_released();
}

/// Test that the precompiled-header flag is stored and read back
#[test]
fn test_index_reports_pch_flag() {
    let plain = Index::new().unwrap();
    let excluding = Index::with_options(true).unwrap();
    assert!(!plain.excludes_declarations_from_pch().unwrap());
    assert!(excluding.excludes_declarations_from_pch().unwrap());

    excluding.dispose();
    assert!(matches!(
        excluding.excludes_declarations_from_pch(),
        Err(Error::ObjectDisposed { kind: "Index" })
    ));
}
