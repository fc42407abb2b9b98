// Common test utilities for tether integration tests
//
// Sources, handlers and native bookkeeping checks shared by the
// integration tests.

#![allow(dead_code)]

use std::any::Any;
use tether::{ContainerResult, HandlerResult, IncludedFile, IndexDeclaration, IndexEntityReference, IndexHandler};
use tether::{Diagnostics, File, Index, TranslationUnit};

/// A file with inclusions, nested declarations, references and one
/// unparseable line.
pub const SHAPES: &str = "\
#include \"point.h\"
#include <math.h>
struct Point
  field x
  field y
fn area
  use Point
var origin
???
";

/// A file whose only reference is to a declaration that comes later.
pub const FORWARD: &str = "\
fn main
  use helper
fn helper
";

/// Number of native handles still alive on this thread.
pub fn live() -> usize {
    tether_native::live_handles()
}

pub fn live_of(kind: &str) -> usize {
    tether_native::live_handles_of(kind)
}

/// Asserts that every native handle created on this thread was released.
#[track_caller]
pub fn assert_all_released() {
    assert_eq!(live(), 0, "native handles leaked");
}

pub fn parse(source: &str) -> (Index, TranslationUnit) {
    let index = Index::new().unwrap();
    let tu = index.parse("shapes.c", source).unwrap();
    (index, tu)
}

/// Records every event as a line of text.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<String>,
}

impl IndexHandler for Recorder {
    fn started_translation_unit(&mut self, _state: Option<&dyn Any>) -> ContainerResult {
        self.events.push("start".into());
        Ok(None)
    }

    fn entered_main_file(&mut self, _state: Option<&dyn Any>, file: &File) -> HandlerResult {
        self.events.push(format!("main {}", file.name()?));
        Ok(())
    }

    fn included_file(&mut self, _state: Option<&dyn Any>, include: &IncludedFile) -> HandlerResult {
        let angled = if include.is_angled()? { "angled" } else { "quoted" };
        self.events.push(format!("include {} {angled}", include.filename()?));
        Ok(())
    }

    fn declaration(&mut self, _state: Option<&dyn Any>, declaration: &IndexDeclaration) -> HandlerResult {
        let entity = declaration.entity()?;
        self.events.push(format!("decl {} {}", entity.name()?, entity.usr()?));
        Ok(())
    }

    fn entity_reference(&mut self, _state: Option<&dyn Any>, reference: &IndexEntityReference) -> HandlerResult {
        let entity = reference.referenced_entity()?;
        self.events.push(format!("ref {}", entity.name()?));
        Ok(())
    }

    fn diagnostics(&mut self, _state: Option<&dyn Any>, diagnostics: &Diagnostics) -> HandlerResult {
        for message in diagnostics.messages()? {
            self.events.push(format!("diag {message}"));
        }
        Ok(())
    }
}
