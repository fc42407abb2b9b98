//! Translation unit model built by the line-oriented front end.
//!
//! The grammar is deliberately tiny:
//!
//! ```text
//! #include "name.h"     quoted inclusion
//! #include <name.h>     angled inclusion
//! fn NAME               function declaration
//! struct NAME           struct declaration
//! field NAME            field declaration
//! var NAME              variable declaration
//! use NAME              reference to an entity
//! // ...                comment
//! ```
//!
//! Two leading spaces nest a line under the previous line one level up.
//! Anything else produces a diagnostic but does not fail the parse.

use crate::abi::*;
use std::ffi::{CString, c_int, c_uint};

pub(crate) struct FileEntry {
    pub name: CString,
}

pub(crate) struct Inclusion {
    pub file: usize,
    pub line: u32,
    pub angled: bool,
}

pub(crate) struct Node {
    pub kind: c_int,
    pub name: CString,
    pub usr: CString,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub line: u32,
    pub column: u32,
    /// Column of the name after the keyword.
    pub name_column: u32,
}

pub(crate) struct TokenRecord {
    pub kind: c_int,
    pub line: u32,
    pub column: u32,
}

/// Everything the engine knows about one parsed source file.
///
/// Files are boxed so `TxFile` pointers stay stable for the life of the unit.
pub(crate) struct Model {
    /// Index 0 is always the main file.
    pub files: Vec<Box<FileEntry>>,
    pub inclusions: Vec<Inclusion>,
    /// Index 0 is the translation unit root.
    pub nodes: Vec<Node>,
    pub spellings: Vec<CString>,
    pub tokens: Vec<TokenRecord>,
    pub diagnostics: Vec<CString>,
    /// Raw source lines, for completion.
    pub lines: Vec<String>,
}

fn cstring(text: &str) -> CString {
    // Lines come from a C string, so they cannot contain interior NULs.
    CString::new(text).unwrap_or_default()
}

fn usr_prefix(kind: c_int) -> &'static str {
    match kind {
        TX_CURSOR_FUNCTION => "F",
        TX_CURSOR_STRUCT => "S",
        TX_CURSOR_FIELD => "FI",
        TX_CURSOR_VARIABLE => "V",
        _ => "",
    }
}

fn token_kind(word: &str) -> c_int {
    match word {
        "fn" | "struct" | "field" | "var" | "use" | "include" => TX_TOKEN_KEYWORD,
        _ if word.starts_with('"') || word.starts_with('<') => TX_TOKEN_LITERAL,
        _ if word.chars().all(|c| c.is_ascii_punctuation()) => TX_TOKEN_PUNCTUATION,
        _ => TX_TOKEN_IDENTIFIER,
    }
}

impl Model {
    pub fn parse(filename: &str, source: &str) -> Model {
        let mut model = Model {
            files: vec![Box::new(FileEntry { name: cstring(filename) })],
            inclusions: Vec::new(),
            nodes: vec![Node {
                kind: TX_CURSOR_TRANSLATION_UNIT,
                name: cstring(filename),
                usr: CString::default(),
                parent: None,
                children: Vec::new(),
                line: 0,
                column: 0,
                name_column: 0,
            }],
            spellings: Vec::new(),
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            lines: source.lines().map(str::to_owned).collect(),
        };

        // Most recent node at each depth; depth 0 is the root.
        let mut scope: Vec<u32> = vec![0];

        for (number, raw) in source.lines().enumerate() {
            let line = number as u32 + 1;
            let trimmed = raw.trim_start();
            let indent = raw.len() - trimmed.len();
            let trimmed = trimmed.trim_end();

            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            model.tokenize_line(trimmed, line, indent as u32 + 1);

            if let Some(target) = trimmed.strip_prefix("#include") {
                model.add_inclusion(target.trim(), line);
                continue;
            }

            let mut words = trimmed.split_whitespace();
            let keyword = words.next();
            let kind = match keyword {
                Some("fn") => TX_CURSOR_FUNCTION,
                Some("struct") => TX_CURSOR_STRUCT,
                Some("field") => TX_CURSOR_FIELD,
                Some("var") => TX_CURSOR_VARIABLE,
                Some("use") => TX_CURSOR_REFERENCE,
                _ => TX_CURSOR_INVALID,
            };
            let name = words.next();

            let (kind, name) = match (kind, name) {
                (TX_CURSOR_INVALID, _) | (_, None) => {
                    model
                        .diagnostics
                        .push(cstring(&format!("{filename}:{line}: unrecognized line '{trimmed}'")));
                    continue;
                }
                (kind, Some(name)) => (kind, name),
            };

            let depth = (indent / 2).min(scope.len() - 1);
            scope.truncate(depth + 1);
            let parent = scope[depth];

            let keyword_len = keyword.map_or(0, str::len);
            let name_offset = trimmed[keyword_len..].find(name).map_or(0, |at| at + keyword_len);
            let id = model.nodes.len() as u32;
            let usr = if kind == TX_CURSOR_REFERENCE {
                CString::default()
            } else {
                cstring(&format!("c:@{}@{name}", usr_prefix(kind)))
            };
            model.nodes.push(Node {
                kind,
                name: cstring(name),
                usr,
                parent: Some(parent),
                children: Vec::new(),
                line,
                column: indent as u32 + 1,
                name_column: (indent + name_offset) as u32 + 1,
            });
            model.nodes[parent as usize].children.push(id);
            scope.push(id);
        }

        model
    }

    fn add_inclusion(&mut self, target: &str, line: u32) {
        let (name, angled) = if let Some(inner) = target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            (inner, true)
        } else if let Some(inner) = target.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            (inner, false)
        } else {
            self.diagnostics
                .push(cstring(&format!("line {line}: malformed #include '{target}'")));
            return;
        };

        let file = match self.files.iter().position(|f| f.name.as_bytes() == name.as_bytes()) {
            Some(existing) => existing,
            None => {
                self.files.push(Box::new(FileEntry { name: cstring(name) }));
                self.files.len() - 1
            }
        };
        self.inclusions.push(Inclusion { file, line, angled });
    }

    fn tokenize_line(&mut self, text: &str, line: u32, first_column: u32) {
        let mut column = first_column;
        let mut rest = text;
        while !rest.is_empty() {
            let start = rest.len() - rest.trim_start().len();
            column += start as u32;
            rest = &rest[start..];
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            let word = &rest[..end];
            let word = word.strip_prefix('#').map_or(word, |w| {
                // `#include` is two tokens: the hash and the directive.
                self.push_token("#", TX_TOKEN_PUNCTUATION, line, column);
                column += 1;
                w
            });
            if !word.is_empty() {
                self.push_token(word, token_kind(word), line, column);
            }
            column += word.len() as u32;
            rest = &rest[end..];
        }
    }

    fn push_token(&mut self, spelling: &str, kind: c_int, line: u32, column: u32) {
        self.spellings.push(cstring(spelling));
        self.tokens.push(TokenRecord { kind, line, column });
    }

    pub fn file_ptr(&self, index: usize) -> TxFile {
        &*self.files[index] as *const FileEntry as TxFile
    }

    pub fn location(&self, line: u32, column: u32) -> TxSourceLocation {
        TxSourceLocation {
            file: self.file_ptr(0),
            line: line as c_uint,
            column: column as c_uint,
        }
    }

    /// The identifier characters immediately before `column` on `line`.
    /// `None` if the position is outside the source.
    pub fn prefix_at(&self, line: u32, column: u32) -> Option<&str> {
        let text = self.lines.get((line as usize).checked_sub(1)?)?;
        let end = (column as usize).checked_sub(1)?;
        let before = text.get(..end.min(text.len()))?;
        let start = before
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(0, |at| at + 1);
        Some(&before[start..])
    }

    /// Declarations whose name starts with `prefix`, first declaration of
    /// each name only, in source order.
    pub fn completions(&self, prefix: &str) -> Vec<u32> {
        let mut seen: Vec<&[u8]> = Vec::new();
        let mut found = Vec::new();
        for id in self.preorder() {
            let node = &self.nodes[id as usize];
            let name = node.name.as_bytes();
            if node.kind == TX_CURSOR_REFERENCE || !name.starts_with(prefix.as_bytes()) || seen.contains(&name) {
                continue;
            }
            seen.push(name);
            found.push(id);
        }
        found
    }

    /// Node ids in source order, root excluded.
    pub fn preorder(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<u32> = self.nodes[0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id as usize].children.iter().rev().copied());
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "#include \"util.h\"\n#include <stdio.h>\nstruct Point\n  field x\n  field y\nfn main\n  use Point\n???\n";

    #[test]
    fn test_parse_builds_nested_tree() {
        let model = Model::parse("main.c", SOURCE);

        let root = &model.nodes[0];
        assert_eq!(root.children.len(), 2);

        let point = &model.nodes[root.children[0] as usize];
        assert_eq!(point.kind, TX_CURSOR_STRUCT);
        assert_eq!(point.name.to_str().unwrap(), "Point");
        assert_eq!(point.usr.to_str().unwrap(), "c:@S@Point");
        assert_eq!(point.children.len(), 2);

        let main = &model.nodes[root.children[1] as usize];
        assert_eq!(main.children.len(), 1);
        assert_eq!(model.nodes[main.children[0] as usize].kind, TX_CURSOR_REFERENCE);
    }

    #[test]
    fn test_parse_records_inclusions_and_files() {
        let model = Model::parse("main.c", SOURCE);

        assert_eq!(model.files.len(), 3);
        assert_eq!(model.inclusions.len(), 2);
        assert!(!model.inclusions[0].angled);
        assert!(model.inclusions[1].angled);
        assert_eq!(model.inclusions[1].line, 2);
    }

    #[test]
    fn test_unrecognized_lines_become_diagnostics() {
        let model = Model::parse("main.c", SOURCE);
        assert_eq!(model.diagnostics.len(), 1);
        assert!(model.diagnostics[0].to_str().unwrap().contains("???"));
    }

    #[test]
    fn test_tokens_split_directive_hash() {
        let model = Model::parse("a.c", "#include \"b.h\"\nfn go\n");
        let spelled: Vec<&str> = model.spellings.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(spelled, ["#", "include", "\"b.h\"", "fn", "go"]);
        assert_eq!(model.tokens[0].kind, TX_TOKEN_PUNCTUATION);
        assert_eq!(model.tokens[1].kind, TX_TOKEN_KEYWORD);
        assert_eq!(model.tokens[2].kind, TX_TOKEN_LITERAL);
        assert_eq!(model.tokens[4].kind, TX_TOKEN_IDENTIFIER);
        assert_eq!(model.tokens[4].column, 4);
    }

    #[test]
    fn test_preorder_matches_source_order() {
        let model = Model::parse("main.c", SOURCE);
        let names: Vec<&str> = model
            .preorder()
            .into_iter()
            .map(|id| model.nodes[id as usize].name.to_str().unwrap())
            .collect();
        assert_eq!(names, ["Point", "x", "y", "main", "Point"]);
    }

    #[test]
    fn test_name_column_skips_keyword() {
        let model = Model::parse("main.c", "fn  main\n  use main\n");
        assert_eq!(model.nodes[1].name_column, 5);
        assert_eq!(model.nodes[2].column, 3);
        assert_eq!(model.nodes[2].name_column, 7);
    }

    #[test]
    fn test_prefix_and_completions() {
        let model = Model::parse("main.c", "struct Point\n  field px\nfn paint\n  use Po\n");
        assert_eq!(model.prefix_at(4, 9), Some("Po"));
        assert_eq!(model.prefix_at(4, 7), Some(""));
        assert_eq!(model.prefix_at(9, 1), None);

        let names: Vec<&str> = model
            .completions("p")
            .into_iter()
            .map(|id| model.nodes[id as usize].name.to_str().unwrap())
            .collect();
        assert_eq!(names, ["px", "paint"]);
        assert_eq!(model.completions("Po").len(), 1, "references are not candidates");
    }
}
