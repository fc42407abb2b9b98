//! Code completion results.
//!
//! [`CompletionResults`] owns one native result buffer and is owned by its
//! translation unit. Everything read from it ([`CompletionResult`],
//! [`CompletionString`], [`CompletionChunk`]) only references memory inside
//! that buffer, so each of those is a reference resource chained below the
//! results: the buffer is released once the results are disposed and the
//! last of them is gone.

use crate::chain::Anchor;
use crate::cursor::CursorKind;
use crate::error::{Error, NativeErrorCode, Result};
use crate::file::owned_string;
use crate::resource::Resource;
use crate::translation_unit::c_string;
use std::ffi::{c_int, c_uint};
use std::fmt;
use std::ops::BitOr;
use tether_log::debug;
use tether_native::*;

/// Options for [`TranslationUnit::code_complete_at`](crate::TranslationUnit::code_complete_at).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompletionOptions(c_uint);

impl CompletionOptions {
    pub const NONE: CompletionOptions = CompletionOptions(TX_COMPLETE_NONE);
    /// Order results by their typed text instead of source order.
    pub const SORT_ALPHABETICAL: CompletionOptions = CompletionOptions(TX_COMPLETE_SORT_ALPHABETICAL);

    #[must_use]
    pub fn bits(self) -> c_uint {
        self.0
    }
}

impl BitOr for CompletionOptions {
    type Output = CompletionOptions;

    fn bitor(self, rhs: CompletionOptions) -> CompletionOptions {
        CompletionOptions(self.0 | rhs.0)
    }
}

/// What a piece of a completion string is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionChunkKind {
    /// The text the user is expected to type.
    TypedText,
    Text,
    /// Context shown to the user but not inserted.
    Informative,
    LeftParen,
    RightParen,
}

impl CompletionChunkKind {
    #[must_use]
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            TX_CHUNK_TYPED_TEXT => Some(CompletionChunkKind::TypedText),
            TX_CHUNK_TEXT => Some(CompletionChunkKind::Text),
            TX_CHUNK_INFORMATIVE => Some(CompletionChunkKind::Informative),
            TX_CHUNK_LEFT_PAREN => Some(CompletionChunkKind::LeftParen),
            TX_CHUNK_RIGHT_PAREN => Some(CompletionChunkKind::RightParen),
            _ => None,
        }
    }
}

fn dispose_results(results: *mut TxCodeCompleteResults) {
    unsafe { tx_dispose_code_complete_results(results) };
}

/// Completions offered at one position of a translation unit.
///
/// # Example
///
/// ```rust
/// use tether::{CompletionOptions, Index};
///
/// let index = Index::new().unwrap();
/// let tu = index.parse("main.c", "fn paint\nfn print\nvar p\n").unwrap();
/// let results = tu.code_complete_at("main.c", 3, 6, CompletionOptions::NONE).unwrap();
///
/// let names: Vec<String> = results
///     .results()
///     .unwrap()
///     .iter()
///     .map(|result| result.completion_string().unwrap().typed_text().unwrap().unwrap())
///     .collect();
/// assert_eq!(names, ["paint", "print", "p"]);
/// ```
pub struct CompletionResults {
    handle: Resource<*mut TxCodeCompleteResults>,
    len: usize,
}

impl CompletionResults {
    pub(crate) fn complete_at(
        tu: &Resource<TxTranslationUnit>,
        filename: &str,
        line: u32,
        column: u32,
        options: CompletionOptions,
    ) -> Result<Self> {
        let c_filename = c_string("filename", filename)?;
        let unit = tu.borrow()?;
        let raw = unsafe { tx_code_complete_at(unit.get(), c_filename.as_ptr(), line, column, options.bits()) };
        if raw.is_null() {
            return Err(Error::NativeOperationFailed {
                operation: "tx_code_complete_at",
                code: NativeErrorCode::Failure,
            });
        }
        // SAFETY: non-null results from tx_code_complete_at.
        let len = unsafe { (*raw).num_results } as usize;
        debug!("{len} completion(s) at {filename}:{line}:{column}");
        Ok(CompletionResults {
            handle: Resource::new("CompletionResults", raw, dispose_results, Some(&tu.anchor()))?,
            len,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The result at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] past the end, [`Error::ObjectDisposed`] once
    /// the results or their translation unit are disposed.
    pub fn get(&self, index: usize) -> Result<CompletionResult> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange { index, len: self.len });
        }
        let results = self.handle.borrow()?;
        // SAFETY: the borrow keeps the buffer alive and `index` is in bounds.
        let result = unsafe { *(*results.get()).results.add(index) };
        CompletionResult::new(result, &self.handle.anchor())
    }

    pub fn results(&self) -> Result<Vec<CompletionResult>> {
        (0..self.len).map(|index| self.get(index)).collect()
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

impl fmt::Debug for CompletionResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionResults")
            .field("len", &self.len)
            .field("handle", &self.handle)
            .finish()
    }
}

/// One completion.
pub struct CompletionResult {
    handle: Resource<TxCompletionResult>,
}

impl CompletionResult {
    fn new(result: TxCompletionResult, owner: &Anchor) -> Result<Self> {
        Ok(CompletionResult {
            handle: Resource::reference("CompletionResult", result, owner)?,
        })
    }

    /// Kind of declaration the completion would insert.
    pub fn kind(&self) -> Result<CursorKind> {
        let result = self.handle.borrow()?;
        Ok(CursorKind::from_raw(result.get().cursor_kind))
    }

    pub fn completion_string(&self) -> Result<CompletionString> {
        let result = self.handle.borrow()?;
        CompletionString::new(result.get().completion_string, &self.handle.anchor())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for CompletionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CompletionResult");
        if let Ok(kind) = self.kind() {
            out.field("kind", &kind);
        }
        out.field("valid", &self.is_valid()).finish()
    }
}

/// The text of a completion, split into chunks.
pub struct CompletionString {
    handle: Resource<TxCompletionString>,
}

impl CompletionString {
    fn new(string: TxCompletionString, owner: &Anchor) -> Result<Self> {
        Ok(CompletionString {
            handle: Resource::reference("CompletionString", string, owner)?,
        })
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let string = self.handle.borrow()?;
        Ok(unsafe { tx_completion_num_chunks(string.get()) } as usize)
    }

    pub fn chunk(&self, index: usize) -> Result<CompletionChunk> {
        let len = self.chunk_count()?;
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let string = self.handle.borrow()?;
        let chunk = ChunkRef {
            string: string.get(),
            index: index as c_uint,
        };
        CompletionChunk::new(chunk, &self.handle.anchor())
    }

    pub fn chunks(&self) -> Result<Vec<CompletionChunk>> {
        (0..self.chunk_count()?).map(|index| self.chunk(index)).collect()
    }

    /// Text of the first [`CompletionChunkKind::TypedText`] chunk.
    pub fn typed_text(&self) -> Result<Option<String>> {
        for chunk in self.chunks()? {
            if chunk.kind()? == Some(CompletionChunkKind::TypedText) {
                return chunk.text().map(Some);
            }
        }
        Ok(None)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for CompletionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionString")
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[derive(Clone, Copy)]
struct ChunkRef {
    string: TxCompletionString,
    index: c_uint,
}

/// One piece of a [`CompletionString`].
pub struct CompletionChunk {
    handle: Resource<ChunkRef>,
}

impl CompletionChunk {
    fn new(chunk: ChunkRef, owner: &Anchor) -> Result<Self> {
        Ok(CompletionChunk {
            handle: Resource::reference("CompletionChunk", chunk, owner)?,
        })
    }

    pub fn kind(&self) -> Result<Option<CompletionChunkKind>> {
        let chunk = self.handle.borrow()?;
        let ChunkRef { string, index } = chunk.get();
        Ok(CompletionChunkKind::from_raw(unsafe { tx_completion_chunk_kind(string, index) }))
    }

    pub fn text(&self) -> Result<String> {
        let chunk = self.handle.borrow()?;
        let ChunkRef { string, index } = chunk.get();
        // SAFETY: the borrow keeps the results that own the text alive.
        Ok(unsafe { owned_string(tx_completion_chunk_text(string, index)) })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for CompletionChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CompletionChunk");
        if let Ok(Some(kind)) = self.kind() {
            out.field("kind", &kind);
        }
        if let Ok(text) = self.text() {
            out.field("text", &text);
        }
        out.field("valid", &self.is_valid()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_kind_translation() {
        assert_eq!(
            CompletionChunkKind::from_raw(TX_CHUNK_TYPED_TEXT),
            Some(CompletionChunkKind::TypedText)
        );
        assert_eq!(
            CompletionChunkKind::from_raw(TX_CHUNK_RIGHT_PAREN),
            Some(CompletionChunkKind::RightParen)
        );
        assert_eq!(CompletionChunkKind::from_raw(-1), None);
    }

    #[test]
    fn test_options_combine() {
        let options = CompletionOptions::NONE | CompletionOptions::SORT_ALPHABETICAL;
        assert_eq!(options, CompletionOptions::SORT_ALPHABETICAL);
        assert_eq!(CompletionOptions::default().bits(), 0);
    }
}
