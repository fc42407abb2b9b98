//! Parsed translation units.

use crate::callback;
use crate::chain::Anchor;
use crate::completion::{CompletionOptions, CompletionResults};
use crate::cursor::Cursor;
use crate::error::{Error, HandlerError, Result};
use crate::file::{File, Location};
use crate::resource::Resource;
use crate::token::TokenSet;
use crate::traversal::Traversal;
use std::ffi::{CString, c_uint, c_void};
use std::fmt;
use std::ptr;
use std::rc::Rc;
use tether_log::debug;
use tether_native::*;

fn dispose_unit(tu: TxTranslationUnit) {
    unsafe { tx_dispose_translation_unit(tu) };
}

pub(crate) fn c_string(name: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|err| Error::InvalidArgument {
        name,
        reason: format!("contains a NUL byte at offset {}", err.nul_position()),
    })
}

/// One parsed source file and everything derived from it.
///
/// Owned by its [`Index`](crate::Index); owns the cursors, token sets and
/// files obtained from it.
pub struct TranslationUnit {
    handle: Resource<TxTranslationUnit>,
    filename: String,
}

impl TranslationUnit {
    pub(crate) fn parse(index: &Resource<TxIndex>, filename: &str, source: &str) -> Result<Self> {
        let c_filename = c_string("filename", filename)?;
        let c_source = c_string("source", source)?;

        let index_ref = index.borrow()?;
        let mut raw = ptr::null_mut();
        let code = unsafe {
            tx_parse_translation_unit(index_ref.get(), c_filename.as_ptr(), c_source.as_ptr(), &mut raw)
        };
        Error::native("tx_parse_translation_unit", code)?;
        if raw.is_null() {
            return Err(Error::OutOfMemory);
        }

        let handle = Resource::new("TranslationUnit", raw, dispose_unit, Some(&index.anchor()))?;
        debug!("parsed translation unit {filename}");
        Ok(TranslationUnit {
            handle,
            filename: filename.to_owned(),
        })
    }

    /// Name the unit was parsed under.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Cursor for the whole unit.
    pub fn cursor(&self) -> Result<Cursor> {
        let tu = self.handle.borrow()?;
        let raw = unsafe { tx_get_translation_unit_cursor(tu.get()) };
        Cursor::new(raw, &self.handle.anchor())
    }

    /// Tokenizes the whole unit.
    pub fn tokenize(&self) -> Result<TokenSet> {
        TokenSet::tokenize(&self.handle)
    }

    /// Completes the identifier that ends just before `line`:`column` of
    /// `filename`. The results are owned by this unit.
    ///
    /// # Errors
    ///
    /// [`Error::NativeOperationFailed`] if `filename` is not the unit's main
    /// file or the position is outside it.
    pub fn code_complete_at(
        &self,
        filename: &str,
        line: u32,
        column: u32,
        options: CompletionOptions,
    ) -> Result<CompletionResults> {
        CompletionResults::complete_at(&self.handle, filename, line, column, options)
    }

    /// Calls `visitor` for the main file and then for every included file.
    ///
    /// `stack` holds the location of each `#include` leading to the file,
    /// innermost first; it is empty for the main file. Files are owned by
    /// this unit, so the visitor may keep them.
    ///
    /// # Errors
    ///
    /// The first error returned by `visitor` skips the remaining files and
    /// is returned as [`Error::Handler`].
    pub fn enumerate_included_files<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(File, &[Location]) -> std::result::Result<(), HandlerError>,
    {
        let tu = self.handle.borrow()?;
        let session = Rc::new(InclusionSession {
            visitor: &mut visitor as *mut F as *mut c_void,
            owner: self.handle.anchor(),
            traversal: Traversal::new("tx_get_inclusions"),
        });
        let pinned = callback::pin(Rc::clone(&session));

        session.traversal.start();
        unsafe { tx_get_inclusions(tu.get(), visit_inclusion::<F>, pinned.as_ptr()) };
        drop(pinned);

        session.traversal.finish(Ok(()))
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

    pub(crate) fn handle(&self) -> &Resource<TxTranslationUnit> {
        &self.handle
    }
}

impl fmt::Debug for TranslationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationUnit")
            .field("filename", &self.filename)
            .field("handle", &self.handle)
            .finish()
    }
}

struct InclusionSession {
    /// `&mut F` of the running `enumerate_included_files` call.
    visitor: *mut c_void,
    owner: Anchor,
    traversal: Traversal,
}

unsafe extern "C" fn visit_inclusion<F>(
    file: TxFile,
    stack: *const TxSourceLocation,
    stack_len: c_uint,
    client_data: TxClientData,
) where
    F: FnMut(File, &[Location]) -> std::result::Result<(), HandlerError>,
{
    let session = callback::resolve_ptr::<InclusionSession>(client_data);
    session.traversal.callback(|| {
        let file = File::new(file, &session.owner)?;
        let stack: Vec<Location> = if stack.is_null() {
            Vec::new()
        } else {
            // SAFETY: native code passes `stack_len` locations, valid for
            // this call.
            unsafe { std::slice::from_raw_parts(stack, stack_len as usize) }
                .iter()
                .map(|location| unsafe { Location::from_native(*location) })
                .collect()
        };
        session.traversal.invoking_handler();
        // SAFETY: `enumerate_included_files` is blocked in the native call.
        let visitor = unsafe { &mut *(session.visitor as *mut F) };
        visitor(file, &stack).map_err(Error::Handler)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_string_rejects_nul() {
        match c_string("source", "fn a\0b") {
            Err(Error::InvalidArgument { name, reason }) => {
                assert_eq!(name, "source");
                assert!(reason.contains("offset 4"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(c_string("source", "fn a").is_ok());
    }
}
