//! Files and source locations.

use crate::chain::Anchor;
use crate::error::Result;
use crate::resource::Resource;
use std::ffi::{CStr, c_char};
use std::fmt;
use tether_native::{TxFile, TxSourceLocation, TxSourceRange, tx_file_name};

/// Copies a native string. Null becomes the empty string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub(crate) unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// A source file known to a translation unit.
///
/// Files are owned by whatever produced them: the translation unit when
/// enumerating inclusions, or the callback scope during indexing.
pub struct File {
    handle: Resource<TxFile>,
}

impl File {
    pub(crate) fn new(file: TxFile, owner: &Anchor) -> Result<Self> {
        Ok(File {
            handle: Resource::reference("File", file, owner)?,
        })
    }

    /// The file's name as the translation unit spelled it.
    pub fn name(&self) -> Result<String> {
        let file = self.handle.borrow()?;
        // SAFETY: the borrow keeps the owning translation unit alive.
        Ok(unsafe { owned_string(tx_file_name(file.get())) })
    }

    /// Whether the file can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }

    #[must_use]
    pub fn anchor(&self) -> Anchor {
        self.handle.anchor()
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File").field("handle", &self.handle).finish()
    }
}

/// A position in a source file.
///
/// Copied out of native memory when created, so it stays readable after
/// everything it came from is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// # Safety
    ///
    /// `location.file` must be null or a live file handle.
    pub(crate) unsafe fn from_native(location: TxSourceLocation) -> Self {
        Location {
            file: unsafe { owned_string(tx_file_name(location.file)) },
            line: location.line,
            column: location.column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A span of source text, `end` one past its last character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub start: Location,
    pub end: Location,
}

impl SourceRange {
    /// # Safety
    ///
    /// Both file pointers must be null or live file handles.
    pub(crate) unsafe fn from_native(range: TxSourceRange) -> Self {
        SourceRange {
            start: unsafe { Location::from_native(range.start) },
            end: unsafe { Location::from_native(range.end) },
        }
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.start, self.end.line, self.end.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_owned_string_handles_null() {
        assert_eq!(unsafe { owned_string(std::ptr::null()) }, "");
        let text = CString::new("main.c").unwrap();
        assert_eq!(unsafe { owned_string(text.as_ptr()) }, "main.c");
    }

    #[test]
    fn test_location_display() {
        let location = Location {
            file: "main.c".into(),
            line: 3,
            column: 5,
        };
        assert_eq!(location.to_string(), "main.c:3:5");

        let range = SourceRange {
            end: Location { column: 9, ..location.clone() },
            start: location,
        };
        assert_eq!(range.to_string(), "main.c:3:5-3:9");
    }
}
