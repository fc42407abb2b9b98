//! Error types for `tether`.
//!
//! Every recoverable failure is an [`Error`]. Contract violations (disposing a
//! borrowed resource, resolving a dead callback token, unpinning twice) are
//! not errors: they mean this crate's own invariants were broken, so they are
//! logged and turned into panics by [`contract_violation`].

use std::ffi::c_int;
use std::fmt;
use tether_native::{
    TX_ERROR_AST_READ_ERROR, TX_ERROR_CRASHED, TX_ERROR_FAILURE, TX_ERROR_INVALID_ARGUMENTS,
    TX_ERROR_SUCCESS,
};

/// Boxed error returned by user callbacks during a traversal.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error code reported by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorCode {
    /// Generic failure.
    Failure,
    /// The library crashed while handling the request.
    Crashed,
    /// The library rejected the arguments.
    InvalidArguments,
    /// Serialized input could not be read.
    AstReadError,
    /// A code this crate does not know about.
    Unknown(c_int),
}

impl NativeErrorCode {
    /// Translates a raw native code. Returns `None` for success.
    #[must_use]
    pub fn from_raw(code: c_int) -> Option<Self> {
        match code {
            TX_ERROR_SUCCESS => None,
            TX_ERROR_FAILURE => Some(NativeErrorCode::Failure),
            TX_ERROR_CRASHED => Some(NativeErrorCode::Crashed),
            TX_ERROR_INVALID_ARGUMENTS => Some(NativeErrorCode::InvalidArguments),
            TX_ERROR_AST_READ_ERROR => Some(NativeErrorCode::AstReadError),
            other => Some(NativeErrorCode::Unknown(other)),
        }
    }

    /// The raw native value of this code.
    #[must_use]
    pub fn raw(self) -> c_int {
        match self {
            NativeErrorCode::Failure => TX_ERROR_FAILURE,
            NativeErrorCode::Crashed => TX_ERROR_CRASHED,
            NativeErrorCode::InvalidArguments => TX_ERROR_INVALID_ARGUMENTS,
            NativeErrorCode::AstReadError => TX_ERROR_AST_READ_ERROR,
            NativeErrorCode::Unknown(code) => code,
        }
    }
}

impl fmt::Display for NativeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeErrorCode::Failure => write!(f, "failure"),
            NativeErrorCode::Crashed => write!(f, "crashed"),
            NativeErrorCode::InvalidArguments => write!(f, "invalid arguments"),
            NativeErrorCode::AstReadError => write!(f, "AST read error"),
            NativeErrorCode::Unknown(code) => write!(f, "unknown error code {code}"),
        }
    }
}

/// Errors that can occur while working with native resources.
#[derive(Debug)]
pub enum Error {
    /// A borrow was attempted against a resource (or an ancestor of it) that
    /// has already been disposed.
    ObjectDisposed {
        /// Kind of the disposed resource.
        kind: &'static str,
    },

    /// A resource was created with an owner that is already disposed.
    DisposedAncestor {
        /// Kind of the disposed owner.
        kind: &'static str,
    },

    /// `try_dispose` was called while borrows were outstanding.
    InUse {
        /// Kind of the borrowed resource.
        kind: &'static str,
        /// Number of outstanding borrows.
        borrows: u32,
    },

    /// Native storage for a resource could not be obtained.
    OutOfMemory,

    /// The native library reported an error.
    NativeOperationFailed {
        /// Name of the native operation.
        operation: &'static str,
        /// Code returned by the library.
        code: NativeErrorCode,
    },

    /// An argument was rejected before it reached native code.
    InvalidArgument {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Element lookup past the end of a native array.
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of elements.
        len: usize,
    },

    /// A user callback failed during a traversal. The traversal was stopped
    /// and this error surfaced once the native call returned.
    Handler(HandlerError),
}

impl Error {
    /// Whether this error means a resource in the chain is gone.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::ObjectDisposed { .. } | Error::DisposedAncestor { .. })
    }

    pub(crate) fn native(operation: &'static str, code: c_int) -> Result<()> {
        match NativeErrorCode::from_raw(code) {
            None => Ok(()),
            Some(code) => Err(Error::NativeOperationFailed { operation, code }),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ObjectDisposed { kind } => write!(f, "{kind} has been disposed"),
            Error::DisposedAncestor { kind } => {
                write!(f, "cannot create a resource owned by disposed {kind}")
            }
            Error::InUse { kind, borrows } => {
                write!(f, "{kind} is in use by {borrows} outstanding borrow(s)")
            }
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::NativeOperationFailed { operation, code } => {
                write!(f, "{operation} failed: {code}")
            }
            Error::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for {len} element(s)")
            }
            Error::Handler(source) => write!(f, "callback handler failed: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Handler(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for `tether` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports a broken invariant of this crate and panics.
///
/// Never returns; the message always starts with `contract violation:` so
/// tests and crash reports can tell these apart from ordinary panics.
#[track_caller]
pub(crate) fn contract_violation(message: fmt::Arguments<'_>) -> ! {
    tether_log::error!("contract violation: {message}");
    panic!("contract violation: {message}");
}
