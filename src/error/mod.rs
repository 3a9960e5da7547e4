//! Error taxonomy for `p2pxfer`.
//!
//! Mirrors the error-wrapping approach used throughout this codebase's
//! networking layer: a single `Error` type carrying an `ErrorKind`, plus
//! extension traits that let call sites attach a kind to any `Result`
//! with `.wrapped(kind)` / `.simple(kind)` instead of constructing
//! `Error` values by hand everywhere.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// Extension of the standard library's `Result` type, used to wrap its
/// error in a `p2pxfer::error::Error`, keeping the original error as the
/// source.
pub trait ResultWrappedExt {
    type T;

    fn wrapped_msg(self, kind: ErrorKind, msg: &str) -> Result<Self::T>;
    fn wrapped(self, kind: ErrorKind) -> Result<Self::T>;
}

/// Extension of the standard library's `Result` type used when we want
/// to drop the underlying error value (e.g. it doesn't implement `Send`,
/// or carrying it adds no useful context).
pub trait ResultSimpleExt {
    type T;

    fn simple(self, kind: ErrorKind) -> Result<Self::T>;
    fn simple_msg(self, kind: ErrorKind, msg: &str) -> Result<Self::T>;
}

impl<T, E> ResultWrappedExt for result::Result<T, E>
where
    E: Into<Box<dyn error::Error + Send + Sync>>,
{
    type T = T;

    fn wrapped(self, kind: ErrorKind) -> Result<Self::T> {
        self.map_err(|e| Error::wrapped(kind, e))
    }

    fn wrapped_msg(self, kind: ErrorKind, msg: &str) -> Result<Self::T> {
        self.map_err(|e| Error::wrapped(kind, format!("{}: {}", msg, e.into())))
    }
}

impl<T, E> ResultSimpleExt for result::Result<T, E> {
    type T = T;

    fn simple(self, kind: ErrorKind) -> Result<Self::T> {
        self.map_err(|_| Error::simple(kind))
    }

    fn simple_msg(self, kind: ErrorKind, msg: &str) -> Result<Self::T> {
        self.map_err(|_| Error::wrapped(kind, msg.to_string()))
    }
}

/// Wrapper result type used throughout this crate.
pub type Result<T> = result::Result<T, Error>;

/// The error type used throughout `p2pxfer`.
pub struct Error {
    inner: ErrorInner,
}

enum ErrorInner {
    Simple(ErrorKind),
    Wrapped(ErrorKind, Box<dyn error::Error + Send + Sync>),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Simple(k) => write!(f, "Error::Simple({:?})", k),
            ErrorInner::Wrapped(k, e) => write!(f, "Error::Wrapped({:?}, {:?})", k, e),
        }
    }
}

impl Error {
    /// Returns an error not wrapping another error value, with the given
    /// `ErrorKind`.
    pub fn simple(kind: ErrorKind) -> Self {
        Error {
            inner: ErrorInner::Simple(kind),
        }
    }

    /// Wraps an arbitrary error in an `Error` of the given `ErrorKind`.
    pub fn wrapped<E>(kind: ErrorKind, e: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            inner: ErrorInner::Wrapped(kind, e.into()),
        }
    }

    /// An `Unexpected`-kind error carrying a message describing the
    /// invariant that was violated. Used in place of `panic!`/`unwrap()`
    /// at invariant-check sites; never unwinds.
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Error::wrapped(ErrorKind::Unexpected, msg.into())
    }

    /// Returns the `ErrorKind` of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::Simple(k) => *k,
            ErrorInner::Wrapped(k, _) => *k,
        }
    }

    /// Swaps the `ErrorKind` of this error, keeping any wrapped source.
    pub fn swap_kind(self, k: ErrorKind) -> Self {
        let inner = match self.inner {
            ErrorInner::Simple(_) => ErrorInner::Simple(k),
            ErrorInner::Wrapped(_, e) => ErrorInner::Wrapped(k, e),
        };
        Error { inner }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Simple(k) => write!(f, "{}", k),
            ErrorInner::Wrapped(k, e) => write!(f, "{}: {}", k, e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::wrapped(ErrorKind::Io, e)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.inner {
            ErrorInner::Simple(_) => None,
            ErrorInner::Wrapped(_, e) => Some(e.as_ref()),
        }
    }
}

/// One entry per row of the error taxonomy in spec.md §7.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Bad input: short identifier, short secret, non-directory target, ...
    Validation,
    /// Transient I/O: stream reset, read timeout, connect failure.
    /// Recovered at the lowest possible layer; only escapes as an error
    /// once a cancellation has made retrying pointless.
    Io,
    /// Fatal I/O: can't open a local file, permission denied on output.
    IoFatal,
    /// Unexpected packet, payload overflow, offset mismatch during close.
    Protocol,
    /// Absolute path in archive, path escape, absolute symlink target,
    /// unsupported entry type.
    Archive,
    /// Secret hash mismatch.
    Authentication,
    /// User interrupt or context cancellation.
    Cancellation,
    /// Invariant violation. Never silently swallowed.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation error",
            ErrorKind::Io => "i/o error",
            ErrorKind::IoFatal => "fatal i/o error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Archive => "archive error",
            ErrorKind::Authentication => "authentication error",
            ErrorKind::Cancellation => "canceled",
            ErrorKind::Unexpected => "unexpected error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_preserves_kind_and_source() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let e: Result<()> = Err(io_err).wrapped(ErrorKind::IoFatal);
        let e = e.unwrap_err();
        assert_eq!(e.kind(), ErrorKind::IoFatal);
        assert!(e.to_string().contains("boom"));
    }

    #[test]
    fn simple_drops_source() {
        let e: Result<()> = Err("whatever").simple(ErrorKind::Validation);
        assert_eq!(e.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn swap_kind_keeps_message() {
        let e = Error::wrapped(ErrorKind::Io, "disk on fire").swap_kind(ErrorKind::IoFatal);
        assert_eq!(e.kind(), ErrorKind::IoFatal);
        assert!(e.to_string().contains("disk on fire"));
    }
}
