// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A typed kind on codec errors, so callers and tests can tell a truncated input
//    from a non-canonical one without string matching

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// The classes of failure the codec can report. Everything else (internal
/// logic errors, io) travels with no kind attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    #[error("input truncated")]
    Truncation,
    #[error("reserved pattern")]
    Reserved,
    #[error("non-canonical encoding")]
    NonCanonical,
    #[error("value out of range")]
    OutOfRange,
    #[error("allocation failed")]
    Alloc,
    #[error("unsupported format version")]
    UnsupportedVersion,
}

#[derive(Debug)]
#[allow(dead_code)]
pub struct Error {
    kind: Option<ErrorKind>,
    err: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "ssk", "{:?}", err);
        let err = DynBacktraceError::from(err);
        Error { kind: None, err }
    }

    pub fn with_kind<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "ssk", "{}: {:?}", kind, err);
        let err = DynBacktraceError::from(err);
        Error {
            kind: Some(kind),
            err,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    let err = SimpleErr(msg.into());
    Error::new(err)
}

pub fn codec_err(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    let err = SimpleErr(msg.into());
    Error::with_kind(kind, err)
}

#[test]
fn test_error() {
    let _err = err("test error");
}

#[test]
fn test_error_kind() {
    let e = codec_err(ErrorKind::Truncation, "ran off the end");
    assert_eq!(e.kind(), Some(ErrorKind::Truncation));
    let e = err("no kind");
    assert_eq!(e.kind(), None);
}
