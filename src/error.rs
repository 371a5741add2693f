//! Every fallible call in this crate returns a [`std::io::Result`].
//! When the failure comes from the cache's own bookkeeping rather
//! than from the operating system, the [`std::io::Error`] wraps a
//! [`CacheError`] that callers may recover with
//! [`CacheError::from_io`].
use std::io::Error;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// Structured causes for errors raised by the cache itself.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A configuration value is out of range (e.g., a zero
    /// `max_size` or `value_count`).
    #[error("invalid cache configuration: {0}")]
    InvalidArgument(&'static str),

    /// Keys become file names: they must be non-empty, and may not
    /// contain whitespace separators or path separators.
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    /// The cache was closed (or deleted); only `close` and `delete`
    /// remain valid.
    #[error("cache is closed")]
    Closed,

    /// The journal could not be parsed.  `open` never surfaces this
    /// error: it discards the cache directory instead.
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    /// The editor does not own its entry anymore: it was already
    /// committed or aborted, or the cache was closed under it.
    #[error("editor for key {0:?} is not the entry's current editor")]
    StaleEditor(String),

    /// A newly created entry must write every value before its first
    /// commit.
    #[error("newly created entry {key:?} did not write a value for index {index}")]
    MissingValue { key: String, index: usize },

    /// Value indices live in `0..value_count`.
    #[error("value index {index} out of range for {value_count} values per entry")]
    ValueIndex { index: usize, value_count: usize },

    /// A published value file could not be deleted; the size
    /// accounting would diverge from the filesystem.
    #[error("failed to delete {path:?}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: Error,
    },
}

impl CacheError {
    /// Returns the [`CacheError`] wrapped in `error`, if any.
    pub fn from_io(error: &Error) -> Option<&CacheError> {
        error.get_ref()?.downcast_ref::<CacheError>()
    }

    fn kind(&self) -> ErrorKind {
        match self {
            CacheError::InvalidArgument(_) | CacheError::InvalidKey(_) => ErrorKind::InvalidInput,
            CacheError::ValueIndex { .. } => ErrorKind::InvalidInput,
            CacheError::CorruptJournal(_) => ErrorKind::InvalidData,
            CacheError::DeleteFailed { source, .. } => source.kind(),
            CacheError::Closed | CacheError::StaleEditor(_) | CacheError::MissingValue { .. } => {
                ErrorKind::Other
            }
        }
    }
}

impl From<CacheError> for Error {
    fn from(error: CacheError) -> Error {
        Error::new(error.kind(), error)
    }
}

#[test]
fn test_round_trip_through_io() {
    let error: Error = CacheError::InvalidKey("a b".to_string()).into();

    assert_eq!(error.kind(), ErrorKind::InvalidInput);
    assert!(matches!(
        CacheError::from_io(&error),
        Some(CacheError::InvalidKey(key)) if key == "a b"
    ));
}

#[test]
fn test_kinds() {
    let closed: Error = CacheError::Closed.into();
    assert_eq!(closed.kind(), ErrorKind::Other);

    let corrupt: Error = CacheError::CorruptJournal("bad magic".to_string()).into();
    assert_eq!(corrupt.kind(), ErrorKind::InvalidData);

    // Plain OS errors don't carry a `CacheError`.
    let os = Error::from(ErrorKind::NotFound);
    assert!(CacheError::from_io(&os).is_none());
}
