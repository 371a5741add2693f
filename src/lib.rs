//! This crate implements a bounded persistent cache stored in a
//! filesystem directory, with a least-recently-used eviction
//! strategy.  Each cache entry is identified by a string key, and
//! holds a fixed number of byte values, each in its own file.
//!
//! Unlike caches that rely on filesystem metadata for their
//! bookkeeping, every state change goes through an append-only
//! journal.  That's what makes the cache crash-safe: on open, the
//! journal is replayed to rebuild the entry table, and any edit that
//! was in flight when the process died is rolled back, along with its
//! files.  A journal that can't be replayed (e.g., it was written by a
//! different application version, or is garbled) is not an error:
//! the cache directory is simply wiped and starts over.
//!
//! The journal only grows, so the cache periodically rewrites it to a
//! minimal equivalent journal, once redundant records outnumber live
//! entries (and exceed [`DEFAULT_REDUNDANT_OP_THRESHOLD`], by
//! default).  Like trimming the cache back to its size budget, that
//! maintenance runs on a background thread, so caches are expected to
//! temporarily grow past their size limit.
//!
//! All bookkeeping happens under a single lock per cache, but value
//! bytes are always read and written outside that lock, through plain
//! [`std::fs::File`] objects.  Readers get a [`Snapshot`], which opens
//! every value file of the entry at once: later commits or removals
//! never affect an existing snapshot.  Writers get an [`Editor`],
//! which writes new values to temporary files, and atomically renames
//! them into place on commit.  There is at most one editor per key at
//! any time.
//!
//! Write errors while filling a new value are not reported to the
//! caller: a cache should never be the reason a program fails.  The
//! [`ValueWriter`] remembers the failure, and the eventual commit
//! drops the entry instead of publishing garbage.
//!
//! Only one [`Cache`] (and its clones) may use a given directory at a
//! time: the cache does not lock its directory, and concurrent
//! journals would clobber each other.
//!
//! # Sample usage
//!
//! ```no_run
//! # fn main() -> std::io::Result<()> {
//! use std::io::Write;
//!
//! const APP_VERSION: u32 = 1;
//! const VALUE_COUNT: usize = 2;
//! const MAX_SIZE: u64 = 10 * 1024 * 1024;
//!
//! let cache = disk_journal_cache::Cache::open("/tmp/image_cache", APP_VERSION, VALUE_COUNT, MAX_SIZE)?;
//!
//! if let Some(mut editor) = cache.edit("thumbnail-42")? {
//!     editor.new_writer(0)?.write_all(b"...image bytes...")?;
//!     editor.set(1, "image/png")?;
//!     editor.commit()?;
//! }
//!
//! if let Some(mut snapshot) = cache.get("thumbnail-42")? {
//!     assert_eq!(snapshot.get_string(1)?, "image/png");
//! }
//!
//! cache.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Cache directory structure
//!
//! The cache directory holds the `journal`, and, for each value
//! `index` of an entry `key`, the published value file `key.index`.
//! While an editor is writing a new value, it lives in `key.index.tmp`
//! until commit.  Journal rebuilds write to `journal.tmp` before
//! renaming it over the `journal`.
//!
//! Keys become file names, so they must not be empty, `.` or `..`,
//! and must not contain spaces, line terminators, slashes,
//! backslashes, or NUL bytes: operations on such keys fail with
//! `ErrorKind::InvalidInput`.
mod benign_error;
mod cache;
mod cleanup;
mod editor;
mod entry_table;
mod error;
mod journal;
mod snapshot;

pub use cache::Cache;
pub use cache::CacheBuilder;
pub use cache::DEFAULT_REDUNDANT_OP_THRESHOLD;
pub use editor::Editor;
pub use editor::ValueWriter;
pub use error::CacheError;
pub use snapshot::Snapshot;

use std::io::Result;

/// Returns whether `key` can be used as the stem of a file name in
/// the cache directory, and as a single token in the journal.
pub(crate) fn is_valid_key(key: &str) -> bool {
    fn is_forbidden(c: char) -> bool {
        matches!(c, ' ' | '\n' | '\r' | '/' | '\\' | '\0')
    }

    !(key.is_empty() || key == "." || key == ".." || key.contains(is_forbidden))
}

/// Fails with `ErrorKind::InvalidInput` unless `key` is valid.
pub(crate) fn check_key(key: &str) -> Result<()> {
    if !is_valid_key(key) {
        return Err(CacheError::InvalidKey(key.to_owned()).into());
    }

    Ok(())
}

#[test]
fn test_check_key() {
    use std::io::ErrorKind;

    for key in &["a", "some-key_1", "with.dots", ".hidden", "ünïcode"] {
        assert!(check_key(key).is_ok(), "{:?} must be accepted", key);
    }

    for key in &[
        "", ".", "..", "a b", "a\nb", "a\r", "a/b", "a\\b", "a\0b", " ",
    ] {
        let err = check_key(key).expect_err("key must be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
