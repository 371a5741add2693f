//! An [`Editor`] holds exclusive write access to one cache entry until
//! it commits or aborts.  New values are written to dirty files next
//! to the published ones, and only renamed into place on commit, so
//! readers never observe a partially written value.
//!
//! Writing to a cache must never take the caller's main data path
//! down with it: the [`ValueWriter`]s handed out by an editor swallow
//! I/O errors, and remember them so that the eventual commit turns
//! into an abort instead.
use std::fs::File;
use std::io::Read;
use std::io::Result;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::benign_error::open_if_present;
use crate::entry_table::clean_file;
use crate::entry_table::dirty_file;
use crate::error::CacheError;
use crate::Cache;

/// Write access to the values of one cache entry.
///
/// Dropping an `Editor` without committing aborts the edit.
#[derive(Debug)]
pub struct Editor {
    cache: Cache,
    key: String,
    id: u64,
    // `written[i]` is set once a writer was opened for value `i`.
    written: Vec<bool>,
    // Shared with every `ValueWriter` this editor handed out.
    has_errors: Arc<AtomicBool>,
    // Set once committed or aborted.
    done: bool,
}

/// A [`Write`] sink for one dirty value file.  Write errors are never
/// returned: they mark the editor as failed, and later writes are
/// silently dropped.
#[derive(Debug)]
pub struct ValueWriter {
    // `None` after the first error.
    file: Option<File>,
    has_errors: Arc<AtomicBool>,
}

impl ValueWriter {
    fn new(file: Option<File>, has_errors: Arc<AtomicBool>) -> ValueWriter {
        if file.is_none() {
            has_errors.store(true, Ordering::Release);
        }

        ValueWriter { file, has_errors }
    }

    fn fail(&mut self) {
        self.file = None;
        self.has_errors.store(true, Ordering::Release);
    }
}

impl Write for ValueWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(file) = self.file.as_mut() {
            match file.write(buf) {
                Ok(written) => return Ok(written),
                Err(_) => self.fail(),
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            if file.flush().is_err() {
                self.fail();
            }
        }

        Ok(())
    }
}

impl Editor {
    pub(crate) fn new(cache: Cache, key: String, id: u64) -> Editor {
        let value_count = cache.inner.value_count;

        Editor {
            cache,
            key,
            id,
            written: vec![false; value_count],
            has_errors: Arc::new(AtomicBool::new(false)),
            done: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let value_count = self.written.len();

        if index < value_count {
            Ok(())
        } else {
            Err(CacheError::ValueIndex { index, value_count }.into())
        }
    }

    /// Returns a writer for a new value at `index`.  The value only
    /// becomes visible once the editor commits; opening a second
    /// writer for the same index starts the value over.
    ///
    /// Fails if the editor no longer holds its entry, or if `index`
    /// is out of range.
    pub fn new_writer(&mut self, index: usize) -> Result<ValueWriter> {
        self.check_index(index)?;

        let inner = &self.cache.inner;
        // Hold the lock until the dirty file exists, so that `close`
        // can't abort the edit between the check and the creation.
        let state = inner.state.lock();
        state.check_editor(&self.key, self.id)?;

        self.written[index] = true;
        let path = dirty_file(&inner.directory, &self.key, index);
        let file = match File::create(&path) {
            Ok(file) => Some(file),
            // Someone may have deleted the cache directory; recreate
            // it once.
            Err(_) => std::fs::create_dir_all(&inner.directory)
                .and_then(|()| File::create(&path))
                .ok(),
        };
        drop(state);

        Ok(ValueWriter::new(file, self.has_errors.clone()))
    }

    /// Returns a reader for the last published value at `index`, or
    /// `None` if the entry was never published.
    pub fn new_reader(&self, index: usize) -> Result<Option<File>> {
        self.check_index(index)?;

        let inner = &self.cache.inner;
        let state = inner.state.lock();
        if !state.check_editor(&self.key, self.id)? {
            return Ok(None);
        }

        open_if_present(&clean_file(&inner.directory, &self.key, index))
    }

    /// Returns the last published value at `index` as a string, or
    /// `None` if the entry was never published.
    pub fn get_string(&self, index: usize) -> Result<Option<String>> {
        match self.new_reader(index)? {
            Some(mut file) => {
                let mut value = String::new();
                file.read_to_string(&mut value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Writes `value` as the new value at `index`.
    pub fn set(&mut self, index: usize, value: &str) -> Result<()> {
        let mut writer = self.new_writer(index)?;

        writer.write_all(value.as_bytes())?;
        writer.flush()
    }

    /// Publishes the values written by this editor, and releases the
    /// entry.  Values without a writer keep their last published
    /// contents.
    ///
    /// If any write failed, the edit is aborted and the entry removed
    /// instead; that is not an error.  Fails if the entry was never
    /// published and a value has no writer, or if the editor no longer
    /// holds its entry (e.g., the cache was closed).
    pub fn commit(mut self) -> Result<()> {
        self.done = true;

        let inner = &self.cache.inner;
        if self.has_errors.load(Ordering::Acquire) {
            return inner.fail_edit(&self.key, self.id);
        }

        let ret = inner.complete_edit(&self.key, self.id, &self.written, true);
        if ret.is_err() {
            // Release the entry if publication failed halfway; a no-op
            // if it was already released.
            let _ = inner.complete_edit(&self.key, self.id, &self.written, false);
        }

        ret
    }

    /// Discards the values written by this editor, and releases the
    /// entry.  A previously published entry keeps its values; a new
    /// entry is removed.
    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.cache
            .inner
            .complete_edit(&self.key, self.id, &self.written, false)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.done {
            let _ = self
                .cache
                .inner
                .complete_edit(&self.key, self.id, &self.written, false);
        }
    }
}
