//! The [`Cache`] engine owns the entry table and the journal writer
//! for one cache directory.  Every bookkeeping transition happens
//! under a single cache-wide lock, and appends its journal record
//! before releasing that lock, so the journal order is always the
//! lock acquisition order.  Value bytes are copied outside the lock,
//! through the files handed out by [`Snapshot`] and [`Editor`].
//!
//! Trimming down to `max_size` and compacting the journal happen on a
//! background thread (see [`crate::cleanup`]) after `get`, `commit`,
//! or `remove` crosses a threshold; `flush` and `close` trim inline.
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Error;
use std::io::Result;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use derivative::Derivative;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::benign_error::ensure_file_removed;
use crate::benign_error::is_absent_file_error;
use crate::benign_error::open_if_present;
use crate::check_key;
use crate::cleanup;
use crate::cleanup::CleanupQueue;
use crate::entry_table::clean_file;
use crate::entry_table::dirty_file;
use crate::entry_table::EditorSlot;
use crate::entry_table::EntryTable;
use crate::error::CacheError;
use crate::journal;
use crate::journal::Header;
use crate::journal::JournalReader;
use crate::journal::Record;
use crate::journal::JOURNAL_FILE;
use crate::journal::JOURNAL_FILE_TEMP;
use crate::Editor;
use crate::Snapshot;

/// Compact the journal once it holds at least this many redundant
/// records (and at least as many as there are live entries).
pub const DEFAULT_REDUNDANT_OP_THRESHOLD: usize = 2000;

/// An `EvictionListener` is called with the key of each entry that
/// the cache evicts to stay within its size budget.
type EvictionListener =
    Arc<dyn Fn(&str) + Sync + Send + std::panic::RefUnwindSafe + std::panic::UnwindSafe>;

/// Configures and opens a [`Cache`].
///
/// The builder defaults to an application version of 1 and one value
/// per entry, and compacts the journal after
/// [`DEFAULT_REDUNDANT_OP_THRESHOLD`] redundant records.  There is no
/// default `max_size`: opening fails until one is set.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct CacheBuilder {
    directory: PathBuf,
    app_version: u32,
    value_count: usize,
    max_size: u64,
    redundant_op_threshold: usize,

    #[derivative(Debug = "ignore")]
    eviction_listener: Option<EvictionListener>,
}

/// A `Cache` is a handle on a bounded, journaled cache directory.
/// Each entry is a key with `value_count` byte values, each stored in
/// its own file.  Handles are cheap to clone, and all clones share the
/// same state.
///
/// Opening the same directory twice in one process is not detected,
/// and neither is sharing a directory between processes: the journals
/// will interleave and state will be lost.  Don't.
#[derive(Clone, Debug)]
pub struct Cache {
    pub(crate) inner: Arc<Inner>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Inner {
    pub(crate) directory: PathBuf,
    app_version: u32,
    pub(crate) value_count: usize,
    redundant_op_threshold: usize,

    #[derivative(Debug = "ignore")]
    eviction_listener: Option<EvictionListener>,

    pub(crate) state: Mutex<State>,
    cleanup: CleanupQueue,
}

/// Everything guarded by the cache-wide lock.
#[derive(Debug)]
pub(crate) struct State {
    table: EntryTable,
    // `None` once the cache is closed.
    journal: Option<BufWriter<File>>,
    // Sum of the published lengths of every entry.  May exceed
    // `max_size` until the next trim.
    size: u64,
    max_size: u64,
    // Journal records written since the last rebuild that the
    // rebuilt journal would not need.
    redundant_op_count: usize,
    // Starts at 1: entries replayed from the journal have sequence
    // number 0, and must look stale after any commit.
    next_sequence_number: u64,
    next_editor_id: u64,
}

impl CacheBuilder {
    /// Returns a builder for a cache in `directory`.
    pub fn new(directory: impl AsRef<Path>) -> CacheBuilder {
        CacheBuilder {
            directory: directory.as_ref().to_owned(),
            app_version: 1,
            value_count: 1,
            max_size: 0,
            redundant_op_threshold: DEFAULT_REDUNDANT_OP_THRESHOLD,
            eviction_listener: None,
        }
    }

    /// Sets the application's own cache format version.  Opening a
    /// directory written with a different version discards its
    /// contents.
    pub fn app_version(mut self, app_version: u32) -> Self {
        self.app_version = app_version;
        self
    }

    /// Sets the number of values (files) per entry; must be positive.
    pub fn value_count(mut self, value_count: usize) -> Self {
        self.value_count = value_count;
        self
    }

    /// Sets the maximum total size of the values, in bytes; must be
    /// positive.
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the number of redundant journal records that triggers a
    /// journal rebuild.
    pub fn redundant_op_threshold(mut self, threshold: usize) -> Self {
        self.redundant_op_threshold = threshold;
        self
    }

    /// Sets a function to call with the key of each entry evicted to
    /// satisfy the size budget.  The function runs after the cache
    /// lock is released, so it may call back into the cache.
    pub fn eviction_listener(
        mut self,
        listener: impl Fn(&str)
            + Sync
            + Send
            + std::panic::RefUnwindSafe
            + std::panic::UnwindSafe
            + 'static,
    ) -> Self {
        self.eviction_listener = Some(Arc::new(listener));
        self
    }

    /// Opens the cache, replaying its journal if there is one.
    ///
    /// Fails with `ErrorKind::InvalidInput`, before any I/O, if
    /// `max_size` or `value_count` is zero.  A journal that can't be
    /// replayed is not an error: the directory is wiped and the cache
    /// starts empty.
    pub fn open(self) -> Result<Cache> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidArgument("max_size must be positive").into());
        }

        if self.value_count == 0 {
            return Err(CacheError::InvalidArgument("value_count must be positive").into());
        }

        let header = Header {
            app_version: self.app_version,
            value_count: self.value_count,
        };

        let state = match State::replay(&self.directory, header, self.max_size) {
            Ok(Some(state)) => state,
            Ok(None) => State::create(&self.directory, header, self.max_size)?,
            Err(e) => {
                warn!(
                    directory = %self.directory.display(),
                    error = %e,
                    "discarding cache with unreadable journal"
                );
                remove_directory(&self.directory)?;
                State::create(&self.directory, header, self.max_size)?
            }
        };

        debug!(
            directory = %self.directory.display(),
            entries = state.table.len(),
            size = state.size,
            "opened cache"
        );

        let (queue, receiver) = cleanup::channel();
        let inner = Arc::new(Inner {
            directory: self.directory,
            app_version: self.app_version,
            value_count: self.value_count,
            redundant_op_threshold: self.redundant_op_threshold,
            eviction_listener: self.eviction_listener,
            state: Mutex::new(state),
            cleanup: queue,
        });

        let weak = Arc::downgrade(&inner);
        receiver.spawn(move || match weak.upgrade() {
            Some(inner) => {
                inner.cleanup_in_background();
                true
            }
            None => false,
        })?;

        Ok(Cache { inner })
    }
}

/// Recursively deletes `dir`; succeeds if it's already gone.
fn remove_directory(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if is_absent_file_error(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

impl State {
    fn new(value_count: usize, max_size: u64) -> State {
        State {
            table: EntryTable::new(value_count),
            journal: None,
            size: 0,
            max_size,
            redundant_op_count: 0,
            next_sequence_number: 1,
            next_editor_id: 0,
        }
    }

    /// Rebuilds the state for `dir` from its journal.  Returns `None`
    /// if there is no journal, and fails if it can't be replayed.
    fn replay(dir: &Path, header: Header, max_size: u64) -> Result<Option<State>> {
        let file = match open_if_present(&dir.join(JOURNAL_FILE))? {
            Some(file) => file,
            None => return Ok(None),
        };

        let mut state = State::new(header.value_count, max_size);
        let mut reader = JournalReader::new(BufReader::new(file), header)?;
        let mut line_count: usize = 0;

        while let Some(record) = reader.next_record()? {
            state.table.apply(&record)?;
            line_count += 1;
        }

        state.size = state.table.discard_incomplete(dir)?;
        state.redundant_op_count = line_count.saturating_sub(state.table.len());

        if reader.is_truncated() {
            // Appending after a partial line would corrupt the next
            // record; start over from a clean journal.
            debug!(directory = %dir.display(), "rebuilding truncated journal");
            state.rebuild_journal(dir, header)?;
        } else {
            state.journal = Some(journal::open_for_append(&dir.join(JOURNAL_FILE))?);
        }

        Ok(Some(state))
    }

    /// Returns a fresh empty state, with a new journal in `dir`.
    fn create(dir: &Path, header: Header, max_size: u64) -> Result<State> {
        std::fs::create_dir_all(dir)?;

        let mut state = State::new(header.value_count, max_size);
        state.rebuild_journal(dir, header)?;
        Ok(state)
    }

    fn check_open(&self) -> Result<()> {
        if self.journal.is_some() {
            Ok(())
        } else {
            Err(CacheError::Closed.into())
        }
    }

    fn journal(&mut self) -> Result<&mut BufWriter<File>> {
        self.journal
            .as_mut()
            .ok_or_else(|| Error::from(CacheError::Closed))
    }

    /// Appends `record` to the journal buffer.
    fn append(&mut self, record: Record) -> Result<()> {
        record.write_to(self.journal()?)
    }

    fn flush_journal(&mut self) -> Result<()> {
        self.journal()?.flush()
    }

    fn journal_rebuild_required(&self, threshold: usize) -> bool {
        self.redundant_op_count >= threshold && self.redundant_op_count >= self.table.len()
    }

    fn needs_cleanup(&self, threshold: usize) -> bool {
        self.size > self.max_size || self.journal_rebuild_required(threshold)
    }

    /// Atomically replaces the journal in `dir` with the minimal one
    /// for the current table, and appends to the new journal from
    /// now on.  On failure, the old journal and its writer stay in
    /// place.
    fn rebuild_journal(&mut self, dir: &Path, header: Header) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
        }

        let temp = dir.join(JOURNAL_FILE_TEMP);
        let path = dir.join(JOURNAL_FILE);

        journal::write_journal(&temp, header, self.table.records())?;
        // Open the new journal before it replaces the old one: on
        // failure, the current writer still appends to the live journal.
        let appender = journal::open_for_append(&temp)?;
        std::fs::rename(&temp, &path)?;

        self.journal = Some(appender);
        self.redundant_op_count = 0;
        Ok(())
    }

    /// Grants an editor for `key`.  Returns `None` if another editor
    /// holds the entry, or if `expected_sequence_number` is set and
    /// the entry has moved on.
    fn begin_edit(
        &mut self,
        key: &str,
        expected_sequence_number: Option<u64>,
    ) -> Result<Option<u64>> {
        self.check_open()?;

        if let Some(expected) = expected_sequence_number {
            match self.table.get(key) {
                Some(entry) if entry.sequence_number == expected => {}
                _ => return Ok(None),
            }
        }

        let id = self.next_editor_id;
        let entry = self.table.get_or_insert(key);
        if entry.current_editor.is_some() {
            return Ok(None);
        }

        entry.current_editor = Some(EditorSlot::Live(id));
        self.next_editor_id += 1;

        // The DIRTY line must hit the file before the caller can write
        // anything, so that a crash leaves a trace to clean up.
        if let Err(e) = self
            .append(Record::Dirty { key })
            .and_then(|()| self.flush_journal())
        {
            match self.table.get_mut(key) {
                Some(entry) if entry.readable => entry.current_editor = None,
                _ => {
                    self.table.remove(key);
                }
            }

            return Err(e);
        }

        Ok(Some(id))
    }

    /// Checks that editor `id` still holds `key`, and returns whether
    /// the entry is readable.
    pub(crate) fn check_editor(&self, key: &str, id: u64) -> Result<bool> {
        self.check_open()?;
        match self.table.get(key) {
            Some(entry) if entry.current_editor == Some(EditorSlot::Live(id)) => Ok(entry.readable),
            _ => Err(CacheError::StaleEditor(key.to_owned()).into()),
        }
    }

    /// Completes the edit of `key` by editor `id`: publishes the dirty
    /// files if `success`, and discards them otherwise.
    ///
    /// `written[i]` tells whether the editor opened a writer for value
    /// `i`; a first publish must write every value.
    pub(crate) fn complete_edit(
        &mut self,
        dir: &Path,
        key: &str,
        id: u64,
        written: &[bool],
        success: bool,
    ) -> Result<()> {
        let readable = self.check_editor(key, id)?;

        if success && !readable {
            for (index, written) in written.iter().enumerate() {
                if !written {
                    self.finish_edit(dir, key, false)?;
                    return Err(CacheError::MissingValue {
                        key: key.to_owned(),
                        index,
                    }
                    .into());
                }

                // The writer may have failed to create its file.
                if !dirty_file(dir, key, index).exists() {
                    return self.finish_edit(dir, key, false);
                }
            }
        }

        self.finish_edit(dir, key, success)
    }

    /// Publishes (or discards) the dirty files of `key`, whatever
    /// editor holds it, and releases the entry.
    fn finish_edit(&mut self, dir: &Path, key: &str, success: bool) -> Result<()> {
        let entry = match self.table.get_mut(key) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        for index in 0..entry.lengths.len() {
            let dirty = dirty_file(dir, key, index);

            if !success {
                ensure_file_removed(&dirty)?;
                continue;
            }

            // Values the editor didn't touch keep their last published
            // file.
            let published = match std::fs::metadata(&dirty) {
                Ok(metadata) => std::fs::rename(&dirty, clean_file(dir, key, index))
                    .map(|()| metadata.len()),
                Err(e) if is_absent_file_error(&e) => continue,
                Err(e) => Err(e),
            };

            match published {
                Ok(new_length) => {
                    self.size = self.size.saturating_sub(entry.lengths[index]) + new_length;
                    entry.lengths[index] = new_length;
                }
                Err(e) => {
                    // A first publish is all or nothing: retract the
                    // values renamed so far.  The caller still holds the
                    // entry, and aborts it next.
                    if !entry.readable {
                        for retracted in 0..index {
                            let clean = clean_file(dir, key, retracted);
                            if let Err(error) = ensure_file_removed(&clean) {
                                warn!(
                                    path = %clean.display(),
                                    error = %error,
                                    "failed to retract partially published value"
                                );
                            }

                            self.size = self.size.saturating_sub(entry.lengths[retracted]);
                            entry.lengths[retracted] = 0;
                        }
                    }

                    return Err(e);
                }
            }
        }

        self.redundant_op_count += 1;
        entry.current_editor = None;

        if entry.readable || success {
            entry.readable = true;
            if success {
                entry.sequence_number = self.next_sequence_number;
                self.next_sequence_number += 1;
            }

            let lengths = entry.lengths.clone();
            self.append(Record::Clean { key, lengths })?;
        } else {
            self.table.remove(key);
            self.append(Record::Remove { key })?;
        }

        self.flush_journal()
    }

    /// Deletes the published files for `key` and forgets the entry.
    /// Returns false if there is no such entry, or if an editor holds
    /// it.
    fn remove(&mut self, dir: &Path, key: &str) -> Result<bool> {
        self.check_open()?;

        let entry = match self.table.get_mut(key) {
            Some(entry) if entry.current_editor.is_none() => entry,
            _ => return Ok(false),
        };

        for index in 0..entry.lengths.len() {
            let path = clean_file(dir, key, index);

            if let Err(source) = ensure_file_removed(&path) {
                return Err(CacheError::DeleteFailed { path, source }.into());
            }

            self.size = self.size.saturating_sub(entry.lengths[index]);
            entry.lengths[index] = 0;
        }

        self.redundant_op_count += 1;
        self.append(Record::Remove { key })?;
        self.table.remove(key);
        Ok(true)
    }

    /// Evicts least recently used entries until the cache fits in
    /// `max_size`.  Returns the evicted keys, in eviction order.
    fn trim_to_size(&mut self, dir: &Path) -> Result<Vec<String>> {
        let mut evicted = Vec::new();

        while self.size > self.max_size {
            let key = match self.table.eviction_candidate() {
                Some(key) => key.to_owned(),
                // Everything left is held by an editor.
                None => break,
            };

            self.remove(dir, &key)?;
            debug!(key = %key, size = self.size, "evicted cache entry");
            evicted.push(key);
        }

        Ok(evicted)
    }
}

impl Inner {
    fn header(&self) -> Header {
        Header {
            app_version: self.app_version,
            value_count: self.value_count,
        }
    }

    /// Queues a background cleanup if `state` calls for one.
    pub(crate) fn schedule_cleanup_if_needed(&self, state: &State) {
        if state.needs_cleanup(self.redundant_op_threshold) {
            self.cleanup.submit();
        }
    }

    fn notify_evicted(&self, evicted: Vec<String>) {
        if let Some(listener) = self.eviction_listener.as_ref() {
            for key in evicted {
                listener(&key);
            }
        }
    }

    /// Trims the cache, and rebuilds the journal if it has accumulated
    /// enough redundant records.  A no-op once the cache is closed.
    fn cleanup(&self) -> Result<()> {
        let evicted = {
            let mut state = self.state.lock();
            if state.journal.is_none() {
                return Ok(());
            }

            let evicted = state.trim_to_size(&self.directory)?;
            if state.journal_rebuild_required(self.redundant_op_threshold) {
                debug!(
                    directory = %self.directory.display(),
                    redundant_ops = state.redundant_op_count,
                    entries = state.table.len(),
                    "rebuilding journal"
                );
                state.rebuild_journal(&self.directory, self.header())?;
            }

            evicted
        };

        self.notify_evicted(evicted);
        Ok(())
    }

    /// Runs on the cleanup thread: failures are logged and dropped,
    /// and the next threshold crossing retries.
    fn cleanup_in_background(&self) {
        if let Err(e) = self.cleanup() {
            warn!(
                directory = %self.directory.display(),
                error = %e,
                "background cache cleanup failed"
            );
        }
    }

    pub(crate) fn complete_edit(
        &self,
        key: &str,
        id: u64,
        written: &[bool],
        success: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let ret = state.complete_edit(&self.directory, key, id, written, success);

        self.schedule_cleanup_if_needed(&state);
        ret
    }

    /// Commits a failed edit: the partial values are discarded, and so
    /// is any previously published value for the same key.
    pub(crate) fn fail_edit(&self, key: &str, id: u64) -> Result<()> {
        let mut state = self.state.lock();
        let ret = state
            .complete_edit(&self.directory, key, id, &[], false)
            .and_then(|()| state.remove(&self.directory, key).map(|_| ()));

        self.schedule_cleanup_if_needed(&state);
        ret
    }
}

impl Cache {
    /// Opens the cache in `directory`, creating it if necessary.
    ///
    /// `app_version` identifies the caller's own format: a journal
    /// written with another version is discarded.  Each entry has
    /// `value_count` values, and the cache aims to keep the total size
    /// of all values at or below `max_size` bytes.
    ///
    /// See [`CacheBuilder`] for more options.
    pub fn open(
        directory: impl AsRef<Path>,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> Result<Cache> {
        CacheBuilder::new(directory)
            .app_version(app_version)
            .value_count(value_count)
            .max_size(max_size)
            .open()
    }

    /// Returns a snapshot of the entry for `key`, or `None` if there
    /// is no readable entry, or if any of its files has gone missing.
    ///
    /// Fails with `ErrorKind::InvalidInput` if `key` is invalid
    /// (empty, `.` or `..`, or containing a space, a line terminator,
    /// or a path separator).
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        check_key(key)?;

        let inner = &self.inner;
        let mut state = inner.state.lock();
        state.check_open()?;

        let (sequence_number, lengths) = match state.table.get(key) {
            Some(entry) if entry.readable => (entry.sequence_number, entry.lengths.clone()),
            _ => return Ok(None),
        };

        // Open every file now, so that the snapshot can't observe a
        // later commit or removal.
        let mut files = Vec::with_capacity(inner.value_count);
        for index in 0..inner.value_count {
            match open_if_present(&clean_file(&inner.directory, key, index))? {
                Some(file) => files.push(file),
                None => return Ok(None),
            }
        }

        state.table.touch(key);
        state.redundant_op_count += 1;
        state.append(Record::Read { key })?;
        inner.schedule_cleanup_if_needed(&state);

        Ok(Some(Snapshot::new(
            self.clone(),
            key.to_owned(),
            sequence_number,
            files,
            lengths,
        )))
    }

    /// Returns an editor for `key`, or `None` if another edit is in
    /// progress for the same key.
    ///
    /// Fails with `ErrorKind::InvalidInput` if `key` is invalid.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        self.edit_version(key, None)
    }

    pub(crate) fn edit_version(
        &self,
        key: &str,
        expected_sequence_number: Option<u64>,
    ) -> Result<Option<Editor>> {
        check_key(key)?;

        let granted = self
            .inner
            .state
            .lock()
            .begin_edit(key, expected_sequence_number)?;

        Ok(granted.map(|id| Editor::new(self.clone(), key.to_owned(), id)))
    }

    /// Deletes the entry for `key`.  Returns false if there is no such
    /// entry, or if it is being edited.
    ///
    /// Fails if any of the entry's files can't be deleted.
    pub fn remove(&self, key: &str) -> Result<bool> {
        check_key(key)?;

        let inner = &self.inner;
        let mut state = inner.state.lock();
        let removed = state.remove(&inner.directory, key)?;

        if removed {
            inner.schedule_cleanup_if_needed(&state);
        }

        Ok(removed)
    }

    /// Trims the cache down to its size budget and flushes the journal
    /// to the operating system.
    pub fn flush(&self) -> Result<()> {
        let inner = &self.inner;
        let evicted = {
            let mut state = inner.state.lock();
            state.check_open()?;

            let evicted = state.trim_to_size(&inner.directory)?;
            state.flush_journal()?;
            evicted
        };

        inner.notify_evicted(evicted);
        Ok(())
    }

    /// Closes the cache: aborts any edit still in progress, trims the
    /// cache, and closes the journal.  Closing a closed cache is a
    /// no-op.
    ///
    /// The journal is closed even if a step fails; the first error is
    /// returned.
    pub fn close(&self) -> Result<()> {
        let inner = &self.inner;
        let (result, evicted) = {
            let mut state = inner.state.lock();
            if state.journal.is_none() {
                return Ok(());
            }

            let held: Vec<String> = state
                .table
                .iter()
                .filter(|(_, entry)| entry.current_editor.is_some())
                .map(|(key, _)| key.to_owned())
                .collect();

            let mut result = Ok(());
            for key in held {
                result = result.and(state.finish_edit(&inner.directory, &key, false));
            }

            let evicted = match state.trim_to_size(&inner.directory) {
                Ok(evicted) => evicted,
                Err(e) => {
                    result = result.and(Err(e));
                    Vec::new()
                }
            };

            if let Some(mut journal) = state.journal.take() {
                result = result.and(journal.flush());
            }

            (result, evicted)
        };

        inner.cleanup.shutdown();
        debug!(directory = %inner.directory.display(), "closed cache");
        inner.notify_evicted(evicted);
        result
    }

    /// Closes the cache and deletes its directory, including any file
    /// that the cache did not create.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        remove_directory(&self.inner.directory)
    }

    /// Returns the total size of the published values, in bytes.  This
    /// may exceed the maximum size until the next trim.
    pub fn size(&self) -> u64 {
        self.inner.state.lock().size
    }

    pub fn max_size(&self) -> u64 {
        self.inner.state.lock().max_size
    }

    /// Changes the size budget, and schedules a trim if the cache is
    /// now over budget.
    ///
    /// Fails with `ErrorKind::InvalidInput` if `max_size` is zero.
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(CacheError::InvalidArgument("max_size must be positive").into());
        }

        let mut state = self.inner.state.lock();
        state.max_size = max_size;
        self.inner.schedule_cleanup_if_needed(&state);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().journal.is_none()
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn value_count(&self) -> usize {
        self.inner.value_count
    }
}
