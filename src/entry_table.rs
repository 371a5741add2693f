//! The entry table is the in-memory image of a cache directory: one
//! [`Entry`] per key, iterated in access order, least recently used
//! first.  The table is rebuilt at open time by replaying the journal
//! (see [`EntryTable::apply`]) and then pruning the entries whose edit
//! never completed (see [`EntryTable::discard_incomplete`]).
//!
//! Each entry owns `value_count` files directly under the cache
//! directory: `$key.$index` for published (clean) values, and
//! `$key.$index.tmp` for values an editor is still writing (dirty).
use std::io::Result;
use std::path::Path;
use std::path::PathBuf;

use linked_hash_map::LinkedHashMap;

use crate::benign_error::ensure_file_removed;
use crate::journal::Record;
use crate::journal::JOURNAL_FILE_TEMP;

/// Identifies the editor that currently holds an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorSlot {
    /// Replayed from a `DIRTY` line without a matching `CLEAN` or
    /// `REMOVE`: the writer died with its process.
    Orphaned,
    /// Held by a live [`crate::Editor`] with this id.
    Live(u64),
}

/// What we know about one cached key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Byte length of each published value file.
    pub lengths: Vec<u64>,
    /// Whether at least one commit published this entry.
    pub readable: bool,
    /// The editor that currently holds this entry, if any.
    pub current_editor: Option<EditorSlot>,
    /// Bumped on every successful commit; lets snapshots detect that
    /// they're stale.
    pub sequence_number: u64,
}

impl Entry {
    fn new(value_count: usize) -> Entry {
        Entry {
            lengths: vec![0; value_count],
            readable: false,
            current_editor: None,
            sequence_number: 0,
        }
    }

    /// Returns the sum of the published value lengths.
    pub fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

/// Returns the path of the published file for value `index` of `key`.
pub fn clean_file(dir: &Path, key: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.{}", key, index))
}

/// Returns the path of the in-progress file for value `index` of `key`.
pub fn dirty_file(dir: &Path, key: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.{}.tmp", key, index))
}

/// Deletes every clean and dirty file for `key`.
fn remove_entry_files(dir: &Path, key: &str, value_count: usize) -> Result<()> {
    for index in 0..value_count {
        ensure_file_removed(&clean_file(dir, key, index))?;
        ensure_file_removed(&dirty_file(dir, key, index))?;
    }

    Ok(())
}

/// An access-ordered map from key to [`Entry`].
#[derive(Debug)]
pub struct EntryTable {
    entries: LinkedHashMap<String, Entry>,
    value_count: usize,
}

impl EntryTable {
    /// Returns an empty table for entries with `value_count` files each.
    pub fn new(value_count: usize) -> EntryTable {
        EntryTable {
            entries: LinkedHashMap::new(),
            value_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up `key` without updating its recency.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Looks up `key` without updating its recency.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    /// Looks up `key` and, if it exists, moves it to the most recently
    /// used end.
    pub fn touch(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_refresh(key)
    }

    /// Returns the entry for `key`, freshly created if necessary; in
    /// both cases, the entry is now the most recently used.
    pub fn get_or_insert(&mut self, key: &str) -> &mut Entry {
        let value_count = self.value_count;

        self.entries.get_refresh(key);
        self.entries
            .entry(key.to_owned())
            .or_insert_with(|| Entry::new(value_count))
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.remove(key)
    }

    /// Iterates over the table, least recently used first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Returns the least recently used key that isn't held by an
    /// editor, if any.
    pub fn eviction_candidate(&self) -> Option<&str> {
        self.iter()
            .find(|(_, entry)| entry.current_editor.is_none())
            .map(|(key, _)| key)
    }

    /// Replays one journal record.
    pub fn apply(&mut self, record: &Record) -> Result<()> {
        match record {
            Record::Remove { key } => {
                self.entries.remove(*key);
            }
            Record::Clean { key, lengths } => {
                let entry = self.get_or_insert(key);

                entry.readable = true;
                entry.current_editor = None;
                entry.lengths.clone_from(lengths);
            }
            Record::Dirty { key } => {
                self.get_or_insert(key).current_editor = Some(EditorSlot::Orphaned);
            }
            Record::Read { key } => {
                self.get_or_insert(key);
            }
        }

        Ok(())
    }

    /// Runs once after a replay: drops every entry whose last edit
    /// never completed (or that was never published), along with its
    /// files in `dir`, and deletes any leftover rebuild scratch file.
    ///
    /// Returns the total size of the surviving entries.
    pub fn discard_incomplete(&mut self, dir: &Path) -> Result<u64> {
        ensure_file_removed(&dir.join(JOURNAL_FILE_TEMP))?;

        let mut size = 0;
        let mut doomed = Vec::new();
        for (key, entry) in self.iter() {
            if entry.readable && entry.current_editor.is_none() {
                size += entry.total_length();
            } else {
                doomed.push(key.to_owned());
            }
        }

        for key in doomed {
            self.entries.remove(&key);
            remove_entry_files(dir, &key, self.value_count)?;
        }

        Ok(size)
    }

    /// Returns the minimal list of records that reproduces this table:
    /// one `DIRTY` line for each entry held by an editor, and one
    /// `CLEAN` line for every other entry, in recency order.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.iter().map(|(key, entry)| {
            if entry.current_editor.is_some() {
                Record::Dirty { key }
            } else {
                Record::Clean {
                    key,
                    lengths: entry.lengths.clone(),
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use crate::entry_table::*;
    use crate::journal::Record;
    use proptest::collection::vec;
    use proptest::prelude::*;
    use proptest_derive::Arbitrary;

    fn keys(table: &EntryTable) -> Vec<&str> {
        table.iter().map(|(key, _)| key).collect()
    }

    fn replay(table: &mut EntryTable, lines: &[&str]) {
        for line in lines {
            let record = Record::parse(line, 2).expect("line must parse");
            table.apply(&record).expect("apply must succeed");
        }
    }

    #[test]
    fn test_file_names() {
        let dir = Path::new("/cache");

        assert_eq!(clean_file(dir, "key", 1), Path::new("/cache/key.1"));
        assert_eq!(dirty_file(dir, "key", 0), Path::new("/cache/key.0.tmp"));
    }

    #[test]
    fn test_replay() {
        let mut table = EntryTable::new(2);

        replay(
            &mut table,
            &[
                "DIRTY a", "CLEAN a 1 2", "DIRTY b", "CLEAN b 3 4", "DIRTY c", "READ a",
                "DIRTY d", "CLEAN d 5 6", "REMOVE d",
            ],
        );

        assert_eq!(keys(&table), vec!["b", "c", "a"]);

        let a = table.get("a").expect("a must exist");
        assert!(a.readable);
        assert_eq!(a.current_editor, None);
        assert_eq!(a.lengths, vec![1, 2]);

        let c = table.get("c").expect("c must exist");
        assert!(!c.readable);
        assert_eq!(c.current_editor, Some(EditorSlot::Orphaned));
    }

    /// A `CLEAN` line clears the orphan marker of a previous `DIRTY`.
    #[test]
    fn test_replay_redirty() {
        let mut table = EntryTable::new(2);

        replay(&mut table, &["DIRTY a", "CLEAN a 1 2", "DIRTY a"]);
        assert_eq!(
            table.get("a").expect("must exist").current_editor,
            Some(EditorSlot::Orphaned)
        );

        replay(&mut table, &["CLEAN a 3 4"]);
        let a = table.get("a").expect("must exist");
        assert_eq!(a.current_editor, None);
        assert_eq!(a.lengths, vec![3, 4]);
    }

    /// Removing an absent key is a no-op.
    #[test]
    fn test_replay_remove_absent() {
        let mut table = EntryTable::new(2);

        replay(&mut table, &["REMOVE a"]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_discard_incomplete() {
        use test_dir::{DirBuilder, FileType, TestDir};

        let temp = TestDir::temp()
            .create("a.0", FileType::ZeroFile(1))
            .create("a.1", FileType::ZeroFile(2))
            .create("b.0", FileType::ZeroFile(3))
            .create("b.1", FileType::ZeroFile(4))
            .create("b.0.tmp", FileType::ZeroFile(5))
            .create("c.1.tmp", FileType::ZeroFile(6))
            .create(JOURNAL_FILE_TEMP, FileType::ZeroFile(7));

        let mut table = EntryTable::new(2);
        replay(
            &mut table,
            &["CLEAN a 1 2", "CLEAN b 3 4", "DIRTY b", "DIRTY c"],
        );

        let size = table
            .discard_incomplete(&temp.path("."))
            .expect("discard must succeed");

        assert_eq!(size, 3);
        assert_eq!(keys(&table), vec!["a"]);

        for name in ["a.0", "a.1"].iter() {
            assert!(temp.path(name).exists(), "{} must survive", name);
        }

        for name in ["b.0", "b.1", "b.0.tmp", "c.1.tmp", JOURNAL_FILE_TEMP].iter() {
            assert!(!temp.path(name).exists(), "{} must be deleted", name);
        }
    }

    #[test]
    fn test_records() {
        let mut table = EntryTable::new(2);

        replay(
            &mut table,
            &["CLEAN a 1 2", "READ a", "CLEAN b 3 4", "DIRTY c", "READ a"],
        );

        let rendered: Vec<String> = table.records().map(|r| r.to_string()).collect();
        assert_eq!(rendered, vec!["CLEAN b 3 4", "DIRTY c", "CLEAN a 1 2"]);
    }

    #[test]
    fn test_eviction_candidate() {
        let mut table = EntryTable::new(2);

        assert_eq!(table.eviction_candidate(), None);

        replay(&mut table, &["CLEAN a 1 2", "CLEAN b 3 4", "DIRTY a"]);
        assert_eq!(table.eviction_candidate(), Some("b"));

        table.get_mut("b").expect("must exist").current_editor = Some(EditorSlot::Live(1));
        assert_eq!(table.eviction_candidate(), None);
    }

    /// Operations on a small universe of keys.
    #[derive(Arbitrary, Clone, Copy, Debug)]
    enum Op {
        Touch(#[proptest(strategy = "0..4u8")] u8),
        Insert(#[proptest(strategy = "0..4u8")] u8),
        Remove(#[proptest(strategy = "0..4u8")] u8),
    }

    proptest! {
        /// The table iterates in the same order as a naive list where
        /// every access moves the key to the end.
        #[test]
        fn test_recency_oracle(ops in vec(any::<Op>(), 0..50usize)) {
            let mut table = EntryTable::new(1);
            let mut model: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Touch(k) => {
                        let key = k.to_string();
                        let found = table.touch(&key).is_some();
                        prop_assert_eq!(found, model.contains(&key));
                        if found {
                            model.retain(|x| x != &key);
                            model.push(key);
                        }
                    }
                    Op::Insert(k) => {
                        let key = k.to_string();
                        table.get_or_insert(&key);
                        model.retain(|x| x != &key);
                        model.push(key);
                    }
                    Op::Remove(k) => {
                        let key = k.to_string();
                        prop_assert_eq!(table.remove(&key).is_some(), model.contains(&key));
                        model.retain(|x| x != &key);
                    }
                }
            }

            prop_assert_eq!(keys(&table), model.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
