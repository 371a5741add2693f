//! A [`Snapshot`] is the read side of a cache entry: the files for
//! every value of the entry, all opened under the cache lock.  Later
//! commits rename new files over the published paths, and removals
//! unlink them, but open file descriptors keep reading the values as
//! they were when the snapshot was taken.
use std::fs::File;
use std::io::Read;
use std::io::Result;

use crate::error::CacheError;
use crate::Cache;
use crate::Editor;

/// A consistent view of the values of one cache entry.
#[derive(Debug)]
pub struct Snapshot {
    cache: Cache,
    key: String,
    sequence_number: u64,
    files: Vec<File>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        cache: Cache,
        key: String,
        sequence_number: u64,
        files: Vec<File>,
        lengths: Vec<u64>,
    ) -> Snapshot {
        Snapshot {
            cache,
            key,
            sequence_number,
            files,
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identifies the commit this snapshot observed.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let value_count = self.files.len();

        if index < value_count {
            Ok(())
        } else {
            Err(CacheError::ValueIndex { index, value_count }.into())
        }
    }

    /// Returns the byte length of value `index`, as recorded when the
    /// snapshot was taken.
    pub fn length(&self, index: usize) -> Result<u64> {
        self.check_index(index)?;
        Ok(self.lengths[index])
    }

    /// Returns the file for value `index`.
    pub fn value(&mut self, index: usize) -> Result<&mut File> {
        self.check_index(index)?;
        Ok(&mut self.files[index])
    }

    /// Reads the rest of value `index` as a string.
    pub fn get_string(&mut self, index: usize) -> Result<String> {
        let mut value = String::new();

        self.value(index)?.read_to_string(&mut value)?;
        Ok(value)
    }

    /// Returns the value files, in index order.
    pub fn into_files(self) -> Vec<File> {
        self.files
    }

    /// Returns an editor for this snapshot's entry, or `None` if the
    /// entry changed since the snapshot was taken, or if another edit
    /// is in progress.
    pub fn edit(&self) -> Result<Option<Editor>> {
        self.cache
            .edit_version(&self.key, Some(self.sequence_number))
    }
}

#[cfg(test)]
mod test {
    use std::io::ErrorKind;
    use std::io::Read;

    use crate::error::CacheError;
    use crate::Cache;

    fn put(cache: &Cache, key: &str, values: &[&str]) {
        let mut editor = cache
            .edit(key)
            .expect("edit must succeed")
            .expect("must get editor");

        for (index, value) in values.iter().enumerate() {
            editor.set(index, value).expect("set must succeed");
        }

        editor.commit().expect("commit must succeed");
    }

    #[test]
    fn test_accessors() {
        use test_dir::{DirBuilder, TestDir};

        let temp = TestDir::temp();
        let cache = Cache::open(temp.path("."), 1, 2, 1000).expect("open must succeed");

        put(&cache, "k", &["abc", "de"]);

        let mut snapshot = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");
        assert_eq!(snapshot.key(), "k");
        assert_eq!(snapshot.length(0).expect("index 0 exists"), 3);
        assert_eq!(snapshot.length(1).expect("index 1 exists"), 2);
        assert_eq!(snapshot.get_string(0).expect("read must succeed"), "abc");

        let mut contents = String::new();
        snapshot
            .value(1)
            .expect("index 1 exists")
            .read_to_string(&mut contents)
            .expect("read must succeed");
        assert_eq!(contents, "de");

        for err in [
            snapshot.length(2).expect_err("index 2 is out of range"),
            snapshot.value(2).expect_err("index 2 is out of range"),
            snapshot.get_string(7).expect_err("index 7 is out of range"),
        ]
        .iter()
        {
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
            assert!(matches!(
                CacheError::from_io(err),
                Some(CacheError::ValueIndex { value_count: 2, .. })
            ));
        }

        let files = snapshot.into_files();
        assert_eq!(files.len(), 2);
    }

    /// Snapshots keep reading the values they opened, even after a
    /// commit or a removal replaces them.
    #[test]
    fn test_isolation() {
        use test_dir::{DirBuilder, TestDir};

        let temp = TestDir::temp();
        let cache = Cache::open(temp.path("."), 1, 1, 1000).expect("open must succeed");

        put(&cache, "k", &["first"]);
        let mut old = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");

        put(&cache, "k", &["second"]);
        let mut new = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");
        assert!(new.sequence_number() > old.sequence_number());

        assert!(cache.remove("k").expect("remove must succeed"));
        assert_eq!(old.get_string(0).expect("read must succeed"), "first");
        assert_eq!(new.get_string(0).expect("read must succeed"), "second");
    }

    /// Editing through a snapshot only works while the snapshot is
    /// current.
    #[test]
    fn test_stale_edit() {
        use test_dir::{DirBuilder, TestDir};

        let temp = TestDir::temp();
        let cache = Cache::open(temp.path("."), 1, 1, 1000).expect("open must succeed");

        put(&cache, "k", &["v1"]);
        let stale = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");
        put(&cache, "k", &["v2"]);

        assert!(stale.edit().expect("edit must succeed").is_none());

        let current = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");
        let mut editor = current
            .edit()
            .expect("edit must succeed")
            .expect("current snapshot must get an editor");
        editor.set(0, "v3").expect("set must succeed");
        editor.commit().expect("commit must succeed");

        // The entry moved on again.
        assert!(current.edit().expect("edit must succeed").is_none());
    }

    /// Entries replayed from the journal are stale as soon as they are
    /// committed again.
    #[test]
    fn test_stale_after_reopen() {
        use test_dir::{DirBuilder, TestDir};

        let temp = TestDir::temp();
        {
            let cache = Cache::open(temp.path("."), 1, 1, 1000).expect("open must succeed");
            put(&cache, "k", &["v1"]);
            cache.close().expect("close must succeed");
        }

        let cache = Cache::open(temp.path("."), 1, 1, 1000).expect("open must succeed");
        let stale = cache
            .get("k")
            .expect("get must succeed")
            .expect("entry must exist");
        put(&cache, "k", &["v2"]);

        assert!(stale.edit().expect("edit must succeed").is_none());
    }
}
