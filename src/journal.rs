//! The journal is a line-oriented text file that records every state
//! transition of a cache directory.  It starts with a five line
//! header:
//!
//! ```text
//! disk-journal-cache
//! 1
//! 100
//! 2
//!
//! ```
//!
//! i.e., the format magic, the format version, the application's own
//! cache version, the number of value files per entry, and a blank
//! line.  Each subsequent line is one record:
//!
//! - `DIRTY key`: an editor was granted for `key`; a matching `CLEAN`
//!   or `REMOVE` line must follow, or the edit never completed.
//! - `CLEAN key len...`: an edit for `key` was published, with one
//!   byte length per value file.
//! - `REMOVE key`: `key` was deleted or evicted.
//! - `READ key`: `key` was accessed; only matters for LRU order.
//!
//! Readers tolerate a trailing `\r` on each line.  A final line
//! without its newline is the remnant of an interrupted append: it is
//! skipped and reported with [`JournalReader::is_truncated`].
use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufWriter;
use std::io::Result;
use std::io::Write;
use std::path::Path;

use crate::error::CacheError;
use crate::is_valid_key;

/// The journal file lives directly in the cache directory.
pub const JOURNAL_FILE: &str = "journal";

/// Journal rebuilds write to this scratch file before renaming it
/// over [`JOURNAL_FILE`].
pub const JOURNAL_FILE_TEMP: &str = "journal.tmp";

/// First header line.
pub const MAGIC: &str = "disk-journal-cache";

/// Second header line: the version of the journal format itself.
pub const VERSION: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

fn corrupt(reason: String) -> std::io::Error {
    CacheError::CorruptJournal(reason).into()
}

/// The parameters a journal must agree with before we replay it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub app_version: u32,
    pub value_count: usize,
}

impl Header {
    /// Writes the five header lines to `out`.
    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        write!(
            out,
            "{}\n{}\n{}\n{}\n\n",
            MAGIC, VERSION, self.app_version, self.value_count
        )
    }
}

/// One journal line, borrowing its key from the line buffer (or from
/// the caller, when writing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record<'a> {
    Clean { key: &'a str, lengths: Vec<u64> },
    Dirty { key: &'a str },
    Remove { key: &'a str },
    Read { key: &'a str },
}

impl<'a> Record<'a> {
    /// Parses one journal line (without its line terminator) for a
    /// cache with `value_count` values per entry.
    ///
    /// Fails with `ErrorKind::InvalidData` on unknown opcodes, missing
    /// keys, wrong field counts, or lengths that aren't non-negative
    /// integers.
    pub fn parse(line: &'a str, value_count: usize) -> Result<Record<'a>> {
        let mut fields = line.split(' ');
        let opcode = fields.next().unwrap_or("");
        let key = match fields.next() {
            // Keys become file names: a tampered journal must not
            // point outside the cache directory.
            Some(key) if is_valid_key(key) => key,
            _ => return Err(corrupt(format!("unexpected journal line: {:?}", line))),
        };

        match opcode {
            CLEAN => {
                let lengths = fields
                    .map(|field| field.parse::<u64>())
                    .collect::<std::result::Result<Vec<u64>, _>>()
                    .map_err(|_| corrupt(format!("unexpected journal line: {:?}", line)))?;

                if lengths.len() != value_count {
                    return Err(corrupt(format!(
                        "expected {} lengths in journal line: {:?}",
                        value_count, line
                    )));
                }

                Ok(Record::Clean { key, lengths })
            }
            DIRTY | REMOVE | READ => {
                if fields.next().is_some() {
                    return Err(corrupt(format!("unexpected journal line: {:?}", line)));
                }

                Ok(match opcode {
                    DIRTY => Record::Dirty { key },
                    REMOVE => Record::Remove { key },
                    _ => Record::Read { key },
                })
            }
            _ => Err(corrupt(format!("unexpected journal line: {:?}", line))),
        }
    }

    /// Appends this record, and its line terminator, to `out`.
    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "{}", self)
    }
}

impl<'a> fmt::Display for Record<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Clean { key, lengths } => {
                write!(f, "{} {}", CLEAN, key)?;
                for length in lengths {
                    write!(f, " {}", length)?;
                }

                Ok(())
            }
            Record::Dirty { key } => write!(f, "{} {}", DIRTY, key),
            Record::Remove { key } => write!(f, "{} {}", REMOVE, key),
            Record::Read { key } => write!(f, "{} {}", READ, key),
        }
    }
}

/// A `JournalReader` validates a journal's header, and then yields
/// its records one line at a time.
#[derive(Debug)]
pub struct JournalReader<R> {
    reader: R,
    line: String,
    value_count: usize,
    // Set once we find a final line without its terminator.
    truncated: bool,
}

/// Reads one line into `buf`, without the line terminator.
///
/// Returns false at EOF, or if the last line is unterminated.
fn read_terminated_line(reader: &mut impl BufRead, buf: &mut String) -> Result<bool> {
    buf.clear();
    if reader.read_line(buf)? == 0 || !buf.ends_with('\n') {
        return Ok(false);
    }

    buf.pop();
    if buf.ends_with('\r') {
        buf.pop();
    }

    Ok(true)
}

impl<R: BufRead> JournalReader<R> {
    /// Consumes the journal header from `reader`, and fails with
    /// `ErrorKind::InvalidData` unless it matches `expected` exactly.
    pub fn new(mut reader: R, expected: Header) -> Result<JournalReader<R>> {
        let wanted = [
            MAGIC.to_string(),
            VERSION.to_string(),
            expected.app_version.to_string(),
            expected.value_count.to_string(),
            String::new(),
        ];

        let mut line = String::new();
        for want in wanted.iter() {
            if !read_terminated_line(&mut reader, &mut line)? {
                return Err(corrupt("truncated journal header".to_string()));
            }

            if &line != want {
                return Err(corrupt(format!(
                    "unexpected journal header: expected {:?}, found {:?}",
                    want, line
                )));
            }
        }

        Ok(JournalReader {
            reader,
            line,
            value_count: expected.value_count,
            truncated: false,
        })
    }

    /// Returns the next record, or `None` once the journal is
    /// exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record<'_>>> {
        if self.truncated || !read_terminated_line(&mut self.reader, &mut self.line)? {
            self.truncated |= !self.line.is_empty();
            return Ok(None);
        }

        Record::parse(&self.line, self.value_count).map(Some)
    }

    /// Returns whether the journal ended with a partial line.  Only
    /// meaningful once [`JournalReader::next_record`] returned `None`.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Writes a complete journal, `header` followed by `records`, to a
/// new (or truncated) file at `path`, and syncs it to disk.
pub fn write_journal<'a>(
    path: &Path,
    header: Header,
    records: impl IntoIterator<Item = Record<'a>>,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    header.write_to(&mut out)?;
    for record in records {
        record.write_to(&mut out)?;
    }

    out.flush()?;
    out.get_ref().sync_all()
}

/// Opens the journal at `path` for appending new records.
pub fn open_for_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new().append(true).open(path)?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod test {
    use crate::error::CacheError;
    use crate::journal::*;
    use proptest::collection::vec;
    use proptest::prelude::*;
    use std::io::ErrorKind;
    use std::io::Result;
    use std::io::Write;

    const HEADER: Header = Header {
        app_version: 100,
        value_count: 2,
    };

    fn reader(contents: &str) -> Result<JournalReader<&[u8]>> {
        JournalReader::new(contents.as_bytes(), HEADER)
    }

    /// Reads every record in `contents`, as owned strings.
    fn read_all(contents: &str) -> Result<(Vec<String>, bool)> {
        let mut reader = reader(contents)?;
        let mut records = Vec::new();

        while let Some(record) = reader.next_record()? {
            records.push(record.to_string());
        }

        Ok((records, reader.is_truncated()))
    }

    #[test]
    fn test_header_format() {
        let mut out = Vec::new();
        HEADER.write_to(&mut out).expect("write should succeed");

        assert_eq!(
            String::from_utf8(out).expect("must be utf-8"),
            "disk-journal-cache\n1\n100\n2\n\n"
        );
    }

    #[test]
    fn test_parse_records() {
        assert_eq!(
            Record::parse("CLEAN k1 3 4", 2).expect("must parse"),
            Record::Clean {
                key: "k1",
                lengths: vec![3, 4]
            }
        );
        assert_eq!(
            Record::parse("DIRTY k1", 2).expect("must parse"),
            Record::Dirty { key: "k1" }
        );
        assert_eq!(
            Record::parse("REMOVE k1", 2).expect("must parse"),
            Record::Remove { key: "k1" }
        );
        assert_eq!(
            Record::parse("READ k1", 2).expect("must parse"),
            Record::Read { key: "k1" }
        );
    }

    #[test]
    fn test_parse_malformed() {
        for line in [
            "",
            "CLEAN",
            "CLEAN k1",
            "CLEAN k1 3",
            "CLEAN k1 3 4 5",
            "CLEAN k1 3 x",
            "CLEAN k1 -3 4",
            "CLEAN k1 3  4",
            "DIRTY",
            "DIRTY k1 3",
            "REMOVE k1 k2",
            "READ ",
            "BOGUS k1",
            "dirty k1",
            "DIRTY ../victim",
            "REMOVE /etc/passwd",
            "READ ..",
            "CLEAN . 1 2",
            "CLEAN a\\b 1 2",
        ]
        .iter()
        {
            let err = Record::parse(line, 2).expect_err(line);
            assert_eq!(err.kind(), ErrorKind::InvalidData, "{:?}", line);
            assert!(matches!(
                CacheError::from_io(&err),
                Some(CacheError::CorruptJournal(_))
            ));
        }
    }

    #[test]
    fn test_read_journal() {
        let (records, truncated) = read_all(
            "disk-journal-cache\n1\n100\n2\n\nDIRTY a\nCLEAN a 1 2\nREAD a\nREMOVE a\n",
        )
        .expect("must read");

        assert_eq!(
            records,
            vec!["DIRTY a", "CLEAN a 1 2", "READ a", "REMOVE a"]
        );
        assert!(!truncated);
    }

    #[test]
    fn test_read_empty_journal() {
        let (records, truncated) =
            read_all("disk-journal-cache\n1\n100\n2\n\n").expect("must read");

        assert!(records.is_empty());
        assert!(!truncated);
    }

    /// Carriage returns at the end of lines are tolerated everywhere.
    #[test]
    fn test_read_crlf() {
        let (records, _) =
            read_all("disk-journal-cache\r\n1\r\n100\r\n2\r\n\r\nCLEAN a 1 2\r\n")
                .expect("must read");

        assert_eq!(records, vec!["CLEAN a 1 2"]);
    }

    /// An interrupted append leaves a partial line at the end: skip it.
    #[test]
    fn test_read_truncated() {
        let (records, truncated) =
            read_all("disk-journal-cache\n1\n100\n2\n\nCLEAN a 1 2\nCLEAN b 1").expect("must read");

        assert_eq!(records, vec!["CLEAN a 1 2"]);
        assert!(truncated);
    }

    #[test]
    fn test_header_mismatch() {
        for contents in [
            "",
            "disk-journal-cache\n1\n100\n2\n",
            "other-cache\n1\n100\n2\n\n",
            "disk-journal-cache\n2\n100\n2\n\n",
            "disk-journal-cache\n1\n101\n2\n\n",
            "disk-journal-cache\n1\n100\n3\n\n",
            "disk-journal-cache\n1\n100\n2\nx\n",
        ]
        .iter()
        {
            let err = reader(contents).expect_err(contents);
            assert_eq!(err.kind(), ErrorKind::InvalidData, "{:?}", contents);
        }
    }

    /// A bad line anywhere fails the whole read.
    #[test]
    fn test_read_corrupt_line() {
        let err = read_all("disk-journal-cache\n1\n100\n2\n\nCLEAN a 1 2\nCLEAN b 1\nREAD a\n")
            .expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_journal() {
        use test_dir::{DirBuilder, TestDir};

        let temp = TestDir::temp();
        let path = temp.path(JOURNAL_FILE);

        write_journal(
            &path,
            HEADER,
            vec![
                Record::Clean {
                    key: "a",
                    lengths: vec![10, 20],
                },
                Record::Dirty { key: "b" },
            ],
        )
        .expect("write should succeed");

        {
            let mut out = open_for_append(&path).expect("open should succeed");
            Record::Remove { key: "a" }
                .write_to(&mut out)
                .expect("append should succeed");
            out.flush().expect("flush should succeed");
        }

        assert_eq!(
            std::fs::read_to_string(&path).expect("read should succeed"),
            "disk-journal-cache\n1\n100\n2\n\nCLEAN a 10 20\nDIRTY b\nREMOVE a\n"
        );
    }

    proptest! {
        /// Every rendered record parses back to itself, as long as
        /// the key is free of separators.
        #[test]
        fn test_parse_rendered(key in "[a-z0-9_-][a-z0-9_.-]{0,15}",
                               lengths in vec(any::<u64>(), 2..=2usize),
                               opcode in 0..4u8) {
            let record = match opcode {
                0 => Record::Clean { key: &key, lengths },
                1 => Record::Dirty { key: &key },
                2 => Record::Remove { key: &key },
                _ => Record::Read { key: &key },
            };

            let line = record.to_string();
            prop_assert_eq!(Record::parse(&line, 2).expect("must parse"), record);
        }
    }
}
