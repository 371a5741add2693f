//! Value files may vanish behind the cache's back (users clean out
//! cache directories, NFS servers drop inodes).  Missing files are
//! cache misses, not failures; these helpers encode that policy.
use std::fs::File;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;
use std::path::Path;

/// Checks whether the error is for a missing file: NotFound, or stale
/// handle.  A stale (NFS) handle means the inode we're trying to read
/// isn't available on the server anymore; treat it like any other
/// missing file.
pub fn is_absent_file_error(error: &Error) -> bool {
    if error.kind() == ErrorKind::NotFound {
        true
    } else if let Some(errno) = error.raw_os_error() {
        // `ErrorKind::StaleNetworkFileHandle` isn't stable yet.
        errno == libc::ESTALE
    } else {
        false
    }
}

/// Opens `path` for reading, or returns `None` if there is no such
/// file.
pub fn open_if_present(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if is_absent_file_error(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes a file if it exists.
pub fn ensure_file_removed(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if is_absent_file_error(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

// Mostly trivial, but let's at least make sure we didn't mess up raw_os_error
// and confirm that libc agrees with what we know to be true on Linux.
#[test]
fn test_getters() {
    assert!(is_absent_file_error(&Error::new(
        ErrorKind::NotFound,
        "not found"
    )));
    assert!(!is_absent_file_error(&Error::new(
        ErrorKind::PermissionDenied,
        "bad"
    )));

    assert!(is_absent_file_error(&Error::from_raw_os_error(libc::ENOENT)));
    assert!(is_absent_file_error(&Error::from_raw_os_error(libc::ESTALE)));
    assert!(!is_absent_file_error(&Error::from_raw_os_error(libc::EIO)));
}

/// Removing a file should remove that file, and removing it again
/// should still succeed.
#[test]
fn test_remove_file() {
    use test_dir::{DirBuilder, FileType, TestDir};
    let temp = TestDir::temp().create("cache_file", FileType::ZeroFile(10));

    let path = temp.path("cache_file");
    assert!(std::fs::metadata(&path).is_ok());
    assert!(ensure_file_removed(&path).is_ok());

    assert!(matches!(std::fs::metadata(&path),
                     Err(e) if e.kind() == ErrorKind::NotFound));

    // Removing a file that does not exist is ok.
    assert!(ensure_file_removed(&path).is_ok());
}

/// Opening a missing file is a miss, not an error.
#[test]
fn test_open_if_present() {
    use test_dir::{DirBuilder, FileType, TestDir};
    let temp = TestDir::temp().create("present", FileType::ZeroFile(3));

    assert!(open_if_present(&temp.path("present"))
        .expect("open should succeed")
        .is_some());
    assert!(open_if_present(&temp.path("absent"))
        .expect("open should succeed")
        .is_none());
}
