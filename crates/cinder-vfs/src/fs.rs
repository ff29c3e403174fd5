use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use cinder_core::normalize_newlines;

/// File system abstraction for cinder.
///
/// The trait is intentionally small so it can be implemented for different
/// backends (the local FS, an in-memory tree in tests, etc).
pub trait FileSystem: Send + Sync {
    /// Reads the file contents as UTF-8 text with line endings normalized to LF.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns whether `path` exists and refers to a readable regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Returns whether `path` exists and refers to a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns the file size in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Returns the last-modified timestamp, if the backend tracks one.
    fn last_modified(&self, path: &Path) -> Option<SystemTime>;

    /// Lists directory entries. Implementations may return `ErrorKind::Unsupported`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<std::path::PathBuf>>;
}

/// Local OS file system implementation.
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let text = fs::read_to_string(path)?;
        Ok(normalize_newlines(&text))
    }

    fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn last_modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<std::path::PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_normalizes_crlf() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.h");
        std::fs::write(&file, "one\r\ntwo\r\n").unwrap();

        let fs = LocalFs::new();
        assert_eq!(fs.read_to_string(&file).unwrap(), "one\ntwo\n");
        assert!(fs.is_file(&file));
        assert!(!fs.is_file(temp.path()));
    }
}
