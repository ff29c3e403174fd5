use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory overrides for unsaved editor buffers.
///
/// Maps an absolute file path to its current buffer contents and editor
/// revision. The working copy is built by the caller before a run and is
/// read-only from the indexing pipeline's perspective; contents are shared
/// so cloning a working copy is cheap.
#[derive(Debug, Clone, Default)]
pub struct WorkingCopy {
    files: HashMap<PathBuf, (Arc<String>, u32)>,
}

impl WorkingCopy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>, revision: u32) {
        self.files
            .insert(path.into(), (Arc::new(contents.into()), revision));
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<(Arc<String>, u32)> {
        self.files
            .get(path)
            .map(|(contents, revision)| (Arc::clone(contents), *revision))
    }

    pub fn contents(&self, path: &Path) -> Option<Arc<String>> {
        self.files.get(path).map(|(contents, _)| Arc::clone(contents))
    }

    /// Returns the editor revision for `path`, or 0 if the file is not held.
    pub fn revision(&self, path: &Path) -> u32 {
        self.files.get(path).map(|(_, revision)| *revision).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Arc<String>, u32)> {
        self.files
            .iter()
            .map(|(path, (contents, revision))| (path.as_path(), contents, *revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_revision() {
        let mut wc = WorkingCopy::new();
        wc.insert("/p/main.cpp", "int x;\n", 7);

        assert!(wc.contains(Path::new("/p/main.cpp")));
        let (contents, revision) = wc.get(Path::new("/p/main.cpp")).unwrap();
        assert_eq!(contents.as_str(), "int x;\n");
        assert_eq!(revision, 7);
        assert_eq!(wc.revision(Path::new("/p/other.cpp")), 0);
    }

    #[test]
    fn remove_forgets_the_buffer() {
        let mut wc = WorkingCopy::new();
        wc.insert("/p/a.h", "", 1);
        assert!(wc.remove(Path::new("/p/a.h")));
        assert!(!wc.contains(Path::new("/p/a.h")));
        assert!(!wc.remove(Path::new("/p/a.h")));
    }
}
