use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::document::Document;

/// A per-run path-to-document cache.
///
/// Owned by exactly one indexing run; never shared across threads, so plain
/// map operations suffice. Documents themselves are shared (`Arc`) because
/// the global snapshot and caller-held handles may outlive the run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    documents: HashMap<PathBuf, Arc<Document>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: Arc<Document>) {
        self.documents
            .insert(document.file_name().to_path_buf(), document);
    }

    pub fn document(&self, file_name: &Path) -> Option<Arc<Document>> {
        self.documents.get(file_name).cloned()
    }

    pub fn contains(&self, file_name: &Path) -> bool {
        self.documents.contains_key(file_name)
    }

    pub fn remove(&mut self, file_name: &Path) -> Option<Arc<Document>> {
        self.documents.remove(file_name)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Arc<Document>)> {
        self.documents.iter().map(|(path, doc)| (path.as_path(), doc))
    }
}

/// The long-lived snapshot shared across runs (and, potentially, threads).
///
/// Lookups take a read lock; inserts take a write lock. Concurrent inserts of
/// the same key race only on which document wins, which is benign: both are
/// valid for that fingerprint-equivalent content.
#[derive(Debug, Clone, Default)]
pub struct GlobalSnapshot {
    inner: Arc<RwLock<HashMap<PathBuf, Arc<Document>>>>,
}

impl GlobalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, file_name: &Path) -> Option<Arc<Document>> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(file_name).cloned()
    }

    pub fn insert(&self, document: Arc<Document>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(document.file_name().to_path_buf(), document);
    }

    pub fn remove(&self, file_name: &Path) -> Option<Arc<Document>> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(file_name)
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the shared contents with the documents of a finished run.
    pub fn replace_with(&self, snapshot: &Snapshot) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.clear();
        for (path, doc) in snapshot.iter() {
            map.insert(path.to_path_buf(), Arc::clone(doc));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_insert_lookup_remove() {
        let mut snapshot = Snapshot::new();
        let doc = Arc::new(Document::new("/p/a.h"));
        snapshot.insert(Arc::clone(&doc));

        let found = snapshot.document(Path::new("/p/a.h")).unwrap();
        assert!(Arc::ptr_eq(&found, &doc));
        assert!(snapshot.remove(Path::new("/p/a.h")).is_some());
        assert!(snapshot.document(Path::new("/p/a.h")).is_none());
    }

    #[test]
    fn global_snapshot_is_shared_between_clones() {
        let global = GlobalSnapshot::new();
        let alias = global.clone();
        alias.insert(Arc::new(Document::new("/p/a.h")));
        assert!(global.document(Path::new("/p/a.h")).is_some());
    }
}
