use std::path::{Path, PathBuf};

use cinder_core::clean_dir_path;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderPathKind {
    /// An ordinary `-I`-style search root.
    Regular,
    /// A directory of `Name.framework` bundles exposing headers under
    /// `Name.framework/Headers/`.
    Framework,
}

/// One header search root. Search order matters and is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPath {
    path: PathBuf,
    kind: HeaderPathKind,
}

impl HeaderPath {
    pub fn regular(path: impl AsRef<Path>) -> Self {
        Self {
            path: clean_dir_path(path.as_ref()),
            kind: HeaderPathKind::Regular,
        }
    }

    pub fn framework(path: impl AsRef<Path>) -> Self {
        Self {
            path: clean_dir_path(path.as_ref()),
            kind: HeaderPathKind::Framework,
        }
    }

    /// The normalized root, with a guaranteed trailing separator.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> HeaderPathKind {
        self.kind
    }
}
