use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Include problems never abort a run, so nothing here rises above a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
}

/// What went wrong; diagnostics in this pipeline are always non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// An include directive's target could not be resolved.
    NoSuchFile,
    /// The resolved file could not be read from the working copy or disk.
    NoFileContents,
}

/// A message attached to the document that triggered it (for include
/// problems: the *including* document, at the directive's line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub document: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn no_such_file(document: &Path, file_name: &str, line: u32) -> Self {
        Self {
            severity: Severity::Warning,
            kind: DiagnosticKind::NoSuchFile,
            document: document.to_path_buf(),
            line,
            column: 0,
            message: format!("{file_name}: No such file or directory"),
        }
    }

    pub fn no_file_contents(document: &Path, file_name: &str, line: u32) -> Self {
        Self {
            severity: Severity::Warning,
            kind: DiagnosticKind::NoFileContents,
            document: document.to_path_buf(),
            line,
            column: 0,
            message: format!("{file_name}: Could not get file contents"),
        }
    }
}
