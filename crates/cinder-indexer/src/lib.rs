//! The incremental source indexing pipeline.
//!
//! [`SourceProcessor`] turns a root translation unit plus a set of header
//! search paths into a graph of preprocessed [`Document`]s. Includes are
//! resolved against the search paths, the preprocessor is driven over each
//! file exactly once per run, and previously indexed documents are reused
//! whenever their effective content (macro-expanded text + macro set) is
//! unchanged, as decided by the content fingerprint.

mod analyzer;
mod header_path;
mod processor;

pub use analyzer::{Analyzer, NoopAnalyzer};
pub use header_path::{HeaderPath, HeaderPathKind};
pub use processor::{DocumentCallback, SourceProcessor};

pub use cinder_codemodel::{
    CheckDepth, Diagnostic, DiagnosticKind, Document, Fingerprint, GlobalSnapshot, Include,
    LanguageFeatures, Severity, Snapshot,
};
pub use cinder_pp::{CancelChecker, Cancelled, IncludeKind};
pub use cinder_vfs::{FileSystem, LocalFs, WorkingCopy};
