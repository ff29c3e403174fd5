//! Code-model data types for cinder.
//!
//! A [`Document`] is one translation unit's (or header's) fully preprocessed
//! state: macros, macro uses, include records, diagnostics and the content
//! fingerprint used for reuse decisions. [`Snapshot`] and [`GlobalSnapshot`]
//! are path-to-document caches; the per-run snapshot is owned by a single
//! indexing run, the global one is long-lived and shared across runs.

mod diagnostic;
mod document;
mod fingerprint;
mod snapshot;

pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use document::{
    CheckDepth, Document, Include, LanguageFeatures, MacroUse, SkippedBlock, UndefinedMacroUse,
};
pub use fingerprint::Fingerprint;
pub use snapshot::{GlobalSnapshot, Snapshot};
