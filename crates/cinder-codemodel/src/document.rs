use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use cinder_pp::{IncludeKind, Macro, MacroArgumentReference};
use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::fingerprint::Fingerprint;

/// Language dialect flags a run processes files under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageFeatures {
    pub cxx_enabled: bool,
    pub cxx11_enabled: bool,
    pub c99_enabled: bool,
    pub objc_enabled: bool,
}

impl LanguageFeatures {
    pub fn default_features() -> Self {
        Self {
            cxx_enabled: true,
            cxx11_enabled: true,
            c99_enabled: true,
            objc_enabled: false,
        }
    }
}

impl Default for LanguageFeatures {
    fn default() -> Self {
        Self::default_features()
    }
}

/// How deeply a document was (or should be) semantically checked.
///
/// Files held in the working copy are open editor buffers and get the full
/// treatment; everything else gets the fast pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckDepth {
    Full,
    Fast,
}

/// One include directive as recorded on the including document.
///
/// The resolved target is a path, not a document reference: the include graph
/// can be cyclic, so the relation is by key and resolved through the snapshot
/// at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    unresolved: String,
    resolved: Option<PathBuf>,
    line: u32,
    kind: IncludeKind,
}

impl Include {
    pub fn new(unresolved: impl Into<String>, resolved: Option<PathBuf>, line: u32, kind: IncludeKind) -> Self {
        Self {
            unresolved: unresolved.into(),
            resolved,
            line,
            kind,
        }
    }

    /// The spelling as written in the directive.
    pub fn unresolved_file_name(&self) -> &str {
        &self.unresolved
    }

    /// The resolved absolute path, or `None` if resolution failed.
    pub fn resolved_file_name(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn kind(&self) -> IncludeKind {
        self.kind
    }
}

/// A macro use site, recorded with both byte and UTF-16 offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroUse {
    pub mac: Macro,
    pub bytes_offset: usize,
    pub bytes_length: usize,
    pub utf16_offset: usize,
    pub utf16_length: usize,
    pub line: u32,
    pub arguments: Vec<MacroArgumentReference>,
}

/// A reference to a name that was checked for definition and found undefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndefinedMacroUse {
    pub name: String,
    pub bytes_offset: usize,
    pub utf16_offset: usize,
}

/// An `#if 0`-style region excluded from compilation, in UTF-16 offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBlock {
    pub utf16_start: usize,
    pub utf16_end: usize,
}

/// One file's fully preprocessed state.
///
/// Built mutably by the processor while the file is being scanned, then
/// frozen behind `Arc` so both snapshots and any caller-held handles can
/// share it.
#[derive(Debug)]
pub struct Document {
    file_name: PathBuf,
    editor_revision: u32,
    language_features: LanguageFeatures,
    last_modified: Option<SystemTime>,
    fingerprint: Fingerprint,
    defined_macros: Vec<Macro>,
    macro_uses: Vec<MacroUse>,
    undefined_macro_uses: Vec<UndefinedMacroUse>,
    skipped_blocks: Vec<SkippedBlock>,
    includes: Vec<Include>,
    diagnostics: Vec<Diagnostic>,
    include_guard_macro_name: Option<String>,
    source: Option<Arc<String>>,
    check_depth: Option<CheckDepth>,
}

impl Document {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            editor_revision: 0,
            language_features: LanguageFeatures::default_features(),
            last_modified: None,
            fingerprint: Fingerprint::empty(),
            defined_macros: Vec::new(),
            macro_uses: Vec::new(),
            undefined_macro_uses: Vec::new(),
            skipped_blocks: Vec::new(),
            includes: Vec::new(),
            diagnostics: Vec::new(),
            include_guard_macro_name: None,
            source: None,
            check_depth: None,
        }
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn editor_revision(&self) -> u32 {
        self.editor_revision
    }

    pub fn set_editor_revision(&mut self, revision: u32) {
        self.editor_revision = revision;
    }

    pub fn language_features(&self) -> LanguageFeatures {
        self.language_features
    }

    pub fn set_language_features(&mut self, features: LanguageFeatures) {
        self.language_features = features;
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    pub fn set_last_modified(&mut self, time: SystemTime) {
        self.last_modified = Some(time);
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn set_fingerprint(&mut self, fingerprint: Fingerprint) {
        self.fingerprint = fingerprint;
    }

    pub fn defined_macros(&self) -> &[Macro] {
        &self.defined_macros
    }

    pub fn append_macro(&mut self, mac: Macro) {
        self.defined_macros.push(mac);
    }

    pub fn macro_uses(&self) -> &[MacroUse] {
        &self.macro_uses
    }

    pub fn add_macro_use(&mut self, usage: MacroUse) {
        self.macro_uses.push(usage);
    }

    pub fn undefined_macro_uses(&self) -> &[UndefinedMacroUse] {
        &self.undefined_macro_uses
    }

    pub fn add_undefined_macro_use(&mut self, usage: UndefinedMacroUse) {
        self.undefined_macro_uses.push(usage);
    }

    pub fn skipped_blocks(&self) -> &[SkippedBlock] {
        &self.skipped_blocks
    }

    /// Opens a skipped region. Closed by [`Document::stop_skipping_blocks`];
    /// an unclosed region is left with `utf16_end == utf16_start`.
    pub fn start_skipping_blocks(&mut self, utf16_offset: usize) {
        self.skipped_blocks.push(SkippedBlock {
            utf16_start: utf16_offset,
            utf16_end: utf16_offset,
        });
    }

    pub fn stop_skipping_blocks(&mut self, utf16_offset: usize) {
        if let Some(block) = self.skipped_blocks.last_mut() {
            if block.utf16_end == block.utf16_start {
                block.utf16_end = utf16_offset;
            }
        }
    }

    /// Includes in directive order, resolved or not.
    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    /// Only the includes whose target was resolved.
    pub fn resolved_includes(&self) -> impl Iterator<Item = &Include> {
        self.includes.iter().filter(|inc| inc.resolved_file_name().is_some())
    }

    pub fn add_include(&mut self, include: Include) {
        self.includes.push(include);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn include_guard_macro_name(&self) -> Option<&str> {
        self.include_guard_macro_name.as_deref()
    }

    pub fn set_include_guard_macro_name(&mut self, name: impl Into<String>) {
        self.include_guard_macro_name = Some(name.into());
    }

    /// The retained preprocessed source, if the document keeps it.
    pub fn source(&self) -> Option<&Arc<String>> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Arc<String>) {
        self.source = Some(source);
    }

    pub fn check_depth(&self) -> Option<CheckDepth> {
        self.check_depth
    }

    pub fn set_check_depth(&mut self, depth: CheckDepth) {
        self.check_depth = Some(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_blocks_pair_up() {
        let mut doc = Document::new("/p/a.h");
        doc.start_skipping_blocks(10);
        doc.stop_skipping_blocks(20);
        doc.start_skipping_blocks(30);

        assert_eq!(
            doc.skipped_blocks(),
            &[
                SkippedBlock { utf16_start: 10, utf16_end: 20 },
                SkippedBlock { utf16_start: 30, utf16_end: 30 },
            ]
        );
    }

    #[test]
    fn resolved_includes_filters_failures() {
        let mut doc = Document::new("/p/a.cpp");
        doc.add_include(Include::new("x.h", Some(PathBuf::from("/inc/x.h")), 1, IncludeKind::Global));
        doc.add_include(Include::new("missing.h", None, 2, IncludeKind::Local));

        let resolved: Vec<_> = doc.resolved_includes().collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].unresolved_file_name(), "x.h");
    }
}
