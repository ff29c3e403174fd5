use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinder_core::{clean_dir_path, normalize_path};
use cinder_codemodel::{
    CheckDepth, Diagnostic, Document, Fingerprint, GlobalSnapshot, Include, LanguageFeatures,
    MacroUse, Snapshot, UndefinedMacroUse,
};
use cinder_pp::{
    CancelChecker, Cancelled, Client, Environment, IncludeKind, Macro, MacroArgumentReference,
    Preprocessor,
};
use cinder_vfs::{FileSystem, LocalFs, WorkingCopy};

use crate::analyzer::{Analyzer, NoopAnalyzer};
use crate::header_path::{HeaderPath, HeaderPathKind};

/// Invoked exactly once per newly fully-processed (non-cache-reused) file.
pub type DocumentCallback = Box<dyn FnMut(Arc<Document>) + Send>;

/// Drives the indexing of one translation unit at a time.
///
/// Resolves includes against the configured header paths, feeds each file
/// through the preprocessor, fingerprints the result, and reuses documents
/// from the per-run or global snapshot when their effective content is
/// unchanged. Re-entrancy happens on the call stack only: the preprocessor
/// calls back into [`SourceProcessor::source_needed`] for every `#include`
/// it encounters, before scanning past the directive.
pub struct SourceProcessor {
    snapshot: Snapshot,
    global_snapshot: GlobalSnapshot,
    document_finished: DocumentCallback,
    fs: Arc<dyn FileSystem>,
    analyzer: Box<dyn Analyzer>,
    working_copy: WorkingCopy,
    header_paths: Vec<HeaderPath>,
    language_features: LanguageFeatures,
    file_size_limit_mb: Option<u64>,
    todo: HashSet<PathBuf>,
    cancel: Option<CancelChecker>,
    env: Environment,
    included: HashSet<PathBuf>,
    processed: HashSet<PathBuf>,
    // Spelling -> resolved path, for the duration of one run. Repeated
    // lookups of the same spelling are extremely common within a run.
    file_name_cache: HashMap<String, PathBuf>,
    current: Option<Document>,
}

impl SourceProcessor {
    pub fn new(
        snapshot: Snapshot,
        global_snapshot: GlobalSnapshot,
        document_finished: impl FnMut(Arc<Document>) + Send + 'static,
    ) -> Self {
        Self {
            snapshot,
            global_snapshot,
            document_finished: Box::new(document_finished),
            fs: Arc::new(LocalFs::new()),
            analyzer: Box::new(NoopAnalyzer),
            working_copy: WorkingCopy::new(),
            header_paths: Vec::new(),
            language_features: LanguageFeatures::default_features(),
            file_size_limit_mb: None,
            todo: HashSet::new(),
            cancel: None,
            env: Environment::new(),
            included: HashSet::new(),
            processed: HashSet::new(),
            file_name_cache: HashMap::new(),
            current: None,
        }
    }

    /// Replaces the file system backend (tests, virtual trees).
    pub fn set_file_system(&mut self, fs: Arc<dyn FileSystem>) {
        self.fs = fs;
    }

    pub fn set_analyzer(&mut self, analyzer: Box<dyn Analyzer>) {
        self.analyzer = analyzer;
    }

    pub fn set_cancel_checker(&mut self, cancel: Option<CancelChecker>) {
        self.cancel = cancel;
    }

    pub fn set_working_copy(&mut self, working_copy: WorkingCopy) {
        self.working_copy = working_copy;
    }

    pub fn set_language_features(&mut self, features: LanguageFeatures) {
        self.language_features = features;
    }

    /// `None` disables the limit; `Some(0)` skips every non-empty file.
    pub fn set_file_size_limit_in_mb(&mut self, limit: Option<u64>) {
        self.file_size_limit_mb = limit;
    }

    pub fn set_todo(&mut self, files: HashSet<PathBuf>) {
        self.todo = files;
    }

    /// Files the caller still considers outstanding; entries are removed as
    /// their documents land in the per-run snapshot.
    pub fn todo(&self) -> &HashSet<PathBuf> {
        &self.todo
    }

    pub fn set_header_paths(&mut self, header_paths: &[HeaderPath]) {
        self.header_paths.clear();
        let mut visited = HashSet::new();
        for header_path in header_paths {
            match header_path.kind() {
                HeaderPathKind::Framework => {
                    self.add_framework_path(header_path.path(), &mut visited)
                }
                HeaderPathKind::Regular => {
                    self.header_paths.push(HeaderPath::regular(header_path.path()))
                }
            }
        }
    }

    // Registers a framework search root and expands private frameworks:
    //   <root>/Some.framework/Frameworks
    // becomes an additional framework root when that folder exists. The
    // visited set terminates the recursion even with symlink cycles.
    fn add_framework_path(&mut self, path: &Path, visited: &mut HashSet<PathBuf>) {
        let clean = clean_dir_path(path);
        if !visited.insert(clean.clone()) {
            return;
        }
        let entry = HeaderPath::framework(&clean);
        if !self.header_paths.contains(&entry) {
            self.header_paths.push(entry);
        }

        let Ok(entries) = self.fs.read_dir(&clean) else {
            return;
        };
        for framework in entries {
            if framework.extension().map_or(true, |ext| ext != "framework") {
                continue;
            }
            if !self.fs.is_dir(&framework) {
                continue;
            }
            let private = framework.join("Frameworks");
            if self.fs.is_dir(&private) {
                self.add_framework_path(&private, visited);
            }
        }
    }

    /// The per-run snapshot with every document this processor has produced
    /// or reused so far.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn global_snapshot(&self) -> &GlobalSnapshot {
        &self.global_snapshot
    }

    /// Entry point for a top-level translation unit. `initial_includes` are
    /// injected as pre-satisfied local includes of the root document (forced
    /// includes from a configuration prefix).
    pub fn run(
        &mut self,
        file_name: impl AsRef<Path>,
        initial_includes: &[String],
    ) -> Result<(), Cancelled> {
        let file_name = file_name.as_ref().to_string_lossy().into_owned();
        self.source_needed(0, &file_name, IncludeKind::Global, initial_includes)
    }

    /// Evicts a path from the per-run snapshot (the file changed out-of-band).
    pub fn remove_from_cache(&mut self, file_name: &Path) {
        self.snapshot.remove(file_name);
    }

    /// Clears the macro environment and the per-run bookkeeping. Must be
    /// called between independent top-level runs that should not see each
    /// other's state.
    pub fn reset_environment(&mut self) {
        self.env.reset();
        self.processed.clear();
        self.included.clear();
    }

    /// The core per-file routine; see the crate docs for the control flow.
    pub fn source_needed(
        &mut self,
        line: u32,
        file_name: &str,
        kind: IncludeKind,
        initial_includes: &[String],
    ) -> Result<(), Cancelled> {
        if file_name.is_empty() {
            return Ok(());
        }

        let absolute = self
            .resolve_file(file_name, kind)
            .map(|path| normalize_path(&path));
        if let Some(current) = self.current.as_mut() {
            current.add_include(Include::new(file_name, absolute.clone(), line, kind));
            if absolute.is_none() {
                let diagnostic = Diagnostic::no_such_file(current.file_name(), file_name, line);
                current.add_diagnostic(diagnostic);
                return Ok(());
            }
        }
        let Some(absolute) = absolute else {
            return Ok(());
        };

        if self.included.contains(&absolute) {
            return Ok(());
        }
        if !is_injected_file(&absolute) {
            self.included.insert(absolute.clone());
        }

        // Already in this run's snapshot? Use it.
        if let Some(document) = self.snapshot.document(&absolute) {
            return self.merge_environment(&document);
        }

        if let Some(limit_mb) = self.file_size_limit_mb {
            if self.file_size_exceeds_limit(&absolute, limit_mb) {
                tracing::debug!(
                    target: "cinder.indexer",
                    file = %absolute.display(),
                    limit_mb,
                    "skipping file above the size limit"
                );
                return Ok(());
            }
        }

        let Some((contents, editor_revision)) = self.get_file_contents(&absolute) else {
            if let Some(current) = self.current.as_mut() {
                let diagnostic = Diagnostic::no_file_contents(current.file_name(), file_name, line);
                current.add_diagnostic(diagnostic);
            }
            return Ok(());
        };

        tracing::debug!(
            target: "cinder.indexer",
            file = %absolute.display(),
            bytes = contents.len(),
            "processing"
        );

        let mut document = Document::new(&absolute);
        document.set_editor_revision(editor_revision);
        document.set_language_features(self.language_features);
        for include in initial_includes {
            let path = PathBuf::from(include);
            self.included.insert(path.clone());
            document.add_include(Include::new(include.clone(), Some(path), 0, IncludeKind::Local));
        }
        if let Some(modified) = self.fs.last_modified(&absolute) {
            document.set_last_modified(modified);
        }

        // The preprocessor recurses into `source_needed` for nested includes,
        // so the current-document slot follows a strict stack discipline:
        // swap in, run, swap back on every exit path.
        let previous = self.switch_current_document(Some(document));
        let mut preprocessor = Preprocessor::new();
        preprocessor.set_cancel_checker(self.cancel.clone());
        let preprocessed = match preprocessor.run(&absolute, &contents, self) {
            Ok(code) => code,
            Err(cancelled) => {
                self.switch_current_document(previous);
                return Err(cancelled);
            }
        };
        let mut document = self
            .switch_current_document(previous)
            .expect("current document was set above");

        let fingerprint = Fingerprint::of_document(document.defined_macros(), &preprocessed);
        document.set_fingerprint(fingerprint.clone());

        // Re-use the document from the global snapshot if its effective
        // content is unchanged; the freshly built document is discarded.
        if let Some(global) = self.global_snapshot.document(&absolute) {
            if global.fingerprint() == &fingerprint {
                tracing::debug!(
                    target: "cinder.indexer",
                    file = %absolute.display(),
                    "reusing unchanged document from the global snapshot"
                );
                self.merge_environment(&global)?;
                self.snapshot.insert(Arc::clone(&global));
                self.todo.remove(&absolute);
                return Ok(());
            }
        }

        document.set_source(Arc::new(preprocessed));
        let depth = if self.working_copy.contains(document.file_name()) {
            CheckDepth::Full
        } else {
            CheckDepth::Fast
        };
        document.set_check_depth(depth);
        self.analyzer.analyze(&mut document, depth);

        let document = Arc::new(document);
        (self.document_finished)(Arc::clone(&document));
        self.snapshot.insert(document);
        self.todo.remove(&absolute);
        Ok(())
    }

    /// Makes a cached document's macros visible to whatever continues after
    /// it, without reprocessing: depth-first over its resolved includes, then
    /// its own macros, each document at most once per run. The processed set
    /// doubles as the cycle guard.
    fn merge_environment(&mut self, document: &Arc<Document>) -> Result<(), Cancelled> {
        if !self.processed.insert(document.file_name().to_path_buf()) {
            return Ok(());
        }

        let includes: Vec<PathBuf> = document
            .resolved_includes()
            .filter_map(|inc| inc.resolved_file_name().map(Path::to_path_buf))
            .collect();
        for included in includes {
            if let Some(included_doc) = self.snapshot.document(&included) {
                self.merge_environment(&included_doc)?;
            } else if !self.included.contains(&included) {
                self.run(&included, &[])?;
            }
        }

        self.env.add_macros(document.defined_macros());
        Ok(())
    }

    /// Resolves an include spelling to an absolute, existing file path.
    fn resolve_file(&mut self, file_name: &str, kind: IncludeKind) -> Option<PathBuf> {
        if is_injected_name(file_name) {
            return Some(PathBuf::from(file_name));
        }

        let as_path = Path::new(file_name);
        if as_path.is_absolute() {
            return self.check_file(as_path).then(|| as_path.to_path_buf());
        }

        if let Some(current) = &self.current {
            match kind {
                IncludeKind::Local => {
                    if let Some(dir) = current.file_name().parent() {
                        let candidate = normalize_path(&dir.join(file_name));
                        if self.check_file(&candidate) {
                            return Some(candidate);
                        }
                        // Fall through: a missed local include continues as a
                        // global one (the standard's source-file-inclusion
                        // fallback).
                    }
                }
                IncludeKind::Next => {
                    if let Some(dir) = current.file_name().parent() {
                        let current_dir = clean_dir_path(dir);
                        if let Some(pos) = self
                            .header_paths
                            .iter()
                            .position(|hp| hp.path() == current_dir)
                        {
                            return self.resolve_file_from(file_name, pos + 1);
                        }
                    }
                }
                IncludeKind::Global => {}
            }
        }

        if let Some(cached) = self.file_name_cache.get(file_name) {
            return Some(cached.clone());
        }
        let resolved = self.resolve_file_from(file_name, 0)?;
        self.file_name_cache
            .insert(file_name.to_string(), resolved.clone());
        Some(resolved)
    }

    fn resolve_file_from(&self, file_name: &str, start: usize) -> Option<PathBuf> {
        let slash = file_name.find('/');
        for header_path in self.header_paths.get(start..).unwrap_or(&[]) {
            let candidate = match header_path.kind() {
                HeaderPathKind::Framework => {
                    // `Foo/Bar.h` against a framework root probes
                    // `<root>/Foo.framework/Headers/Bar.h`.
                    let Some(slash) = slash else {
                        continue;
                    };
                    let (framework, rest) = file_name.split_at(slash);
                    header_path
                        .path()
                        .join(format!("{framework}.framework/Headers{rest}"))
                }
                HeaderPathKind::Regular => header_path.path().join(file_name),
            };
            let candidate = normalize_path(&candidate);
            // Working-copy membership counts as existence: an unsaved buffer
            // may not be on disk at all.
            if self.working_copy.contains(&candidate) || self.check_file(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn check_file(&self, absolute: &Path) -> bool {
        if absolute.as_os_str().is_empty() {
            return false;
        }
        if self.included.contains(absolute) || self.working_copy.contains(absolute) {
            return true;
        }
        self.fs.is_file(absolute)
    }

    fn file_size_exceeds_limit(&self, absolute: &Path, limit_mb: u64) -> bool {
        match self.fs.file_size(absolute) {
            Ok(size) => size > limit_mb.saturating_mul(1024 * 1024),
            Err(_) => false,
        }
    }

    /// Working copy first, disk second (UTF-8, CRLF already normalized by
    /// the file system layer). Returns the editor revision alongside, 0 for
    /// disk content.
    fn get_file_contents(&self, absolute: &Path) -> Option<(Arc<String>, u32)> {
        if let Some(entry) = self.working_copy.get(absolute) {
            return Some(entry);
        }
        match self.fs.read_to_string(absolute) {
            Ok(text) => Some((Arc::new(text), 0)),
            Err(err) => {
                tracing::warn!(
                    target: "cinder.indexer",
                    file = %absolute.display(),
                    error = %err,
                    "could not read file"
                );
                None
            }
        }
    }

    fn switch_current_document(&mut self, document: Option<Document>) -> Option<Document> {
        std::mem::replace(&mut self.current, document)
    }

    /// Copies a macro, stamping it with the working-copy revision of its
    /// defining file at use time.
    fn macro_with_revision(&self, mac: &Macro) -> Macro {
        mac.clone()
            .with_file_revision(self.working_copy.revision(mac.file()))
    }
}

/// Synthetic names supplied by callers for injected prefix content (e.g. a
/// configuration pseudo-file) are angle-bracket-wrapped and bypass both path
/// resolution and the included-set bookkeeping.
fn is_injected_name(file_name: &str) -> bool {
    file_name.starts_with('<') && file_name.ends_with('>')
}

fn is_injected_file(path: &Path) -> bool {
    is_injected_name(&path.to_string_lossy())
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

impl Client for SourceProcessor {
    fn env(&mut self) -> &mut Environment {
        &mut self.env
    }

    fn macro_added(&mut self, mac: &Macro) {
        if let Some(current) = self.current.as_mut() {
            current.append_macro(mac.clone());
        }
    }

    fn passed_macro_definition_check(
        &mut self,
        bytes_offset: usize,
        utf16_offset: usize,
        line: u32,
        mac: &Macro,
    ) {
        let mac = self.macro_with_revision(mac);
        if let Some(current) = self.current.as_mut() {
            let usage = MacroUse {
                bytes_offset,
                bytes_length: mac.name().len(),
                utf16_offset,
                utf16_length: utf16_len(mac.name()),
                line,
                arguments: Vec::new(),
                mac,
            };
            current.add_macro_use(usage);
        }
    }

    fn failed_macro_definition_check(&mut self, bytes_offset: usize, utf16_offset: usize, name: &str) {
        if let Some(current) = self.current.as_mut() {
            current.add_undefined_macro_use(UndefinedMacroUse {
                name: name.to_string(),
                bytes_offset,
                utf16_offset,
            });
        }
    }

    fn notify_macro_reference(&mut self, bytes_offset: usize, utf16_offset: usize, line: u32, mac: &Macro) {
        let mac = self.macro_with_revision(mac);
        if let Some(current) = self.current.as_mut() {
            let usage = MacroUse {
                bytes_offset,
                bytes_length: mac.name().len(),
                utf16_offset,
                utf16_length: utf16_len(mac.name()),
                line,
                arguments: Vec::new(),
                mac,
            };
            current.add_macro_use(usage);
        }
    }

    fn start_expanding_macro(
        &mut self,
        bytes_offset: usize,
        utf16_offset: usize,
        line: u32,
        mac: &Macro,
        actuals: &[MacroArgumentReference],
    ) {
        let mac = self.macro_with_revision(mac);
        if let Some(current) = self.current.as_mut() {
            let usage = MacroUse {
                bytes_offset,
                bytes_length: mac.name().len(),
                utf16_offset,
                utf16_length: utf16_len(mac.name()),
                line,
                arguments: actuals.to_vec(),
                mac,
            };
            current.add_macro_use(usage);
        }
    }

    fn stop_expanding_macro(&mut self, _bytes_offset: usize, _mac: &Macro) {}

    fn mark_as_include_guard(&mut self, macro_name: &str) {
        if let Some(current) = self.current.as_mut() {
            current.set_include_guard_macro_name(macro_name);
        }
    }

    fn start_skipping_blocks(&mut self, utf16_offset: usize) {
        if let Some(current) = self.current.as_mut() {
            current.start_skipping_blocks(utf16_offset);
        }
    }

    fn stop_skipping_blocks(&mut self, utf16_offset: usize) {
        if let Some(current) = self.current.as_mut() {
            current.stop_skipping_blocks(utf16_offset);
        }
    }

    fn source_needed(&mut self, line: u32, spelling: &str, kind: IncludeKind) -> Result<(), Cancelled> {
        SourceProcessor::source_needed(self, line, spelling, kind, &[])
    }
}
