//! End-to-end tests driving [`SourceProcessor`] over real file trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cinder_indexer::{
    CancelChecker, CheckDepth, DiagnosticKind, Document, GlobalSnapshot, HeaderPath, IncludeKind,
    Snapshot, SourceProcessor, WorkingCopy,
};

type Seen = Arc<Mutex<Vec<Arc<Document>>>>;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn collecting_processor(global: GlobalSnapshot) -> (SourceProcessor, Seen) {
    init_tracing();
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let processor = SourceProcessor::new(Snapshot::new(), global, move |doc: Arc<Document>| {
        sink.lock().unwrap().push(doc);
    });
    (processor, seen)
}

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn finished_files(seen: &Seen) -> Vec<PathBuf> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|doc| doc.file_name().to_path_buf())
        .collect()
}

#[test]
fn indexes_root_file_and_header() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "#define X 1\n");
    let main = write(
        temp.path(),
        "src/main.cpp",
        "#include <a.h>\nint main() { return X; }\n",
    );

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&main, &[]).unwrap();

    let snapshot = processor.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(seen.lock().unwrap().len(), 2);

    let main_doc = snapshot.document(&main).unwrap();
    assert!(main_doc.diagnostics().is_empty());
    assert_eq!(main_doc.includes().len(), 1);
    let include = &main_doc.includes()[0];
    assert_eq!(include.unresolved_file_name(), "a.h");
    assert_eq!(include.resolved_file_name(), Some(header.as_path()));
    assert_eq!(include.kind(), IncludeKind::Global);
    assert_eq!(include.line(), 1);
    assert!(main_doc.source().unwrap().contains("return 1;"));

    let header_doc = snapshot.document(&header).unwrap();
    assert_eq!(header_doc.defined_macros().len(), 1);
    assert_eq!(header_doc.defined_macros()[0].name(), "X");
}

#[test]
fn each_file_is_processed_once_per_run() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "inc/a.h", "#define X 1\n");
    write(temp.path(), "src/b.h", "#include <a.h>\nint b;\n");
    let main = write(
        temp.path(),
        "src/main.cpp",
        "#include \"b.h\"\n#include <a.h>\nint main() { return X; }\n",
    );

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&main, &[]).unwrap();

    let finished = finished_files(&seen);
    assert_eq!(finished.len(), 3);
    let header = temp.path().join("inc/a.h");
    assert_eq!(finished.iter().filter(|f| **f == header).count(), 1);
    assert_eq!(processor.snapshot().len(), 3);
}

#[test]
fn include_cycles_terminate() {
    let temp = tempfile::tempdir().unwrap();
    let a = write(temp.path(), "a.h", "#include \"b.h\"\nint a;\n");
    let b = write(temp.path(), "b.h", "#include \"a.h\"\nint b;\n");
    let main = write(temp.path(), "main.cpp", "#include \"a.h\"\n");

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.run(&main, &[]).unwrap();

    assert_eq!(seen.lock().unwrap().len(), 3);
    let snapshot = processor.snapshot();
    assert!(snapshot.contains(&a));
    assert!(snapshot.contains(&b));
    // The back-edge is recorded as resolved even though the target was not
    // reprocessed.
    let b_doc = snapshot.document(&b).unwrap();
    assert_eq!(b_doc.includes()[0].resolved_file_name(), Some(a.as_path()));
}

#[test]
fn unchanged_documents_are_reused_from_the_global_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "#define X 1\n");
    let main = write(
        temp.path(),
        "src/main.cpp",
        "#include <a.h>\nint main() { return X; }\n",
    );
    let header_paths = [HeaderPath::regular(temp.path().join("inc"))];

    let global = GlobalSnapshot::new();
    let (mut first, _) = collecting_processor(global.clone());
    first.set_header_paths(&header_paths);
    first.run(&main, &[]).unwrap();
    global.replace_with(first.snapshot());

    let (mut second, seen) = collecting_processor(global.clone());
    second.set_header_paths(&header_paths);
    second.run(&main, &[]).unwrap();

    // Nothing changed, so no document was rebuilt and the per-run snapshot
    // holds the very same instances the global snapshot does.
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(second.snapshot().len(), 2);
    let reused = second.snapshot().document(&header).unwrap();
    assert!(Arc::ptr_eq(&reused, &global.document(&header).unwrap()));
    let reused_main = second.snapshot().document(&main).unwrap();
    assert!(Arc::ptr_eq(&reused_main, &global.document(&main).unwrap()));
}

#[test]
fn changed_header_invalidates_dependents() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "#define X 1\n");
    let main = write(
        temp.path(),
        "src/main.cpp",
        "#include <a.h>\nint main() { return X; }\n",
    );
    let header_paths = [HeaderPath::regular(temp.path().join("inc"))];

    let global = GlobalSnapshot::new();
    let (mut first, _) = collecting_processor(global.clone());
    first.set_header_paths(&header_paths);
    first.run(&main, &[]).unwrap();
    global.replace_with(first.snapshot());

    write(temp.path(), "inc/a.h", "#define X 2\n");

    let (mut second, seen) = collecting_processor(global.clone());
    second.set_header_paths(&header_paths);
    second.run(&main, &[]).unwrap();

    // The header's fingerprint changed, and through the changed expansion so
    // did the root file's; both were rebuilt.
    assert_eq!(seen.lock().unwrap().len(), 2);
    let header_doc = second.snapshot().document(&header).unwrap();
    assert_eq!(header_doc.defined_macros()[0].definition(), "2");
    let main_doc = second.snapshot().document(&main).unwrap();
    assert!(main_doc.source().unwrap().contains("return 2;"));
}

#[test]
fn local_include_prefers_the_including_files_directory() {
    let temp = tempfile::tempdir().unwrap();
    let sibling = write(temp.path(), "src/a.h", "int sibling;\n");
    write(temp.path(), "inc/a.h", "int shadowed;\n");
    let main = write(temp.path(), "src/main.cpp", "#include \"a.h\"\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&main, &[]).unwrap();

    let main_doc = processor.snapshot().document(&main).unwrap();
    assert_eq!(
        main_doc.includes()[0].resolved_file_name(),
        Some(sibling.as_path())
    );
}

#[test]
fn local_include_falls_back_to_the_search_paths() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "int a;\n");
    let main = write(temp.path(), "src/main.cpp", "#include \"a.h\"\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&main, &[]).unwrap();

    let main_doc = processor.snapshot().document(&main).unwrap();
    assert_eq!(
        main_doc.includes()[0].resolved_file_name(),
        Some(header.as_path())
    );
    assert!(main_doc.diagnostics().is_empty());
}

#[test]
fn include_next_continues_past_the_current_directory() {
    let temp = tempfile::tempdir().unwrap();
    let first = write(temp.path(), "d1/a.h", "#include_next <a.h>\nint wrapper;\n");
    let second = write(temp.path(), "d2/a.h", "int wrapped;\n");
    let main = write(temp.path(), "src/main.cpp", "#include <a.h>\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[
        HeaderPath::regular(temp.path().join("d1")),
        HeaderPath::regular(temp.path().join("d2")),
    ]);
    processor.run(&main, &[]).unwrap();

    let snapshot = processor.snapshot();
    assert_eq!(
        snapshot.document(&main).unwrap().includes()[0].resolved_file_name(),
        Some(first.as_path())
    );
    let wrapper_doc = snapshot.document(&first).unwrap();
    let next = &wrapper_doc.includes()[0];
    assert_eq!(next.kind(), IncludeKind::Next);
    assert_eq!(next.resolved_file_name(), Some(second.as_path()));
}

#[test]
fn framework_headers_resolve_through_the_bundle_layout() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(
        temp.path(),
        "fw/Foo.framework/Headers/Bar.h",
        "int bar;\n",
    );
    let main = write(temp.path(), "src/main.cpp", "#include <Foo/Bar.h>\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::framework(temp.path().join("fw"))]);
    processor.run(&main, &[]).unwrap();

    let main_doc = processor.snapshot().document(&main).unwrap();
    assert_eq!(
        main_doc.includes()[0].resolved_file_name(),
        Some(header.as_path())
    );
    assert!(main_doc.diagnostics().is_empty());
}

#[test]
fn private_frameworks_are_searched_too() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path(),
        "fw/Foo.framework/Headers/Foo.h",
        "int foo;\n",
    );
    let private = write(
        temp.path(),
        "fw/Foo.framework/Frameworks/Sub.framework/Headers/S.h",
        "int sub;\n",
    );
    let main = write(temp.path(), "src/main.cpp", "#include <Sub/S.h>\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::framework(temp.path().join("fw"))]);
    processor.run(&main, &[]).unwrap();

    let main_doc = processor.snapshot().document(&main).unwrap();
    assert_eq!(
        main_doc.includes()[0].resolved_file_name(),
        Some(private.as_path())
    );
}

#[test]
fn unresolved_include_records_a_diagnostic() {
    let temp = tempfile::tempdir().unwrap();
    let main = write(temp.path(), "main.cpp", "#include <nope.h>\nint main() {}\n");

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.run(&main, &[]).unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    let main_doc = processor.snapshot().document(&main).unwrap();
    let include = &main_doc.includes()[0];
    assert_eq!(include.unresolved_file_name(), "nope.h");
    assert_eq!(include.resolved_file_name(), None);

    assert_eq!(main_doc.diagnostics().len(), 1);
    let diagnostic = &main_doc.diagnostics()[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::NoSuchFile);
    assert_eq!(diagnostic.line, 1);
    assert_eq!(diagnostic.message, "nope.h: No such file or directory");
}

#[test]
fn oversized_files_are_skipped_without_a_trace() {
    let temp = tempfile::tempdir().unwrap();
    let main = write(temp.path(), "main.cpp", "int main() {}\n");

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.set_file_size_limit_in_mb(Some(0));
    processor.run(&main, &[]).unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert!(processor.snapshot().is_empty());
}

#[test]
fn working_copy_overrides_disk_content() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "#define X 1\n");
    let main = write(
        temp.path(),
        "src/main.cpp",
        "#include <a.h>\nint main() { return X; }\n",
    );

    let mut working_copy = WorkingCopy::new();
    working_copy.insert(&header, "#define X 2\n", 7);

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.set_working_copy(working_copy);
    processor.run(&main, &[]).unwrap();

    let snapshot = processor.snapshot();
    let header_doc = snapshot.document(&header).unwrap();
    assert_eq!(header_doc.editor_revision(), 7);
    assert_eq!(header_doc.defined_macros()[0].definition(), "2");
    assert_eq!(header_doc.check_depth(), Some(CheckDepth::Full));

    let main_doc = snapshot.document(&main).unwrap();
    assert_eq!(main_doc.check_depth(), Some(CheckDepth::Fast));
    assert!(main_doc.source().unwrap().contains("return 2;"));
    // Macro uses carry the revision of the defining file's buffer.
    assert_eq!(main_doc.macro_uses()[0].mac.file_revision(), 7);
}

#[test]
fn cancellation_leaves_no_documents_behind() {
    let temp = tempfile::tempdir().unwrap();
    let main = write(temp.path(), "main.cpp", "int main() {}\n");

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    let cancel: CancelChecker = Arc::new(|| true);
    processor.set_cancel_checker(Some(cancel));

    assert!(processor.run(&main, &[]).is_err());
    assert!(seen.lock().unwrap().is_empty());
    assert!(processor.snapshot().is_empty());
}

#[test]
fn cached_documents_still_contribute_their_macros() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "inc/a.h", "#define X 1\n");
    let first = write(
        temp.path(),
        "src/one.cpp",
        "#include <a.h>\nint one() { return X; }\n",
    );
    let second = write(
        temp.path(),
        "src/two.cpp",
        "#include <a.h>\nint two() { return X; }\n",
    );

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&first, &[]).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);

    processor.reset_environment();
    processor.run(&second, &[]).unwrap();

    // The header came out of the per-run snapshot, but its macros were merged
    // back into the fresh environment before the second file continued.
    assert_eq!(seen.lock().unwrap().len(), 3);
    let second_doc = processor.snapshot().document(&second).unwrap();
    assert!(second_doc.source().unwrap().contains("return 1;"));
}

#[test]
fn injected_prefix_content_defines_macros_for_the_real_file() {
    let temp = tempfile::tempdir().unwrap();
    let main = write(
        temp.path(),
        "main.cpp",
        "int main() { return CFG; }\n",
    );
    let configuration = "<configuration>";

    let mut working_copy = WorkingCopy::new();
    working_copy.insert(configuration, "#define CFG 7\n", 1);

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_working_copy(working_copy);
    processor.run(configuration, &[]).unwrap();
    processor.run(&main, &[configuration.to_string()]).unwrap();

    let snapshot = processor.snapshot();
    assert!(snapshot.contains(Path::new(configuration)));

    let main_doc = snapshot.document(&main).unwrap();
    assert!(main_doc.source().unwrap().contains("return 7;"));
    let injected = &main_doc.includes()[0];
    assert_eq!(injected.unresolved_file_name(), configuration);
    assert_eq!(injected.line(), 0);
    assert_eq!(injected.kind(), IncludeKind::Local);
    assert_eq!(
        injected.resolved_file_name(),
        Some(Path::new(configuration))
    );
}

#[test]
fn todo_entries_are_cleared_as_documents_land() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "int a;\n");
    let main = write(temp.path(), "src/main.cpp", "#include <a.h>\n");

    let (mut processor, _) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.set_todo([main.clone(), header.clone()].into_iter().collect());
    processor.run(&main, &[]).unwrap();

    assert!(processor.todo().is_empty());
}

#[test]
fn removing_from_the_cache_forces_reprocessing() {
    let temp = tempfile::tempdir().unwrap();
    let header = write(temp.path(), "inc/a.h", "#define X 1\n");
    let one = write(temp.path(), "src/one.cpp", "#include <a.h>\n");
    let two = write(temp.path(), "src/two.cpp", "#include <a.h>\n");

    let (mut processor, seen) = collecting_processor(GlobalSnapshot::new());
    processor.set_header_paths(&[HeaderPath::regular(temp.path().join("inc"))]);
    processor.run(&one, &[]).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);

    write(temp.path(), "inc/a.h", "#define X 2\n");
    processor.remove_from_cache(&header);
    processor.reset_environment();
    processor.run(&two, &[]).unwrap();

    let header_doc = processor.snapshot().document(&header).unwrap();
    assert_eq!(header_doc.defined_macros()[0].definition(), "2");
}
