//! Incremental model tests.
//!
//! These tests check how searches and workspace edits share the session
//! cache: what gets rebuilt, what is reused, and what a captured snapshot
//! keeps seeing.

#[cfg(test)]
mod tests {
    use cppref::config::ProjectConfig;
    use cppref::model::{Symbol, Workspace};
    use cppref::resolve::ScopeResolver;
    use cppref::search::{self, CollectingSink, FindReferences, NoProgress};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, Workspace) {
        let dir = TempDir::new().expect("Failed to create temp project");
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).expect("Failed to write source");
        }
        let workspace =
            Workspace::open(dir.path(), ProjectConfig::default()).expect("Failed to open project");
        (dir, workspace)
    }

    fn scenario() -> (TempDir, Workspace) {
        project(&[
            ("a.h", "#pragma once\nint foo(int x);\n"),
            ("b.cpp", "#include \"a.h\"\nint use_b() { return foo(1); }\n"),
            ("c.cpp", "#include \"a.h\"\nint use_c() { return foo(2); }\n"),
            ("e.cpp", "int standalone() { return 0; }\n"),
        ])
    }

    fn foo(dir: &TempDir, ws: &Workspace) -> Symbol {
        ws.snapshot()
            .get(&dir.path().join("a.h"))
            .expect("a.h not indexed")
            .scopes()
            .named("foo")
            .next()
            .expect("foo not declared")
            .clone()
    }

    fn file_names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rebuilt_document_is_reused_by_next_search() {
        let (dir, ws) = scenario();
        let target = foo(&dir, &ws);
        std::fs::write(
            dir.path().join("b.cpp"),
            "#include \"a.h\"\nint use_b() { return foo(10) + 1; }\n",
        )
        .unwrap();
        let search = FindReferences::new(Arc::new(ScopeResolver::new()));

        let mut first = CollectingSink::new();
        let summary = search
            .run(ws.snapshot(), &target, &mut first, &mut NoProgress)
            .unwrap();
        assert_eq!(summary.files_rebuilt, 1);
        assert_eq!(summary.work.parses, 1);

        let mut second = CollectingSink::new();
        let summary = search
            .run(ws.snapshot(), &target, &mut second, &mut NoProgress)
            .unwrap();
        assert_eq!(summary.files_rebuilt, 0);
        assert_eq!(summary.work.reads, 0);
        assert_eq!(summary.work.parses, 0);
        assert_eq!(first.into_results(), second.into_results());
    }

    #[test]
    fn test_buffer_that_adds_an_include_becomes_a_candidate() {
        let (dir, mut ws) = scenario();
        let target = foo(&dir, &ws);
        let before = search::candidate_files(&ws.snapshot(), &target);
        assert_eq!(file_names(&before), vec!["a.h", "b.cpp", "c.cpp"]);

        ws.update_buffer(
            &dir.path().join("e.cpp"),
            "#include \"a.h\"\nint standalone() { return foo(0); }\n",
        )
        .unwrap();
        let snapshot = ws.snapshot();
        let after = search::candidate_files(&snapshot, &target);
        assert_eq!(file_names(&after), vec!["a.h", "b.cpp", "c.cpp", "e.cpp"]);

        let mut sink = CollectingSink::new();
        FindReferences::new(Arc::new(ScopeResolver::new()))
            .run(snapshot, &target, &mut sink, &mut NoProgress)
            .unwrap();
        let last = sink.into_results().pop().unwrap();
        assert_eq!(last.file, dir.path().join("e.cpp"));
        assert_eq!((last.line, last.column, last.length), (2, 26, 3));
    }

    #[test]
    fn test_buffer_edit_is_not_written_to_disk() {
        let (dir, mut ws) = scenario();
        let path = dir.path().join("b.cpp");
        let doc = ws.update_buffer(&path, "int replaced;\n").unwrap();

        assert!(doc.is_current());
        assert_eq!(doc.source(), "int replaced;\n");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#include \"a.h\"\nint use_b() { return foo(1); }\n"
        );
        assert_eq!(ws.snapshot().depends_on(&dir.path().join("a.h")).len(), 1);
    }

    #[test]
    fn test_captured_snapshot_keeps_its_documents() {
        let (dir, mut ws) = scenario();
        let path = dir.path().join("c.cpp");
        let captured = ws.snapshot();

        ws.update_buffer(&path, "int changed;\n").unwrap();

        assert_eq!(
            captured.get(&path).unwrap().source(),
            "#include \"a.h\"\nint use_c() { return foo(2); }\n"
        );
        assert_eq!(ws.snapshot().get(&path).unwrap().source(), "int changed;\n");
        assert!(captured.depends_on(&dir.path().join("a.h")).contains(&path));
    }

    #[test]
    fn test_refresh_drops_deleted_file() {
        let (dir, mut ws) = scenario();
        let path = dir.path().join("c.cpp");
        std::fs::remove_file(&path).unwrap();

        assert!(ws.refresh(&path).unwrap().is_none());
        let snapshot = ws.snapshot();
        assert!(!snapshot.contains(&path));
        let target = foo(&dir, &ws);
        assert_eq!(
            file_names(&search::candidate_files(&snapshot, &target)),
            vec!["a.h", "b.cpp"]
        );
    }

    #[test]
    fn test_refresh_rebuilds_from_disk() {
        let (dir, mut ws) = scenario();
        let path = dir.path().join("e.cpp");
        std::fs::write(&path, "#include \"a.h\"\n").unwrap();

        let doc = ws.refresh(&path).unwrap().unwrap();
        assert_eq!(doc.includes().len(), 1);
        assert!(ws.snapshot().depends_on(&dir.path().join("a.h")).contains(&path));
    }
}
