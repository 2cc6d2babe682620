//! C/C++ include directive resolution.
//!
//! The preprocessor reports every active `#include`; this module turns the
//! spelled header name into a file on disk using the same search order a
//! compiler driver uses for `"..."` and `<...>` forms.

use super::normalize_path;
use std::path::{Path, PathBuf};

/// Kind of include directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `#include <header.h>`, searched on include paths only.
    System,
    /// `#include "header.h"`, searched next to the includer first.
    Local,
}

/// A single include directive in a translation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeFact {
    /// Header name as written between the delimiters.
    pub spelled: String,

    /// Which delimiter form was used.
    pub kind: IncludeKind,

    /// Line of the directive (1-based).
    pub line: u32,

    /// File the directive resolves to, if it could be found.
    pub resolved: Option<PathBuf>,
}

impl IncludeFact {
    /// Path segments of the spelled header (e.g. `["boost", "filesystem.hpp"]`).
    pub fn segments(&self) -> Vec<&str> {
        self.spelled.split('/').collect()
    }
}

/// Resolve a spelled include against the includer and the search paths.
///
/// `exists` decides whether a candidate file is present; the workspace passes
/// a check that consults both the disk and in-memory editor buffers.
pub fn resolve_include(
    includer: &Path,
    spelled: &str,
    kind: IncludeKind,
    include_paths: &[PathBuf],
    exists: &dyn Fn(&Path) -> bool,
) -> Option<PathBuf> {
    if spelled.is_empty() {
        return None;
    }

    let direct = Path::new(spelled);
    if direct.is_absolute() {
        let candidate = normalize_path(direct);
        return exists(&candidate).then_some(candidate);
    }

    if kind == IncludeKind::Local {
        if let Some(dir) = includer.parent() {
            let candidate = normalize_path(&dir.join(spelled));
            if exists(&candidate) {
                return Some(candidate);
            }
        }
    }

    include_paths
        .iter()
        .map(|dir| normalize_path(&dir.join(spelled)))
        .find(|candidate| exists(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn on_disk(path: &Path) -> bool {
        path.is_file()
    }

    #[test]
    fn test_local_include_next_to_includer() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.h"), "").unwrap();
        let includer = dir.path().join("b.cpp");

        let resolved = resolve_include(&includer, "a.h", IncludeKind::Local, &[], &on_disk);
        assert_eq!(resolved, Some(dir.path().join("a.h")));
    }

    #[test]
    fn test_system_include_ignores_includer_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.h"), "").unwrap();
        let includer = dir.path().join("b.cpp");

        let resolved = resolve_include(&includer, "a.h", IncludeKind::System, &[], &on_disk);
        assert_eq!(resolved, None);

        let paths = vec![dir.path().to_path_buf()];
        let resolved = resolve_include(&includer, "a.h", IncludeKind::System, &paths, &on_disk);
        assert_eq!(resolved, Some(dir.path().join("a.h")));
    }

    #[test]
    fn test_nested_relative_include_is_normalized() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("include")).unwrap();
        std::fs::write(dir.path().join("include/x.h"), "").unwrap();
        let includer = dir.path().join("src/main.cpp");

        let resolved = resolve_include(
            &includer,
            "../include/x.h",
            IncludeKind::Local,
            &[],
            &on_disk,
        );
        assert_eq!(resolved, Some(dir.path().join("include/x.h")));
    }

    #[test]
    fn test_segments() {
        let fact = IncludeFact {
            spelled: "boost/filesystem.hpp".to_string(),
            kind: IncludeKind::System,
            line: 1,
            resolved: None,
        };
        assert_eq!(fact.segments(), vec!["boost", "filesystem.hpp"]);
    }
}
