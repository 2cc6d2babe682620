//! Filesystem side of the source model.
//!
//! Discovers the project's C/C++ sources, reads them, and resolves the
//! include directives that make up the snapshot's dependency relation.

pub mod detect;
pub mod includes;

use crate::config::ProjectConfig;
use crate::error::{CppRefError, Result};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Discover all project sources under `root` matching the configured globs.
///
/// Results are normalized, deduplicated and sorted so that snapshot order
/// is stable between runs.
pub fn discover_sources(root: &Path, config: &ProjectConfig) -> Result<Vec<PathBuf>> {
    let excluded = compile_patterns(root, &config.exclude)?;
    let mut found = BTreeSet::new();

    for pattern in config.source_patterns() {
        let full = root.join(&pattern);
        let full = full
            .to_str()
            .ok_or_else(|| CppRefError::Other(format!("Invalid UTF-8 in path: {:?}", full)))?;
        let paths = glob::glob(full)
            .map_err(|e| CppRefError::Other(format!("Invalid glob '{}': {}", pattern, e)))?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() || detect::detect_language(&path).is_none() {
                continue;
            }
            if excluded.iter().any(|p| p.matches_path(&path)) {
                continue;
            }
            found.insert(normalize_path(&path));
        }
    }

    Ok(found.into_iter().collect())
}

fn compile_patterns(root: &Path, patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            let full = root.join(p);
            glob::Pattern::new(&full.to_string_lossy())
                .map_err(|e| CppRefError::Other(format!("Invalid glob '{}': {}", p, e)))
        })
        .collect()
}

/// Decode source bytes as UTF-8 without moving any byte offset.
///
/// Each byte of an invalid sequence becomes one `?`, so offsets and columns
/// in the text are the offsets and columns of the file.
pub fn decode_source(bytes: Vec<u8>) -> String {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return text,
        Err(e) => e.into_bytes(),
    };
    let mut text = String::with_capacity(bytes.len());
    let mut rest = bytes.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                return text;
            }
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = e.error_len().unwrap_or(invalid.len());
                text.extend(std::iter::repeat('?').take(bad));
                rest = &invalid[bad..];
            }
        }
    }
}

/// Lexically normalize a path: drop `.` components and fold `..`.
///
/// The filesystem is not consulted, so symlinks are left alone.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Display name of a file for progress text (file name without directories).
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
