//! Language detection from file extensions.
//!
//! Table-driven language detection. No heuristics, no guessing.
//! Unknown extensions return None, never infer from content.

use std::path::Path;

/// Source languages understood by the reference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .hpp, .cc, .hh, .cxx, .hxx)
    Cpp,
}

impl Language {
    /// Convert language to string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

/// Whether a file is meant to be included or compiled on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// Header file.
    Header,
    /// Translation unit main file.
    Source,
}

/// Detect the source language from a file path.
///
/// Uses table-driven extension mapping. Returns None for unknown extensions.
///
/// # Examples
///
/// ```
/// # use cppref::ingest::detect::{detect_language, Language};
/// # use std::path::Path;
/// assert_eq!(detect_language(Path::new("main.cpp")), Some(Language::Cpp));
/// assert_eq!(detect_language(Path::new("file.txt")), None);
/// ```
pub fn detect_language(path: &Path) -> Option<Language> {
    detect(path).map(|(language, _)| language)
}

/// Detect header/source role from a file path.
pub fn detect_role(path: &Path) -> Option<FileRole> {
    detect(path).map(|(_, role)| role)
}

fn detect(path: &Path) -> Option<(Language, FileRole)> {
    let extension = path.extension()?.to_str()?;

    // Table-driven mapping (case-sensitive)
    let detected = match extension {
        "c" => (Language::C, FileRole::Source),
        "h" => (Language::C, FileRole::Header),
        "cpp" | "cc" | "cxx" => (Language::Cpp, FileRole::Source),
        "hpp" | "hh" | "hxx" => (Language::Cpp, FileRole::Header),
        _ => return None,
    };

    Some(detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_c() {
        assert_eq!(detect_language(Path::new("main.c")), Some(Language::C));
        assert_eq!(detect_language(Path::new("header.h")), Some(Language::C));
    }

    #[test]
    fn test_detect_cpp() {
        assert_eq!(detect_language(Path::new("main.cpp")), Some(Language::Cpp));
        assert_eq!(detect_language(Path::new("header.hpp")), Some(Language::Cpp));
        assert_eq!(detect_language(Path::new("main.cc")), Some(Language::Cpp));
        assert_eq!(detect_language(Path::new("main.cxx")), Some(Language::Cpp));
    }

    #[test]
    fn test_roles() {
        assert_eq!(detect_role(Path::new("a.h")), Some(FileRole::Header));
        assert_eq!(detect_role(Path::new("a.hh")), Some(FileRole::Header));
        assert_eq!(detect_role(Path::new("src/a.cpp")), Some(FileRole::Source));
    }

    #[test]
    fn test_unknown_extension_returns_none() {
        assert_eq!(detect_language(Path::new("file.rs")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        assert_eq!(detect_language(Path::new("")), None);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(detect_language(Path::new("FILE.CPP")), None);
    }
}
