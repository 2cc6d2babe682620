//! Project configuration.
//!
//! The active macro configuration and include search paths come from an
//! optional `cppref.json` at the project root. Command-line flags are
//! layered on top with [`ProjectConfig::define`] and
//! [`ProjectConfig::add_include_path`].

use crate::error::{CppRefError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up at the project root.
pub const CONFIG_FILE: &str = "cppref.json";

/// Default source globs, relative to the project root.
pub const DEFAULT_SOURCES: &[&str] = &[
    "**/*.h", "**/*.hh", "**/*.hpp", "**/*.hxx", "**/*.c", "**/*.cc", "**/*.cpp", "**/*.cxx",
];

/// Preprocessing and discovery settings for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Macros predefined for every translation unit (`NAME -> value`).
    pub defines: BTreeMap<String, String>,

    /// Include search paths. Relative entries are resolved against the root.
    pub include_paths: Vec<PathBuf>,

    /// Source globs. Empty means [`DEFAULT_SOURCES`].
    pub sources: Vec<String>,

    /// Globs of files to leave out of the project.
    pub exclude: Vec<String>,
}

impl ProjectConfig {
    /// Load `cppref.json` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| CppRefError::io(&path, e))?;
        let mut config: ProjectConfig =
            serde_json::from_str(&text).map_err(|e| CppRefError::Config {
                path: path.clone(),
                message: e.to_string(),
            })?;
        config.anchor(root);
        Ok(config)
    }

    /// Add a macro definition, as `-D NAME=VALUE` (value defaults to `1`).
    pub fn define(&mut self, definition: &str) {
        match definition.split_once('=') {
            Some((name, value)) => self.defines.insert(name.trim().to_string(), value.to_string()),
            None => self.defines.insert(definition.trim().to_string(), "1".to_string()),
        };
    }

    /// Append an include search path.
    pub fn add_include_path(&mut self, dir: PathBuf) {
        if !self.include_paths.contains(&dir) {
            self.include_paths.push(dir);
        }
    }

    /// Source globs in effect.
    pub fn source_patterns(&self) -> Vec<String> {
        if self.sources.is_empty() {
            DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
        } else {
            self.sources.clone()
        }
    }

    /// Make relative include paths absolute against `root`.
    pub fn anchor(&mut self, root: &Path) {
        for dir in &mut self.include_paths {
            if dir.is_relative() {
                *dir = crate::ingest::normalize_path(&root.join(&*dir));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.source_patterns().len(), DEFAULT_SOURCES.len());
    }

    #[test]
    fn test_load_anchors_include_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "defines": { "FEATURE": "2" }, "include_paths": ["include"] }"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.defines.get("FEATURE").map(String::as_str), Some("2"));
        assert_eq!(config.include_paths, vec![dir.path().join("include")]);
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{ "defnes": {} }"#).unwrap();

        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "Config");
    }

    #[test]
    fn test_define_flag_forms() {
        let mut config = ProjectConfig::default();
        config.define("DEBUG");
        config.define("LEVEL=3");
        assert_eq!(config.defines["DEBUG"], "1");
        assert_eq!(config.defines["LEVEL"], "3");
    }
}
