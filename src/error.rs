//! cppref error types.
//!
//! All errors are typed and provide root cause information. Per-file
//! failures during a running search are recovered locally and never
//! reach this type; only failures to start a search do.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for cppref operations.
#[derive(Error, Debug)]
pub enum CppRefError {
    /// I/O error during file operations.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the I/O error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Tree-sitter parsing error.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// The parse error message.
        message: String,
    },

    /// The starting symbol of a search is unusable.
    #[error("Invalid symbol '{name}': {reason}")]
    InvalidSymbol {
        /// The symbol name as given.
        name: String,
        /// Why the symbol was rejected.
        reason: String,
    },

    /// Symbol not found in the snapshot.
    #[error("Symbol not found: {name}")]
    SymbolNotFound {
        /// The symbol name or cursor description.
        name: String,
        /// The file that was searched, if known.
        file: Option<PathBuf>,
    },

    /// Symbol name is ambiguous without position context.
    #[error("Ambiguous symbol '{name}': declared at {candidates:?}")]
    AmbiguousSymbol {
        /// The ambiguous symbol name.
        name: String,
        /// `file:line:column` of every candidate declaration.
        candidates: Vec<String>,
    },

    /// Project configuration could not be loaded.
    #[error("Invalid configuration {path}: {message}")]
    Config {
        /// The configuration file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl CppRefError {
    /// Build an I/O error carrying the offending path.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CppRefError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable identifier of the error variant, used in JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CppRefError::Io { .. } => "Io",
            CppRefError::Parse { .. } => "Parse",
            CppRefError::InvalidSymbol { .. } => "InvalidSymbol",
            CppRefError::SymbolNotFound { .. } => "SymbolNotFound",
            CppRefError::AmbiguousSymbol { .. } => "AmbiguousSymbol",
            CppRefError::Config { .. } => "Config",
            CppRefError::Json(_) => "Json",
            CppRefError::Other(_) => "Other",
        }
    }

    /// File associated with the error, when there is one.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            CppRefError::Io { path, .. } | CppRefError::Config { path, .. } => Some(path),
            CppRefError::Parse { file, .. } => Some(file),
            CppRefError::SymbolNotFound { file, .. } => file.as_deref(),
            _ => None,
        }
    }

    /// Remediation hint for the CLI.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CppRefError::SymbolNotFound { .. } => {
                Some("Check the position or pass --kind to narrow the lookup")
            }
            CppRefError::AmbiguousSymbol { .. } => {
                Some("Use --at FILE:LINE:COL to pick one declaration")
            }
            CppRefError::Config { .. } => Some("cppref.json must be a JSON object"),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CppRefError {
    fn from(err: std::io::Error) -> Self {
        CppRefError::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

/// Result type alias for cppref operations.
pub type Result<T> = std::result::Result<T, CppRefError>;
