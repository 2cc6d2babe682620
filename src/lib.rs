//! cppref: incremental find-references for C and C++.
//!
//! This library builds an immutable, AST-based model of a C/C++ project
//! and searches it for the references to a symbol, rebuilding only the
//! files that could mention it and streaming matches while it runs.

#![warn(missing_docs)]
// env_logger is used by src/main.rs (binary), not this library
#![expect(unused_crate_dependencies)]

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod resolve;
pub mod search;

/// Re-export common error types for convenience.
pub use error::{CppRefError, Result};

/// Re-export the model entry points for convenience.
pub use model::{Document, Snapshot, Symbol, SymbolKind, Workspace};

/// Re-export the search entry points for convenience.
pub use search::{FindReferences, MatchResult, SearchHandle, SearchSummary};

/// cppref version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
