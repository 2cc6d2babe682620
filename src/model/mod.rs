//! Source model: documents, their syntax and scope tables, and snapshots.
//!
//! Building a document runs preprocess → tokenize → parse → bind. The
//! tokenize stage is enough to answer whether a file mentions an identifier,
//! so callers can stop there.

pub mod bind;
pub mod document;
pub mod intern;
pub mod lexer;
pub mod preprocess;
pub mod snapshot;
pub mod syntax;

pub use bind::{Arity, QualifiedPath, Scope, ScopeId, ScopeKind, ScopeTable, Symbol, SymbolKind};
pub use document::{BuildCounts, BuildStats, Document, DocumentBuilder, FileStamp, LexedUnit, Origin};
pub use intern::{Ident, IdentTable};
pub use snapshot::{DependencyTable, DocumentCache, Snapshot, Workspace};
