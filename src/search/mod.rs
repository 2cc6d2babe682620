//! Find-references search.
//!
//! A search computes the candidate files of a symbol, obtains each one's
//! document (reusing the cached one when it cannot have changed and skipping
//! files that never spell the name), then walks the document's syntax tree
//! and reports every occurrence that resolves to the symbol.

pub mod orchestrator;
pub mod sink;
pub mod walker;

pub use orchestrator::{
    FindReferences, PreparedSearch, SearchEvent, SearchHandle, SearchOutcome, SearchState,
    SearchSummary,
};
pub use sink::{
    CollectingSink, Location, NoProgress, ProgressReporter, ResultHandle, ResultSink,
};
pub use walker::{walk, MatchResult, Matches};

use crate::model::bind::Symbol;
use crate::model::{Document, Snapshot};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files that could reference `symbol`: its declaring file, then every file
/// that transitively includes it, in dependency order.
pub fn candidate_files(snapshot: &Snapshot, symbol: &Symbol) -> Vec<PathBuf> {
    dependency_closure(snapshot, &symbol.file)
}

/// `file` followed by every file that transitively includes it.
pub fn dependency_closure(snapshot: &Snapshot, file: &Path) -> Vec<PathBuf> {
    let mut files = vec![file.to_path_buf()];
    for dependent in snapshot.depends_on(file) {
        if !files.contains(&dependent) {
            files.push(dependent);
        }
    }
    files
}

/// Why a candidate file was not walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The file never spells the name.
    NotMentioned,
    /// The file could not be read.
    Unreadable,
    /// The file was read but could not be parsed.
    ParseFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotMentioned => "name not mentioned",
            SkipReason::Unreadable => "unreadable",
            SkipReason::ParseFailed => "parse failed",
        };
        f.write_str(text)
    }
}

/// Result of [`obtain_document`].
#[derive(Debug, Clone)]
pub enum Obtained {
    /// The snapshot's document was current.
    Reused(Arc<Document>),
    /// The file was rebuilt and installed.
    Rebuilt(Arc<Document>),
    /// Nothing to walk.
    Skipped(SkipReason),
}

impl Obtained {
    /// Document to walk, if any.
    pub fn document(&self) -> Option<&Arc<Document>> {
        match self {
            Obtained::Reused(doc) | Obtained::Rebuilt(doc) => Some(doc),
            Obtained::Skipped(_) => None,
        }
    }
}

/// Get a walkable document for `path`, or decide the file cannot mention
/// `name`.
///
/// A current cached document answers the existence check without any I/O
/// beyond one metadata call. Otherwise the file is read and tokenized, and
/// only parsed and bound when its tokens spell `name`. A rebuilt document is
/// installed into `snapshot` and, when the entry is unchanged since the
/// snapshot was captured, into the session cache.
pub fn obtain_document(snapshot: &mut Snapshot, path: &Path, name: &str) -> Obtained {
    let previous = snapshot.get(path).cloned();

    if let Some(doc) = &previous {
        if doc.is_current() {
            if !doc.mentions(name) {
                log::debug!("{}: skipped, '{}' not mentioned", path.display(), name);
                return Obtained::Skipped(SkipReason::NotMentioned);
            }
            log::debug!("{}: reusing cached document", path.display());
            return Obtained::Reused(Arc::clone(doc));
        }
    }

    let builder = snapshot.builder().clone();
    let (source, origin) = match builder.read(path) {
        Ok(read) => read,
        Err(e) => {
            log::debug!("{}: skipped, {}", path.display(), e);
            return Obtained::Skipped(SkipReason::Unreadable);
        }
    };

    let unit = builder.lex(path, source, origin);
    if !unit.mentions(name) {
        log::debug!("{}: skipped after lexing, '{}' not mentioned", path.display(), name);
        return Obtained::Skipped(SkipReason::NotMentioned);
    }

    let doc = {
        let view: &Snapshot = snapshot;
        match builder.parse(unit, &|p: &Path| view.file_exists(p)) {
            Ok(doc) => Arc::new(doc),
            Err(e) => {
                log::warn!("{}: skipped, {}", path.display(), e);
                return Obtained::Skipped(SkipReason::ParseFailed);
            }
        }
    };

    snapshot.insert(Arc::clone(&doc));
    if let Some(cache) = snapshot.cache() {
        if !cache.replace(previous.as_ref(), Arc::clone(&doc)) {
            log::debug!(
                "{}: session cache changed during the search, keeping its entry",
                path.display()
            );
        }
    }
    log::debug!("{}: rebuilt", path.display());
    Obtained::Rebuilt(doc)
}
