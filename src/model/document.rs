//! Parsed and bound translation units.
//!
//! A [`Document`] is immutable once built. Rebuilding a file produces a new
//! `Document`; holders of the old `Arc<Document>` keep a consistent view.

use super::bind::{self, ScopeId, ScopeTable};
use super::intern::IdentTable;
use super::lexer::{self, Token};
use super::preprocess::{self, Macro, Preprocessed};
use super::syntax::{self, Ast};
use crate::config::ProjectConfig;
use crate::error::{CppRefError, Result};
use crate::ingest::{self, includes::{resolve_include, IncludeFact}};
use ropey::Rope;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Modification times closer than this to the moment a file was stamped may
/// not tell two writes apart.
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// What a disk-backed document was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    /// File length in bytes.
    pub len: u64,
    /// Modification time, where the platform reports one.
    pub modified: Option<SystemTime>,
    /// SHA-256 of the contents, hex encoded.
    pub sha256: String,
    /// When the contents were read.
    pub stamped_at: SystemTime,
}

impl FileStamp {
    fn new(bytes: &[u8], metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            sha256: compute_hash(bytes),
            stamped_at: SystemTime::now(),
        }
    }

    /// Whether `metadata` describes the same file contents.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.len == metadata.len() && self.modified == metadata.modified().ok()
    }

    /// Whether the file at `path` still has the stamped contents.
    ///
    /// Length and mtime decide, except when the file was stamped within
    /// [`RACY_WINDOW`] of its mtime: a same-length rewrite in that window can
    /// keep the mtime, so the contents are hashed again.
    pub fn is_current(&self, path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        if !self.matches(&metadata) {
            return false;
        }
        if !self.is_racy() {
            return true;
        }
        std::fs::read(path)
            .map(|bytes| compute_hash(&bytes) == self.sha256)
            .unwrap_or(false)
    }

    fn is_racy(&self) -> bool {
        match self.modified {
            Some(modified) => self
                .stamped_at
                .duration_since(modified)
                .map_or(true, |age| age < RACY_WINDOW),
            None => true,
        }
    }
}

/// Compute SHA-256 hash of file contents.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Where a document's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Read from the file on disk.
    Disk(FileStamp),
    /// Unsaved editor contents.
    Buffer {
        /// Monotonic edit counter of the buffer.
        revision: u64,
    },
}

/// One parsed, bound translation unit.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    origin: Origin,
    source: String,
    rope: Rope,
    text: String,
    macros: BTreeMap<String, Macro>,
    tokens: Vec<Token>,
    idents: IdentTable,
    includes: Vec<IncludeFact>,
    ast: Ast,
    scopes: ScopeTable,
}

impl Document {
    /// File identity.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the text came from.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Raw source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Preprocessed text; same length and line structure as [`source`](Self::source).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Macros defined at the end of the file.
    pub fn macros(&self) -> &BTreeMap<String, Macro> {
        &self.macros
    }

    /// Token stream of the preprocessed text.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Identifiers present in the translation unit.
    pub fn idents(&self) -> &IdentTable {
        &self.idents
    }

    /// Active include directives.
    pub fn includes(&self) -> &[IncludeFact] {
        &self.includes
    }

    /// Lowered syntax tree.
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Scope and symbol table.
    pub fn scopes(&self) -> &ScopeTable {
        &self.scopes
    }

    /// Whether the translation unit mentions `name` at all.
    pub fn mentions(&self, name: &str) -> bool {
        self.idents.contains(name)
    }

    /// Whether the document still reflects its source.
    ///
    /// Buffers are always current. Disk documents compare their stamp with a
    /// metadata call, hashing the contents only when the stamp is racy.
    pub fn is_current(&self) -> bool {
        match &self.origin {
            Origin::Buffer { .. } => true,
            Origin::Disk(stamp) => stamp.is_current(&self.path),
        }
    }

    /// Text of a 1-based line without its terminator.
    pub fn line_text(&self, line: u32) -> Option<String> {
        let index = (line as usize).checked_sub(1)?;
        if index >= self.rope.len_lines() {
            return None;
        }
        let text = self.rope.line(index).to_string();
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Byte offset of a 1-based position.
    pub fn offset_at(&self, line: u32, column: u32) -> Option<usize> {
        self.scopes
            .offset_of(line, column)
            .filter(|&o| o <= self.source.len())
    }

    /// Index of the token covering `offset`.
    pub fn token_index_at(&self, offset: usize) -> Option<usize> {
        let index = self.tokens.partition_point(|t| t.end() <= offset);
        let token = self.tokens.get(index)?;
        (token.offset <= offset).then_some(index)
    }

    /// Innermost scope at a 1-based position.
    pub fn find_scope_at(&self, line: u32, column: u32) -> ScopeId {
        self.scopes.find_scope_at(line, column)
    }
}

/// A file that has been read, preprocessed and tokenized but not parsed.
///
/// Searches test [`mentions`](Self::mentions) before paying for a parse.
#[derive(Debug)]
pub struct LexedUnit {
    path: PathBuf,
    origin: Origin,
    source: String,
    preprocessed: Preprocessed,
    tokens: Vec<Token>,
    idents: IdentTable,
}

impl LexedUnit {
    /// File identity.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the unit mentions `name`.
    pub fn mentions(&self, name: &str) -> bool {
        self.idents.contains(name)
    }

    /// Tokens produced.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Counters of the work a [`DocumentBuilder`] has done.
#[derive(Debug, Default)]
pub struct BuildStats {
    reads: AtomicUsize,
    lexes: AtomicUsize,
    parses: AtomicUsize,
    binds: AtomicUsize,
}

/// Point-in-time copy of [`BuildStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BuildCounts {
    /// Files read from disk.
    pub reads: usize,
    /// Units preprocessed and tokenized.
    pub lexes: usize,
    /// Units parsed with tree-sitter.
    pub parses: usize,
    /// Units bound.
    pub binds: usize,
}

impl BuildStats {
    /// Current counter values.
    pub fn counts(&self) -> BuildCounts {
        BuildCounts {
            reads: self.reads.load(Ordering::Relaxed),
            lexes: self.lexes.load(Ordering::Relaxed),
            parses: self.parses.load(Ordering::Relaxed),
            binds: self.binds.load(Ordering::Relaxed),
        }
    }

    /// Number of parses so far.
    pub fn parses(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }
}

impl std::ops::Sub for BuildCounts {
    type Output = BuildCounts;

    fn sub(self, earlier: BuildCounts) -> BuildCounts {
        BuildCounts {
            reads: self.reads - earlier.reads,
            lexes: self.lexes - earlier.lexes,
            parses: self.parses - earlier.parses,
            binds: self.binds - earlier.binds,
        }
    }
}

/// Builds documents under one project configuration.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    config: Arc<ProjectConfig>,
    stats: Arc<BuildStats>,
}

impl DocumentBuilder {
    /// Builder for `config`.
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(BuildStats::default()),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Work counters shared by all clones of this builder.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Read a file and stamp it.
    pub fn read(&self, path: &Path) -> Result<(String, Origin)> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        let bytes = std::fs::read(path).map_err(|e| CppRefError::io(path, e))?;
        let metadata = std::fs::metadata(path).map_err(|e| CppRefError::io(path, e))?;
        let stamp = FileStamp::new(&bytes, &metadata);
        Ok((ingest::decode_source(bytes), Origin::Disk(stamp)))
    }

    /// Preprocess and tokenize.
    pub fn lex(&self, path: &Path, source: String, origin: Origin) -> LexedUnit {
        self.stats.lexes.fetch_add(1, Ordering::Relaxed);
        let preprocessed = preprocess::preprocess(&source, &self.config.defines);
        let mut idents = IdentTable::new();
        let tokens = lexer::tokenize(&preprocessed.text, &mut idents);
        LexedUnit {
            path: path.to_path_buf(),
            origin,
            source,
            preprocessed,
            tokens,
            idents,
        }
    }

    /// Parse and bind a lexed unit.
    ///
    /// `exists` decides whether an include candidate is present.
    pub fn parse(&self, unit: LexedUnit, exists: &dyn Fn(&Path) -> bool) -> Result<Document> {
        let LexedUnit {
            path,
            origin,
            source,
            preprocessed,
            tokens,
            idents,
        } = unit;

        self.stats.parses.fetch_add(1, Ordering::Relaxed);
        let tree = syntax::parse_tree(&path, &preprocessed.text)?;
        let ast = syntax::lower(&tree, &preprocessed.text, &tokens);

        self.stats.binds.fetch_add(1, Ordering::Relaxed);
        let scopes = bind::bind(&path, &tree, &preprocessed.text);

        let includes = preprocessed
            .includes
            .iter()
            .map(|directive| IncludeFact {
                spelled: directive.spelled.clone(),
                kind: directive.kind,
                line: directive.line,
                resolved: resolve_include(
                    &path,
                    &directive.spelled,
                    directive.kind,
                    &self.config.include_paths,
                    exists,
                ),
            })
            .collect();

        if ast.error_count > 0 {
            log::debug!(
                "{}: {} syntax error node(s), continuing with recovered tree",
                path.display(),
                ast.error_count
            );
        }

        Ok(Document {
            rope: Rope::from_str(&source),
            path,
            origin,
            source,
            text: preprocessed.text,
            macros: preprocessed.macros,
            tokens,
            idents,
            includes,
            ast,
            scopes,
        })
    }

    /// Read, lex, parse and bind a file from disk.
    pub fn build_file(&self, path: &Path, exists: &dyn Fn(&Path) -> bool) -> Result<Document> {
        let (source, origin) = self.read(path)?;
        let unit = self.lex(path, source, origin);
        self.parse(unit, exists)
    }

    /// Build a document from unsaved editor contents.
    pub fn build_buffer(
        &self,
        path: &Path,
        text: String,
        revision: u64,
        exists: &dyn Fn(&Path) -> bool,
    ) -> Result<Document> {
        let unit = self.lex(path, text, Origin::Buffer { revision });
        self.parse(unit, exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn on_disk(path: &Path) -> bool {
        path.is_file()
    }

    #[test]
    fn test_build_file_counts_every_stage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.cpp");
        std::fs::write(&path, "int foo = 1;\n").unwrap();

        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder.build_file(&path, &on_disk).unwrap();
        assert!(doc.mentions("foo"));
        assert!(!doc.mentions("bar"));
        assert_eq!(
            builder.stats().counts(),
            BuildCounts {
                reads: 1,
                lexes: 1,
                parses: 1,
                binds: 1,
            }
        );
    }

    #[test]
    fn test_lex_alone_does_not_parse() {
        let builder = DocumentBuilder::new(ProjectConfig::default());
        let unit = builder.lex(
            Path::new("/x.cpp"),
            "int a; // foo\n".to_string(),
            Origin::Buffer { revision: 1 },
        );
        assert!(unit.mentions("a"));
        assert!(!unit.mentions("foo"));
        assert_eq!(builder.stats().parses(), 0);
    }

    #[test]
    fn test_is_current_tracks_disk_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.h");
        std::fs::write(&path, "int a;\n").unwrap();

        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder.build_file(&path, &on_disk).unwrap();
        assert!(doc.is_current());

        std::fs::write(&path, "int a; int b;\n").unwrap();
        assert!(!doc.is_current());

        std::fs::remove_file(&path).unwrap();
        assert!(!doc.is_current());
    }

    #[test]
    fn test_same_length_rewrite_with_same_mtime_is_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.h");
        std::fs::write(&path, "int a;\n").unwrap();

        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder.build_file(&path, &on_disk).unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::fs::write(&path, "int b;\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        assert!(!doc.is_current());
    }

    #[test]
    fn test_invalid_utf8_keeps_disk_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.cpp");
        std::fs::write(&path, b"int g() { /*\xff\xfe*/ return foo; }\n").unwrap();

        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder.build_file(&path, &on_disk).unwrap();
        let foo = doc.idents().find("foo").unwrap();
        let token = doc.tokens().iter().find(|t| t.ident == Some(foo)).unwrap();
        assert_eq!(token.offset, 24);
        assert_eq!(token.column, 25);
        assert_eq!(doc.source().len(), 31);
    }

    #[test]
    fn test_includes_resolved_against_includer() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.h"), "int foo;\n").unwrap();
        let path = dir.path().join("b.cpp");
        std::fs::write(&path, "#include \"a.h\"\n#include <missing.h>\n").unwrap();

        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder.build_file(&path, &on_disk).unwrap();
        assert_eq!(doc.includes().len(), 2);
        assert_eq!(doc.includes()[0].resolved, Some(dir.path().join("a.h")));
        assert_eq!(doc.includes()[1].resolved, None);
    }

    #[test]
    fn test_inactive_region_not_mentioned() {
        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder
            .build_buffer(
                Path::new("/x.cpp"),
                "#ifdef FEATURE\nint foo;\n#endif\nint bar;\n".to_string(),
                1,
                &on_disk,
            )
            .unwrap();
        assert!(!doc.mentions("foo"));
        assert!(doc.mentions("bar"));
        assert_eq!(doc.line_text(2).as_deref(), Some("int foo;"));
    }

    #[test]
    fn test_line_text_and_offsets() {
        let builder = DocumentBuilder::new(ProjectConfig::default());
        let doc = builder
            .build_buffer(
                Path::new("/x.cpp"),
                "int a;\r\nint b;\n".to_string(),
                1,
                &on_disk,
            )
            .unwrap();
        assert_eq!(doc.line_text(1).as_deref(), Some("int a;"));
        assert_eq!(doc.line_text(2).as_deref(), Some("int b;"));
        assert_eq!(doc.line_text(9), None);
        let offset = doc.offset_at(2, 5).unwrap();
        let token = &doc.tokens()[doc.token_index_at(offset).unwrap()];
        assert_eq!(token.text(doc.text()), "b");
    }
}
