//! Semantic name resolution.
//!
//! A [`NameResolver`] answers which declarations a name occurrence could
//! denote; [`canonical`] reduces that candidate set to the one symbol used
//! for identity comparison. [`ScopeResolver`] is the implementation used by
//! searches and the CLI.

pub mod lookup;

pub use lookup::ScopeResolver;

use crate::error::{CppRefError, Result};
use crate::model::bind::{ScopeId, Symbol, SymbolKind};
use crate::model::syntax::{AstNode, MemberObject, NameChecker, NodeKind};
use crate::model::{Document, Snapshot};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Longest chain of using-declarations followed during canonicalization.
pub const MAX_USING_DEPTH: usize = 8;

/// How a name occurrence is qualified.
#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier<'q> {
    /// `name`
    None,
    /// `A::B::name` or `::name`
    Scope {
        /// Leading `::`.
        global: bool,
        /// Segments before the name.
        segments: Vec<&'q str>,
    },
    /// `obj.name`, `ptr->name`, `this->name`
    Member(&'q MemberObject),
}

/// A name to resolve at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct NameQuery<'q> {
    /// Unqualified spelling.
    pub name: &'q str,
    /// Qualification.
    pub qualifier: Qualifier<'q>,
    /// Offset of the name token; local declarations after it are invisible.
    pub offset: usize,
    /// Argument count when the name is called.
    pub call_arity: Option<usize>,
}

/// Memo tables valid for one walk over one snapshot.
#[derive(Debug, Default)]
pub struct Scratch {
    closures: RefCell<HashMap<PathBuf, Rc<Vec<PathBuf>>>>,
    types: RefCell<HashMap<String, Option<Vec<String>>>>,
}

impl Scratch {
    /// Empty scratch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `doc` transitively includes, depth-first pre-order.
    pub fn include_closure(&self, snapshot: &Snapshot, doc: &Document) -> Rc<Vec<PathBuf>> {
        if let Some(closure) = self.closures.borrow().get(doc.path()) {
            return Rc::clone(closure);
        }
        let mut order: Vec<PathBuf> = Vec::new();
        for fact in doc.includes() {
            let Some(target) = &fact.resolved else {
                continue;
            };
            if target.as_path() == doc.path() || order.contains(target) {
                continue;
            }
            order.push(target.clone());
            for nested in snapshot.includes_closure(target) {
                if nested.as_path() != doc.path() && !order.contains(&nested) {
                    order.push(nested);
                }
            }
        }
        let closure = Rc::new(order);
        self.closures
            .borrow_mut()
            .insert(doc.path().to_path_buf(), Rc::clone(&closure));
        closure
    }

    /// Memoized type resolution keyed by `key`.
    pub fn resolve_type(
        &self,
        key: String,
        compute: impl FnOnce() -> Option<Vec<String>>,
    ) -> Option<Vec<String>> {
        if let Some(path) = self.types.borrow().get(&key) {
            return path.clone();
        }
        let path = compute();
        self.types.borrow_mut().insert(key, path.clone());
        path
    }
}

/// Everything a resolver needs to look a name up at one position.
#[derive(Debug, Clone, Copy)]
pub struct LookupContext<'a> {
    /// Innermost scope at the position.
    pub scope: ScopeId,
    /// Last symbol declared before the position that is visible from it.
    pub last_visible_symbol: Option<&'a Symbol>,
    /// Memo tables of the current walk.
    pub scratch: &'a Scratch,
    /// Document containing the occurrence.
    pub document: &'a Document,
    /// Read-only view of the rest of the project.
    pub snapshot: &'a Snapshot,
}

impl<'a> LookupContext<'a> {
    /// Context at byte `offset` of `document`.
    pub fn new(
        document: &'a Document,
        snapshot: &'a Snapshot,
        scratch: &'a Scratch,
        offset: usize,
    ) -> Self {
        let scopes = document.scopes();
        let scope = scopes.scope_at(offset);
        Self {
            scope,
            last_visible_symbol: scopes.last_visible_symbol(scope, offset),
            scratch,
            document,
            snapshot,
        }
    }

    /// Document declaring `symbol`, if reachable from this context.
    pub fn document_of(&self, symbol: &Symbol) -> Option<&'a Document> {
        if symbol.file == self.document.path() {
            return Some(self.document);
        }
        self.snapshot.get(&symbol.file).map(|doc| doc.as_ref())
    }

    /// The same lookup state moved to `offset` of `document`.
    pub fn relocate(&self, document: &'a Document, offset: usize) -> Self {
        Self::new(document, self.snapshot, self.scratch, offset)
    }
}

/// Semantic name lookup.
pub trait NameResolver: Send + Sync {
    /// Candidate declarations `query` could denote in `ctx`, in lookup order.
    /// An empty result means the name cannot be resolved there.
    fn resolve<'a>(&self, ctx: &LookupContext<'a>, query: &NameQuery<'_>) -> Vec<&'a Symbol>;

    /// The first declaration of the entity `symbol` declares.
    ///
    /// `ctx` must be positioned in the document declaring `symbol`.
    fn canonical_declaration<'a>(&self, ctx: &LookupContext<'a>, symbol: &'a Symbol)
        -> &'a Symbol;
}

/// Reduce a candidate set to its canonical symbol.
///
/// Function candidates that cannot take `call_arity` arguments are dropped
/// unless that would drop all of them; using-declarations are followed to
/// their target; the first remaining candidate wins.
pub fn canonical<'a>(
    resolver: &dyn NameResolver,
    ctx: &LookupContext<'a>,
    candidates: Vec<&'a Symbol>,
    call_arity: Option<usize>,
) -> Option<&'a Symbol> {
    let viable: Vec<&'a Symbol> = match call_arity {
        Some(args) => candidates
            .iter()
            .copied()
            .filter(|s| !s.kind.is_callable() || s.arity.map_or(true, |a| a.accepts(args)))
            .collect(),
        None => Vec::new(),
    };
    let first = if viable.is_empty() {
        candidates.first().copied()?
    } else {
        viable[0]
    };
    follow_using(resolver, ctx, first, 0)
}

/// Target of a using-declaration, or `symbol` itself.
pub fn follow_using<'a>(
    resolver: &dyn NameResolver,
    ctx: &LookupContext<'a>,
    symbol: &'a Symbol,
    depth: usize,
) -> Option<&'a Symbol> {
    if symbol.kind != SymbolKind::Using {
        return Some(symbol);
    }
    if depth >= MAX_USING_DEPTH {
        return None;
    }
    let target = symbol.target.as_ref()?;
    let (name, qualifier) = target.segments.split_last()?;
    let document = ctx.document_of(symbol)?;
    let at = ctx.relocate(document, symbol.offset);
    let query = NameQuery {
        name,
        qualifier: Qualifier::Scope {
            global: target.global,
            segments: qualifier.iter().map(String::as_str).collect(),
        },
        offset: symbol.offset,
        call_arity: None,
    };
    let next = resolver
        .resolve(&at, &query)
        .into_iter()
        .find(|s| !s.same_declaration(symbol))?;
    follow_using(resolver, &at, next, depth + 1)
}

/// Lookup query for a name node.
///
/// `at_token` selects a qualifier segment of a qualified name; by default
/// the trailing name is queried. Returns the queried token with the query,
/// or `None` when the name's structure cannot be derived even from tokens.
pub fn occurrence_query<'d>(
    doc: &'d Document,
    node: &'d AstNode,
    at_token: Option<usize>,
) -> Option<(usize, NameQuery<'d>)> {
    let idents = doc.idents();
    match &node.kind {
        NodeKind::SimpleName(name) | NodeKind::TemplateId(name) => {
            let token = &doc.tokens()[name.token];
            Some((
                name.token,
                NameQuery {
                    name: idents.resolve(name.ident),
                    qualifier: match &name.object {
                        Some(object) => Qualifier::Member(object),
                        None => Qualifier::None,
                    },
                    offset: token.offset,
                    call_arity: name.call_arity,
                },
            ))
        }
        NodeKind::QualifiedName(qualified) => {
            let structure = match &qualified.name {
                Some(name) => name.clone(),
                None => NameChecker::new(doc.tokens(), doc.text())
                    .check(qualified.first_token, qualified.last_token)?,
            };
            let index = at_token
                .and_then(|t| structure.segments.iter().position(|s| s.token == t))
                .unwrap_or(structure.segments.len() - 1);
            let segment = structure.segments[index];
            let is_tail = index == structure.segments.len() - 1;
            Some((
                segment.token,
                NameQuery {
                    name: idents.resolve(segment.ident),
                    qualifier: if index == 0 && !structure.global {
                        Qualifier::None
                    } else {
                        Qualifier::Scope {
                            global: structure.global,
                            segments: structure.segments[..index]
                                .iter()
                                .map(|s| idents.resolve(s.ident))
                                .collect(),
                        }
                    },
                    offset: doc.tokens()[segment.token].offset,
                    call_arity: if is_tail { qualified.call_arity } else { None },
                },
            ))
        }
        NodeKind::Container(_) => None,
    }
}

/// Resolve the symbol under a 1-based cursor position.
///
/// A declaration under the cursor is returned as is; a reference is
/// resolved and canonicalized.
pub fn symbol_under_cursor(
    snapshot: &Snapshot,
    resolver: &dyn NameResolver,
    file: &Path,
    line: u32,
    column: u32,
) -> Result<Symbol> {
    let not_found = || CppRefError::SymbolNotFound {
        name: format!("{}:{}:{}", file.display(), line, column),
        file: Some(file.to_path_buf()),
    };
    let doc = snapshot.get(file).ok_or_else(not_found)?;
    let offset = doc.offset_at(line, column).ok_or_else(not_found)?;
    let index = doc.token_index_at(offset).ok_or_else(not_found)?;
    let token = &doc.tokens()[index];
    if token.ident.is_none() {
        return Err(not_found());
    }

    if let Some(symbol) = doc.scopes().symbol_declared_at(token.offset) {
        return Ok(symbol.clone());
    }

    let node = doc.ast().name_at_token(index).ok_or_else(not_found)?;
    let (_, query) = occurrence_query(doc, node, Some(index)).ok_or_else(not_found)?;
    let scratch = Scratch::new();
    let ctx = LookupContext::new(doc, snapshot, &scratch, token.offset);
    let candidates = resolver.resolve(&ctx, &query);
    canonical(resolver, &ctx, candidates, query.call_arity)
        .cloned()
        .ok_or_else(not_found)
}

/// Find the declaration of `name` in `file`, optionally narrowed by kind.
///
/// Redeclarations of one entity (prototype and definition, overloads in the
/// same scope) count as one; distinct entities are ambiguous.
pub fn find_declaration(
    snapshot: &Snapshot,
    file: &Path,
    name: &str,
    kind: Option<SymbolKind>,
) -> Result<Symbol> {
    let doc = snapshot.get(file).ok_or_else(|| CppRefError::SymbolNotFound {
        name: name.to_string(),
        file: Some(file.to_path_buf()),
    })?;

    let matches: Vec<&Symbol> = doc
        .scopes()
        .named(name)
        .filter(|s| s.kind != SymbolKind::Using)
        .filter(|s| kind.map_or(true, |k| s.kind == k))
        .collect();

    let Some(first) = matches.first().copied() else {
        return Err(CppRefError::SymbolNotFound {
            name: name.to_string(),
            file: Some(file.to_path_buf()),
        });
    };

    let same_entity = |s: &Symbol| {
        s.same_declaration(first)
            || (!s.local
                && !first.local
                && s.scope_path == first.scope_path
                && first.kind.is_compatible(s.kind))
    };
    if matches.iter().all(|s| same_entity(s)) {
        return Ok(first.clone());
    }

    Err(CppRefError::AmbiguousSymbol {
        name: name.to_string(),
        candidates: matches.iter().map(|s| s.location()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::model::Workspace;
    use tempfile::TempDir;

    fn workspace(files: &[(&str, &str)]) -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let ws = Workspace::open(dir.path(), ProjectConfig::default()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_find_declaration_merges_redeclarations() {
        let (dir, ws) = workspace(&[("a.cpp", "void foo();\nvoid foo() {}\n")]);
        let snapshot = ws.snapshot();
        let symbol = find_declaration(&snapshot, &dir.path().join("a.cpp"), "foo", None).unwrap();
        assert_eq!((symbol.line, symbol.column), (1, 6));
    }

    #[test]
    fn test_find_declaration_reports_ambiguity() {
        let (dir, ws) = workspace(&[(
            "a.cpp",
            "int value;\nvoid f() { int value = 1; }\n",
        )]);
        let snapshot = ws.snapshot();
        let err = find_declaration(&snapshot, &dir.path().join("a.cpp"), "value", None).unwrap_err();
        assert_eq!(err.kind(), "AmbiguousSymbol");

        let narrowed = find_declaration(
            &snapshot,
            &dir.path().join("a.cpp"),
            "value",
            Some(SymbolKind::Variable),
        );
        assert!(narrowed.is_err());
    }

    #[test]
    fn test_find_declaration_missing() {
        let (dir, ws) = workspace(&[("a.cpp", "int value;\n")]);
        let err = find_declaration(&ws.snapshot(), &dir.path().join("a.cpp"), "nope", None)
            .unwrap_err();
        assert_eq!(err.kind(), "SymbolNotFound");
    }

    #[test]
    fn test_symbol_under_cursor_on_reference_resolves_declaration() {
        let (dir, ws) = workspace(&[
            ("a.h", "namespace Ns {\nint foo(int x);\n}\n"),
            ("b.cpp", "#include \"a.h\"\nint main() { return Ns::foo(1); }\n"),
        ]);
        let snapshot = ws.snapshot();
        let resolver = ScopeResolver::new();
        let symbol =
            symbol_under_cursor(&snapshot, &resolver, &dir.path().join("b.cpp"), 2, 25).unwrap();
        assert_eq!(symbol.file, dir.path().join("a.h"));
        assert_eq!((symbol.line, symbol.column), (2, 5));
        assert_eq!(symbol.qualified_name(), "Ns::foo");

        let ns =
            symbol_under_cursor(&snapshot, &resolver, &dir.path().join("b.cpp"), 2, 21).unwrap();
        assert_eq!(ns.kind, SymbolKind::Namespace);
    }

    #[test]
    fn test_symbol_under_cursor_on_whitespace_fails() {
        let (dir, ws) = workspace(&[("a.cpp", "int  value;\n")]);
        let resolver = ScopeResolver::new();
        let err = symbol_under_cursor(&ws.snapshot(), &resolver, &dir.path().join("a.cpp"), 1, 4)
            .unwrap_err();
        assert_eq!(err.kind(), "SymbolNotFound");
    }
}
