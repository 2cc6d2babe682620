//! Resolving syntax-tree walk over one document.

use crate::model::bind::Symbol;
use crate::model::intern::Ident;
use crate::model::syntax::{AstNode, Descendants, NameChecker, NodeKind};
use crate::model::{Document, Snapshot};
use crate::resolve::{self, LookupContext, NameResolver, Scratch};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// One reported reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// File containing the reference.
    pub file: PathBuf,
    /// 1-based line.
    pub line: u32,
    /// Source text of the line, without terminator.
    pub line_text: String,
    /// 0-based byte column of the name.
    pub column: u32,
    /// Length of the name in bytes.
    pub length: usize,
}

/// Lazy sequence of the references to one symbol in one document.
///
/// Matches come in pre-order of the document's syntax tree.
pub struct Matches<'a> {
    doc: &'a Document,
    snapshot: &'a Snapshot,
    resolver: &'a dyn NameResolver,
    target: &'a Symbol,
    ident: Option<Ident>,
    nodes: Descendants<'a>,
    scratch: Scratch,
    pending: VecDeque<MatchResult>,
}

/// Walk `doc` for references to `target`.
///
/// `target` must be a canonical declaration; occurrences match when they
/// canonicalize to the same file, line and column. The target's own name
/// token is not reported.
pub fn walk<'a>(
    doc: &'a Document,
    target: &'a Symbol,
    snapshot: &'a Snapshot,
    resolver: &'a dyn NameResolver,
) -> Matches<'a> {
    Matches {
        doc,
        snapshot,
        resolver,
        target,
        ident: doc.idents().find(&target.name),
        nodes: doc.ast().root.descendants(),
        scratch: Scratch::new(),
        pending: VecDeque::new(),
    }
}

impl<'a> Matches<'a> {
    /// Token indices where `node` spells the target's name.
    ///
    /// Every segment of a qualified name is a separate spelling, so a class
    /// or namespace used as a qualifier is found too.
    fn spellings(&self, node: &AstNode, ident: Ident) -> Vec<usize> {
        match &node.kind {
            NodeKind::SimpleName(name) | NodeKind::TemplateId(name) => {
                if name.ident == ident {
                    vec![name.token]
                } else {
                    Vec::new()
                }
            }
            NodeKind::QualifiedName(qualified) => {
                let doc = self.doc;
                let derived = match &qualified.name {
                    Some(name) => Some(name.clone()),
                    None => NameChecker::new(doc.tokens(), doc.text())
                        .check(qualified.first_token, qualified.last_token),
                };
                match derived {
                    Some(name) => name
                        .segments
                        .iter()
                        .filter(|segment| segment.ident == ident)
                        .map(|segment| segment.token)
                        .collect(),
                    None => {
                        let spelled = doc.tokens()[qualified.first_token..=qualified.last_token]
                            .iter()
                            .any(|t| t.ident == Some(ident));
                        if spelled {
                            let (line, column) = doc.scopes().position_of(node.span.start);
                            log::warn!(
                                "{}:{}:{}: cannot derive qualified name, skipping occurrence",
                                doc.path().display(),
                                line,
                                column
                            );
                        }
                        Vec::new()
                    }
                }
            }
            NodeKind::Container(_) => Vec::new(),
        }
    }

    fn check(&self, node: &'a AstNode, at_token: usize) -> Option<MatchResult> {
        let doc = self.doc;
        let (index, query) = resolve::occurrence_query(doc, node, Some(at_token))?;
        let token = &doc.tokens()[index];
        if doc.path() == self.target.file
            && token.line == self.target.line
            && token.column == self.target.column
        {
            return None;
        }

        let ctx = LookupContext::new(doc, self.snapshot, &self.scratch, token.offset);
        let resolved = match doc.scopes().symbol_declared_at(token.offset) {
            Some(declared) => declared,
            None => {
                let candidates = self.resolver.resolve(&ctx, &query);
                resolve::canonical(self.resolver, &ctx, candidates, query.call_arity)?
            }
        };
        let home = ctx.document_of(resolved)?;
        let canonical = self
            .resolver
            .canonical_declaration(&ctx.relocate(home, resolved.offset), resolved);
        if !canonical.same_declaration(self.target) {
            return None;
        }

        Some(MatchResult {
            file: doc.path().to_path_buf(),
            line: token.line,
            line_text: doc.line_text(token.line).unwrap_or_default(),
            column: token.column - 1,
            length: token.len,
        })
    }
}

impl<'a> Iterator for Matches<'a> {
    type Item = MatchResult;

    fn next(&mut self) -> Option<MatchResult> {
        let ident = self.ident?;
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(found);
            }
            let node = self.nodes.next()?;
            for token in self.spellings(node, ident) {
                if let Some(found) = self.check(node, token) {
                    self.pending.push_back(found);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::model::Workspace;
    use crate::resolve::ScopeResolver;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, Snapshot) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let ws = Workspace::open(dir.path(), ProjectConfig::default()).unwrap();
        let snapshot = ws.snapshot();
        (dir, snapshot)
    }

    fn positions(matches: Matches<'_>) -> Vec<(u32, u32, usize)> {
        matches.map(|m| (m.line, m.column, m.length)).collect()
    }

    #[test]
    fn test_walk_reports_tail_of_qualified_name() {
        let (dir, snapshot) = project(&[
            ("a.h", "namespace Ns {\nint foo(int x);\n}\n"),
            ("b.cpp", "#include \"a.h\"\nint main() { return Ns::foo(1); }\n"),
        ]);
        let header = snapshot.get(&dir.path().join("a.h")).unwrap();
        let target = header.scopes().named("foo").next().unwrap();
        let doc = snapshot.get(&dir.path().join("b.cpp")).unwrap();
        let resolver = ScopeResolver::new();

        let found: Vec<MatchResult> = walk(doc, target, &snapshot, &resolver).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].column, 24);
        assert_eq!(found[0].length, 3);
        assert_eq!(found[0].line_text, "int main() { return Ns::foo(1); }");
        let column = found[0].column as usize;
        assert_eq!(&found[0].line_text[column..column + found[0].length], "foo");
    }

    #[test]
    fn test_walk_skips_shadowing_local() {
        let (dir, snapshot) = project(&[(
            "a.cpp",
            "int count;\nvoid f() {\n  count = 1;\n  int count = 2;\n  count = 3;\n}\n",
        )]);
        let doc = snapshot.get(&dir.path().join("a.cpp")).unwrap();
        let target = doc.scopes().named("count").next().unwrap();
        let resolver = ScopeResolver::new();

        assert_eq!(positions(walk(doc, target, &snapshot, &resolver)), vec![(3, 2, 5)]);
    }

    #[test]
    fn test_walk_reports_definition_of_declared_function() {
        let (dir, snapshot) = project(&[(
            "a.cpp",
            "void step();\nvoid step() {}\nvoid run() { step(); }\n",
        )]);
        let doc = snapshot.get(&dir.path().join("a.cpp")).unwrap();
        let target = doc.scopes().named("step").next().unwrap();
        let resolver = ScopeResolver::new();

        assert_eq!(
            positions(walk(doc, target, &snapshot, &resolver)),
            vec![(2, 5, 4), (3, 13, 4)]
        );
    }

    #[test]
    fn test_walk_distinguishes_members_by_object_type() {
        let (dir, snapshot) = project(&[(
            "a.cpp",
            "struct A { int v; };\nstruct B { int v; };\nint f(A a, B b) { return a.v + b.v; }\n",
        )]);
        let doc = snapshot.get(&dir.path().join("a.cpp")).unwrap();
        let target = doc.scopes().named("v").nth(1).unwrap();
        let resolver = ScopeResolver::new();

        assert_eq!(positions(walk(doc, target, &snapshot, &resolver)), vec![(3, 34, 1)]);
    }

    #[test]
    fn test_walk_reports_classes_and_namespaces_used_as_qualifiers() {
        let (dir, snapshot) = project(&[
            (
                "w.h",
                "struct W { static int n; void bump(); };\nnamespace Ns { int x; }\n",
            ),
            (
                "w.cpp",
                "#include \"w.h\"\nint W::n = 0;\nvoid W::bump() {}\nint g() { W w; return Ns::x; }\n",
            ),
        ]);
        let header = snapshot.get(&dir.path().join("w.h")).unwrap();
        let doc = snapshot.get(&dir.path().join("w.cpp")).unwrap();
        let resolver = ScopeResolver::new();

        let class = header.scopes().named("W").next().unwrap();
        assert_eq!(
            positions(walk(doc, class, &snapshot, &resolver)),
            vec![(2, 4, 1), (3, 5, 1), (4, 10, 1)]
        );

        let namespace = header.scopes().named("Ns").next().unwrap();
        assert_eq!(
            positions(walk(doc, namespace, &snapshot, &resolver)),
            vec![(4, 22, 2)]
        );
    }

    #[test]
    fn test_walk_without_mention_yields_nothing() {
        let (dir, snapshot) = project(&[("a.cpp", "int foo;\n"), ("b.cpp", "int bar;\n")]);
        let a = snapshot.get(&dir.path().join("a.cpp")).unwrap();
        let target = a.scopes().named("foo").next().unwrap();
        let b = snapshot.get(&dir.path().join("b.cpp")).unwrap();
        let resolver = ScopeResolver::new();

        assert_eq!(walk(b, target, &snapshot, &resolver).count(), 0);
    }
}
