//! Scope-based C++ name lookup.
//!
//! Ordinary lookup walks the scope chain outward from the occurrence:
//! block and function scopes see only what was declared before the name;
//! class scopes see every member, including those of base classes;
//! namespace scopes see the namespace's members in every document the
//! translation unit includes. The first scope with a hit ends the walk.

use super::{LookupContext, NameQuery, NameResolver, Qualifier};
use crate::model::bind::{QualifiedPath, ScopeKind, Symbol, SymbolKind};
use crate::model::syntax::MemberObject;
use crate::model::Document;
use std::collections::HashSet;

/// Deepest base-class chain searched for a member.
pub const MAX_BASE_DEPTH: usize = 8;

/// Deepest typedef chain followed when resolving a type spelling.
const MAX_TYPEDEF_DEPTH: usize = 8;

/// [`NameResolver`] over the scope tables of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    _private: (),
}

impl ScopeResolver {
    /// Create a resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents visible from the context: includes first, then the
    /// document itself.
    fn visible<'a>(&self, ctx: &LookupContext<'a>) -> Vec<&'a Document> {
        let closure = ctx.scratch.include_closure(ctx.snapshot, ctx.document);
        let mut docs: Vec<&'a Document> = closure
            .iter()
            .filter_map(|path| ctx.snapshot.get(path))
            .map(|doc| doc.as_ref())
            .collect();
        docs.push(ctx.document);
        docs
    }

    fn unqualified<'a>(
        &self,
        ctx: &LookupContext<'a>,
        docs: &[&'a Document],
        name: &str,
        offset: usize,
        accept: &dyn Fn(&Symbol) -> bool,
    ) -> Vec<&'a Symbol> {
        let table = ctx.document.scopes();

        for scope_id in table.chain(ctx.scope) {
            let scope = table.scope(scope_id);
            let mut found: Vec<&'a Symbol> = Vec::new();

            match scope.kind {
                ScopeKind::Block | ScopeKind::Function | ScopeKind::Template => {
                    found.extend(
                        scope
                            .symbols
                            .iter()
                            .map(|&i| table.symbol(i))
                            .filter(|s| s.name == name)
                            .filter(|s| s.offset < offset || scope.kind == ScopeKind::Template)
                            .filter(|s| accept(*s)),
                    );
                    if found.is_empty() {
                        if let Some(owner) = &scope.member_of {
                            found.extend(
                                self.class_members(ctx, docs, owner, name, 0)
                                    .into_iter()
                                    .filter(|s| accept(*s)),
                            );
                        }
                    }
                }
                ScopeKind::Class => found.extend(
                    self.class_members(ctx, docs, &scope.path, name, 0)
                        .into_iter()
                        .filter(|s| accept(*s)),
                ),
                ScopeKind::Namespace | ScopeKind::Global => found.extend(
                    namespace_members(docs, &scope.path, name)
                        .into_iter()
                        .filter(|s| accept(*s)),
                ),
            }

            for directive in &scope.using_directives {
                if directive.offset >= offset {
                    continue;
                }
                let ns = self.namespace_path(ctx, docs, scope_id, &directive.path);
                found.extend(
                    namespace_members(docs, &ns, name)
                        .into_iter()
                        .filter(|s| accept(*s)),
                );
            }

            if !found.is_empty() {
                return dedup(found);
            }
        }
        Vec::new()
    }

    /// Members of the class (or namespace) at `path`, searching base
    /// classes when the class itself declares none.
    fn class_members<'a>(
        &self,
        ctx: &LookupContext<'a>,
        docs: &[&'a Document],
        path: &[String],
        name: &str,
        depth: usize,
    ) -> Vec<&'a Symbol> {
        let found = namespace_members(docs, path, name);
        if !found.is_empty() || depth >= MAX_BASE_DEPTH {
            return found;
        }

        for class in classes_at(docs, path) {
            let context = vec![class.scope_path.clone()];
            for base in &class.bases {
                let Some(base_path) = self.type_path(ctx, docs, base, &context) else {
                    continue;
                };
                if base_path.as_slice() == path {
                    continue;
                }
                let inherited = self.class_members(ctx, docs, &base_path, name, depth + 1);
                if !inherited.is_empty() {
                    return inherited;
                }
            }
        }
        Vec::new()
    }

    /// Resolve the namespace named by a using-directive.
    fn namespace_path(
        &self,
        ctx: &LookupContext<'_>,
        docs: &[&Document],
        scope: usize,
        path: &QualifiedPath,
    ) -> Vec<String> {
        if path.global {
            return path.segments.clone();
        }
        let table = ctx.document.scopes();
        for ancestor in table.chain(scope) {
            let mut candidate = table.scope(ancestor).path.clone();
            candidate.extend(path.segments.iter().cloned());
            if namespace_exists(docs, &candidate) {
                return candidate;
            }
        }
        path.segments.clone()
    }

    /// Resolve a type spelling to the path of the class it names.
    ///
    /// `contexts` are the scope paths to search outward from, innermost
    /// first. Typedefs are followed.
    fn type_path(
        &self,
        ctx: &LookupContext<'_>,
        docs: &[&Document],
        spelling: &str,
        contexts: &[Vec<String>],
    ) -> Option<Vec<String>> {
        let scopes: Vec<String> = contexts.iter().map(|c| c.join("::")).collect();
        let key = format!("{}|{}", spelling, scopes.join(";"));
        ctx.scratch
            .resolve_type(key, || self.compute_type_path(docs, spelling, contexts, 0))
    }

    fn compute_type_path(
        &self,
        docs: &[&Document],
        spelling: &str,
        contexts: &[Vec<String>],
        depth: usize,
    ) -> Option<Vec<String>> {
        if depth >= MAX_TYPEDEF_DEPTH {
            return None;
        }
        let written = QualifiedPath::parse(spelling);
        if written.segments.is_empty() {
            return None;
        }

        let mut bases: Vec<Vec<String>> = Vec::new();
        if written.global {
            bases.push(Vec::new());
        } else {
            for context in contexts {
                for len in (0..=context.len()).rev() {
                    let prefix = context[..len].to_vec();
                    if !bases.contains(&prefix) {
                        bases.push(prefix);
                    }
                }
            }
            if bases.is_empty() {
                bases.push(Vec::new());
            }
        }

        for base in bases {
            let mut candidate = base;
            candidate.extend(written.segments.iter().cloned());
            let Some((name, parent)) = candidate.split_last() else {
                continue;
            };
            for symbol in namespace_members(docs, parent, name) {
                if symbol.kind.is_class() || symbol.kind == SymbolKind::Enum {
                    return Some(candidate.clone());
                }
                if symbol.kind == SymbolKind::Typedef {
                    if let Some(aliased) = &symbol.type_name {
                        let inner = vec![symbol.scope_path.clone()];
                        return self.compute_type_path(docs, aliased, &inner, depth + 1);
                    }
                }
            }
        }
        None
    }

    /// Class path `this` refers to at the context position.
    fn enclosing_class(&self, ctx: &LookupContext<'_>) -> Option<Vec<String>> {
        let table = ctx.document.scopes();
        table.chain(ctx.scope).find_map(|id| {
            let scope = table.scope(id);
            match scope.kind {
                ScopeKind::Class => Some(scope.path.clone()),
                ScopeKind::Function => scope.member_of.clone(),
                _ => None,
            }
        })
    }

    fn member<'a>(
        &self,
        ctx: &LookupContext<'a>,
        docs: &[&'a Document],
        object: &MemberObject,
        name: &str,
        offset: usize,
    ) -> Vec<&'a Symbol> {
        let class_path = match object {
            MemberObject::This => self.enclosing_class(ctx),
            MemberObject::Name(variable) => {
                let holders = self.unqualified(ctx, docs, variable, offset, &|s| {
                    s.type_name.is_some() && !s.kind.is_type()
                });
                holders.first().and_then(|holder| {
                    let spelling = holder.type_name.as_deref()?;
                    let mut contexts = Vec::new();
                    if let Some(class) = self.enclosing_class(ctx) {
                        contexts.push(class);
                    }
                    if let Some(owner) = &holder.member_of {
                        contexts.push(owner.clone());
                    }
                    contexts.push(holder.scope_path.clone());
                    self.type_path(ctx, docs, spelling, &contexts)
                })
            }
            MemberObject::Unknown => None,
        };
        match class_path {
            Some(path) => self.class_members(ctx, docs, &path, name, 0),
            None => Vec::new(),
        }
    }

    fn qualified<'a>(
        &self,
        ctx: &LookupContext<'a>,
        docs: &[&'a Document],
        global: bool,
        segments: &[&str],
        name: &str,
        offset: usize,
    ) -> Vec<&'a Symbol> {
        let mut path: Vec<String> = Vec::new();
        if let Some((head, rest)) = segments.split_first() {
            if global {
                path.push(head.to_string());
            } else {
                let scopes = self.unqualified(ctx, docs, head, offset, &|s| {
                    s.kind == SymbolKind::Namespace
                        || s.kind.is_class()
                        || s.kind == SymbolKind::Enum
                        || s.kind == SymbolKind::Typedef
                        || s.kind == SymbolKind::Using
                });
                match scopes.first().copied().and_then(|s| super::follow_using(self, ctx, s, 0)) {
                    Some(symbol) if symbol.kind == SymbolKind::Typedef => {
                        let contexts = vec![symbol.scope_path.clone()];
                        match symbol
                            .type_name
                            .as_deref()
                            .and_then(|t| self.type_path(ctx, docs, t, &contexts))
                        {
                            Some(resolved) => path = resolved,
                            None => return Vec::new(),
                        }
                    }
                    Some(symbol) => path = symbol.member_path(),
                    None => path.push(head.to_string()),
                }
            }
            path.extend(rest.iter().map(|s| s.to_string()));
        }
        let found = self.class_members(ctx, docs, &path, name, 0);
        if found.is_empty() && path.last().map(String::as_str) == Some(name) {
            // `W::W`: constructors name their class
            return classes_at(docs, &path);
        }
        found
    }
}

impl NameResolver for ScopeResolver {
    fn resolve<'a>(&self, ctx: &LookupContext<'a>, query: &NameQuery<'_>) -> Vec<&'a Symbol> {
        let docs = self.visible(ctx);
        match &query.qualifier {
            Qualifier::None => self.unqualified(ctx, &docs, query.name, query.offset, &|_| true),
            Qualifier::Scope { global, segments } => {
                self.qualified(ctx, &docs, *global, segments, query.name, query.offset)
            }
            Qualifier::Member(object) => {
                self.member(ctx, &docs, object, query.name, query.offset)
            }
        }
    }

    fn canonical_declaration<'a>(
        &self,
        ctx: &LookupContext<'a>,
        symbol: &'a Symbol,
    ) -> &'a Symbol {
        if symbol.local {
            return symbol;
        }
        if symbol.kind == SymbolKind::Using {
            return super::follow_using(self, ctx, symbol, 0).unwrap_or(symbol);
        }

        let docs = self.visible(ctx);
        namespace_members(&docs, &symbol.scope_path, &symbol.name)
            .into_iter()
            .find(|candidate| {
                candidate.kind != SymbolKind::Using
                    && symbol.kind.is_compatible(candidate.kind)
                    && (!symbol.kind.is_callable()
                        || symbol.arity.is_none()
                        || candidate.arity.is_none()
                        || candidate.arity == symbol.arity)
            })
            .unwrap_or(symbol)
    }
}

/// Non-local members named `name` of the scope at `path`, across `docs`.
fn namespace_members<'a>(docs: &[&'a Document], path: &[String], name: &str) -> Vec<&'a Symbol> {
    docs.iter()
        .flat_map(|doc| doc.scopes().named(name))
        .filter(|s| !s.local && s.scope_path == path)
        .collect()
}

/// Class symbols whose member path is `path`.
fn classes_at<'a>(docs: &[&'a Document], path: &[String]) -> Vec<&'a Symbol> {
    let Some((name, parent)) = path.split_last() else {
        return Vec::new();
    };
    namespace_members(docs, parent, name)
        .into_iter()
        .filter(|s| s.kind.is_class())
        .collect()
}

fn namespace_exists(docs: &[&Document], path: &[String]) -> bool {
    let Some((name, parent)) = path.split_last() else {
        return true;
    };
    docs.iter().any(|doc| {
        doc.scopes()
            .members(parent, name)
            .any(|s| s.kind == SymbolKind::Namespace)
    })
}

fn dedup(found: Vec<&Symbol>) -> Vec<&Symbol> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|s| seen.insert((s.file.clone(), s.offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::{canonical, occurrence_query, Scratch};
    use super::*;
    use crate::config::ProjectConfig;
    use crate::model::{Snapshot, Workspace};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        snapshot: Snapshot,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let ws = Workspace::open(dir.path(), ProjectConfig::default()).unwrap();
        Fixture {
            snapshot: ws.snapshot(),
            dir,
        }
    }

    /// Canonical declaration of every reference (non-declarator) to `name`
    /// in `file`, as (line, column) of the occurrence and of the declaration.
    fn resolve_all(fx: &Fixture, file: &str, name: &str) -> Vec<((u32, u32), Option<(String, u32, u32)>)> {
        let doc = fx.snapshot.get(&fx.dir.path().join(file)).unwrap();
        let resolver = ScopeResolver::new();
        let scratch = Scratch::new();
        let mut out = Vec::new();
        for node in doc.ast().root.descendants() {
            let Some((token, query)) = occurrence_query(doc, node, None) else {
                continue;
            };
            if query.name != name {
                continue;
            }
            let tok = &doc.tokens()[token];
            if doc.scopes().symbol_declared_at(tok.offset).is_some() {
                continue;
            }
            let ctx = LookupContext::new(doc, &fx.snapshot, &scratch, tok.offset);
            let candidates = resolver.resolve(&ctx, &query);
            let found = canonical(&resolver, &ctx, candidates, query.call_arity).map(|s| {
                let file = s.file.file_name().unwrap().to_string_lossy().into_owned();
                (file, s.line, s.column)
            });
            out.push(((tok.line, tok.column), found));
        }
        out
    }

    fn decl(file: &str, line: u32, column: u32) -> Option<(String, u32, u32)> {
        Some((file.to_string(), line, column))
    }

    #[test]
    fn test_local_shadows_global_and_declared_before() {
        let fx = fixture(&[(
            "a.cpp",
            "int v;\nint f() {\n  int a = v;\n  int v = 2;\n  return v;\n}\n",
        )]);
        assert_eq!(
            resolve_all(&fx, "a.cpp", "v"),
            vec![((3, 11), decl("a.cpp", 1, 5)), ((5, 10), decl("a.cpp", 4, 7))]
        );
    }

    #[test]
    fn test_namespace_members_come_from_included_header_first() {
        let fx = fixture(&[
            ("a.h", "namespace Ns { void foo(); }\n"),
            (
                "b.cpp",
                "#include \"a.h\"\nnamespace Ns { void foo() {} }\nvoid g() { Ns::foo(); }\n",
            ),
        ]);
        assert_eq!(
            resolve_all(&fx, "b.cpp", "foo"),
            vec![((3, 16), decl("a.h", 1, 21))]
        );
    }

    #[test]
    fn test_overloads_filtered_by_arity() {
        let fx = fixture(&[(
            "a.cpp",
            "void f(int);\nvoid f(int, int);\nvoid g() {\n  f(1);\n  f(1, 2);\n}\n",
        )]);
        assert_eq!(
            resolve_all(&fx, "a.cpp", "f"),
            vec![((4, 3), decl("a.cpp", 1, 6)), ((5, 3), decl("a.cpp", 2, 6))]
        );
    }

    #[test]
    fn test_member_access_through_variable_type() {
        let fx = fixture(&[
            ("w.h", "struct Base { void draw(); };\nstruct Widget : Base { int size; };\nstruct Other { void draw(); };\n"),
            (
                "use.cpp",
                "#include \"w.h\"\nvoid g(Widget& w, Other o) {\n  w.draw();\n  o.draw();\n}\n",
            ),
        ]);
        assert_eq!(
            resolve_all(&fx, "use.cpp", "draw"),
            vec![((3, 5), decl("w.h", 1, 20)), ((4, 5), decl("w.h", 3, 21))]
        );
    }

    #[test]
    fn test_out_of_line_method_sees_class_members() {
        let fx = fixture(&[(
            "a.cpp",
            "struct W {\n  int count;\n  void bump();\n};\nvoid W::bump() { count++; this->count++; }\n",
        )]);
        assert_eq!(
            resolve_all(&fx, "a.cpp", "count"),
            vec![((5, 18), decl("a.cpp", 2, 7)), ((5, 33), decl("a.cpp", 2, 7))]
        );
    }

    #[test]
    fn test_using_declaration_and_directive() {
        let fx = fixture(&[(
            "a.cpp",
            "namespace A { int x; int y; }\nusing A::x;\nint f() { return x; }\nusing namespace A;\nint g() { return y; }\n",
        )]);
        assert_eq!(
            resolve_all(&fx, "a.cpp", "x"),
            vec![((3, 18), decl("a.cpp", 1, 19))]
        );
        assert_eq!(
            resolve_all(&fx, "a.cpp", "y"),
            vec![((5, 18), decl("a.cpp", 1, 26))]
        );
    }

    #[test]
    fn test_canonical_declaration_of_definition() {
        let fx = fixture(&[
            ("a.h", "int compute(int x);\n"),
            ("a.cpp", "#include \"a.h\"\nint compute(int x) { return x; }\n"),
        ]);
        let doc = fx.snapshot.get(&fx.dir.path().join("a.cpp")).unwrap();
        let definition = doc.scopes().named("compute").next().unwrap();
        let scratch = Scratch::new();
        let ctx = LookupContext::new(doc, &fx.snapshot, &scratch, definition.offset);
        let canonical = ScopeResolver::new().canonical_declaration(&ctx, definition);
        assert_eq!(canonical.file, fx.dir.path().join("a.h"));
        assert_eq!((canonical.line, canonical.column), (1, 5));

        let param = doc.scopes().named("x").next().unwrap();
        assert!(std::ptr::eq(
            ScopeResolver::new().canonical_declaration(&ctx, param),
            param
        ));
    }
}
