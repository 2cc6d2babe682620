//! Semantic binding.
//!
//! Walks the tree-sitter tree of one translation unit and builds its scope
//! table: every scope with its byte range, every declared symbol with its
//! position and the qualified path of the scope it belongs to.
//!
//! Constructors and destructors do not declare symbols; their names are
//! references to the class.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Tree};

/// Index of a scope in its [`ScopeTable`].
pub type ScopeId = usize;

/// Kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// `namespace N`
    Namespace,
    /// `class C`
    Class,
    /// `struct S`
    Struct,
    /// `union U`
    Union,
    /// `enum E` / `enum class E`
    Enum,
    /// Enumerator of an enum.
    Enumerator,
    /// Free function.
    Function,
    /// Member function.
    Method,
    /// Namespace-scope or local variable.
    Variable,
    /// Data member.
    Field,
    /// Function or lambda parameter.
    Parameter,
    /// `typedef` or alias declaration.
    Typedef,
    /// Template type or value parameter.
    TemplateParameter,
    /// `using Ns::name;`
    Using,
}

impl SymbolKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Enum => "enum",
            SymbolKind::Enumerator => "enumerator",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Typedef => "typedef",
            SymbolKind::TemplateParameter => "template_parameter",
            SymbolKind::Using => "using",
        }
    }

    /// Classes, structs and unions.
    pub fn is_class(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Struct | SymbolKind::Union)
    }

    /// Kinds that name a type.
    pub fn is_type(&self) -> bool {
        self.is_class()
            || matches!(
                self,
                SymbolKind::Enum | SymbolKind::Typedef | SymbolKind::TemplateParameter
            )
    }

    /// Functions and methods.
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Whether a declaration of kind `other` can redeclare one of this kind.
    pub fn is_compatible(&self, other: SymbolKind) -> bool {
        if *self == SymbolKind::Using || other == SymbolKind::Using {
            return true;
        }
        (self.is_class() && other.is_class())
            || (self.is_callable() && other.is_callable())
            || *self == other
    }
}

/// Accepted argument counts of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arity {
    /// Parameters without default arguments.
    pub min: usize,
    /// Total parameters, `None` when variadic.
    pub max: Option<usize>,
}

impl Arity {
    /// Whether a call with `args` arguments can bind to this function.
    pub fn accepts(&self, args: usize) -> bool {
        args >= self.min && self.max.map_or(true, |max| args <= max)
    }
}

/// A `::`-separated path as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedPath {
    /// Leading `::`.
    pub global: bool,
    /// Segments, the named entity last.
    pub segments: Vec<String>,
}

impl QualifiedPath {
    /// Parse a spelling such as `::Ns::Box<int>`; template arguments and
    /// whitespace are dropped.
    pub fn parse(text: &str) -> Self {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let global = compact.starts_with("::");
        let segments = strip_template_args(compact.trim_start_matches("::"))
            .split("::")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { global, segments }
    }
}

/// A named declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Unqualified name.
    pub name: String,
    /// What was declared.
    pub kind: SymbolKind,
    /// Declaring file.
    pub file: PathBuf,
    /// Line of the name token (1-based).
    pub line: u32,
    /// Column of the name token (1-based, bytes).
    pub column: u32,
    /// Byte offset of the name token.
    pub offset: usize,
    /// Qualified path of the namespace or class the symbol belongs to.
    pub scope_path: Vec<String>,
    /// Declared in a function, block or template parameter scope.
    pub local: bool,
    /// Declared type for variables and fields, return type for functions,
    /// aliased type for typedefs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Accepted argument counts for functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arity: Option<Arity>,
    /// Base class names as written.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bases: Vec<String>,
    /// Target of a using-declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<QualifiedPath>,
    /// Class or namespace an out-of-line definition belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_of: Option<Vec<String>>,
    /// Carries a body (function definition, class definition).
    pub is_definition: bool,
}

impl Symbol {
    /// Position-based identity: same file, line and column.
    pub fn same_declaration(&self, other: &Symbol) -> bool {
        self.line == other.line && self.column == other.column && self.file == other.file
    }

    /// `Ns::Class::name`
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = self.scope_path.iter().map(String::as_str).collect();
        parts.push(&self.name);
        parts.join("::")
    }

    /// `file:line:column`
    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.file.display(), self.line, self.column)
    }

    /// Path of the scope this symbol opens (classes, namespaces, enums).
    pub fn member_path(&self) -> Vec<String> {
        let mut path = self.scope_path.clone();
        path.push(self.name.clone());
        path
    }
}

/// Kind of a lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// File scope.
    Global,
    /// `namespace N { ... }`
    Namespace,
    /// Class body.
    Class,
    /// Function parameters and body.
    Function,
    /// Template parameter list and the templated declaration.
    Template,
    /// Compound statement, loop, lambda, or prototype parameter list.
    Block,
}

/// `using namespace N;`
#[derive(Debug, Clone, PartialEq)]
pub struct UsingDirective {
    /// Namespace as written.
    pub path: QualifiedPath,
    /// Offset of the directive.
    pub offset: usize,
}

/// One lexical scope.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Kind.
    pub kind: ScopeKind,
    /// Qualified path of the innermost enclosing namespace or class.
    pub path: Vec<String>,
    /// Enclosing scope.
    pub parent: Option<ScopeId>,
    /// Byte range covered.
    pub range: Range<usize>,
    /// Symbols declared directly in this scope, in source order.
    pub symbols: Vec<usize>,
    /// Using-directives in this scope.
    pub using_directives: Vec<UsingDirective>,
    /// For out-of-line member function bodies: the class they belong to.
    pub member_of: Option<Vec<String>>,
    /// Nested scopes in source order.
    pub children: Vec<ScopeId>,
}

/// Scopes and symbols of one translation unit.
#[derive(Debug, Clone)]
pub struct ScopeTable {
    file: PathBuf,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    by_name: HashMap<String, Vec<usize>>,
    by_offset: HashMap<usize, usize>,
    line_starts: Vec<usize>,
}

impl ScopeTable {
    /// The file scope.
    pub const GLOBAL: ScopeId = 0;

    /// File the table was bound from.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Scope by id.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    /// All scopes; index 0 is the file scope.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// All symbols in declaration order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Symbol by index.
    pub fn symbol(&self, index: usize) -> &Symbol {
        &self.symbols[index]
    }

    /// Innermost scope containing `offset`.
    pub fn scope_at(&self, offset: usize) -> ScopeId {
        let mut current = Self::GLOBAL;
        'descend: loop {
            for &child in &self.scopes[current].children {
                let range = &self.scopes[child].range;
                if range.start <= offset && offset < range.end {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// Innermost scope containing the 1-based `line`/`column` position.
    pub fn find_scope_at(&self, line: u32, column: u32) -> ScopeId {
        match self.offset_of(line, column) {
            Some(offset) => self.scope_at(offset),
            None => Self::GLOBAL,
        }
    }

    /// Byte offset of a 1-based position.
    pub fn offset_of(&self, line: u32, column: u32) -> Option<usize> {
        let start = *self.line_starts.get((line as usize).checked_sub(1)?)?;
        Some(start + (column as usize).checked_sub(1)?)
    }

    /// 1-based position of a byte offset.
    pub fn position_of(&self, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&s| s <= offset).max(1);
        let column = offset - self.line_starts[line - 1] + 1;
        (line as u32, column as u32)
    }

    /// The symbol whose name token starts at `offset`.
    pub fn symbol_declared_at(&self, offset: usize) -> Option<&Symbol> {
        self.by_offset.get(&offset).map(|&i| &self.symbols[i])
    }

    /// Every symbol spelled `name`.
    pub fn named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.symbols[i])
    }

    /// Non-local symbols spelled `name` belonging to the namespace or class
    /// at `path`, including out-of-line definitions.
    pub fn members<'a>(
        &'a self,
        path: &'a [String],
        name: &str,
    ) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.named(name)
            .filter(move |s| !s.local && s.scope_path == path)
    }

    /// Symbols spelled `name` declared directly in `scope`.
    pub fn declared_in<'a>(
        &'a self,
        scope: ScopeId,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.scopes[scope]
            .symbols
            .iter()
            .map(move |&i| &self.symbols[i])
            .filter(move |s| s.name == name)
    }

    /// `scope` followed by its ancestors up to the file scope.
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |&s| self.scopes[s].parent)
    }

    /// The last symbol declared before `offset` that is visible from `scope`.
    pub fn last_visible_symbol(&self, scope: ScopeId, offset: usize) -> Option<&Symbol> {
        self.chain(scope).find_map(|s| {
            self.scopes[s]
                .symbols
                .iter()
                .map(|&i| &self.symbols[i])
                .filter(|sym| sym.offset < offset)
                .max_by_key(|sym| sym.offset)
        })
    }
}

/// Bind the tree of `text` (the preprocessed contents of `file`).
pub fn bind(file: &Path, tree: &Tree, text: &str) -> ScopeTable {
    let mut line_starts = vec![0];
    line_starts.extend(
        text.bytes()
            .enumerate()
            .filter(|&(_, b)| b == b'\n')
            .map(|(i, _)| i + 1),
    );

    let mut binder = Binder {
        text,
        table: ScopeTable {
            file: file.to_path_buf(),
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                path: Vec::new(),
                parent: None,
                range: 0..text.len() + 1,
                symbols: Vec::new(),
                using_directives: Vec::new(),
                member_of: None,
                children: Vec::new(),
            }],
            symbols: Vec::new(),
            by_name: HashMap::new(),
            by_offset: HashMap::new(),
            line_starts,
        },
    };
    binder.visit_children(tree.root_node(), ScopeTable::GLOBAL);
    binder.table
}

/// Extra attributes of a symbol being declared.
#[derive(Default)]
struct Declared {
    type_name: Option<String>,
    arity: Option<Arity>,
    bases: Vec<String>,
    target: Option<QualifiedPath>,
    member_of: Option<Vec<String>>,
    scope_path: Option<Vec<String>>,
    hidden: bool,
    is_definition: bool,
}

struct Binder<'t> {
    text: &'t str,
    table: ScopeTable,
}

impl<'t> Binder<'t> {
    fn text_of(&self, node: Node) -> &'t str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }

    /// Nearest enclosing scope that is not a template parameter scope.
    fn effective(&self, scope: ScopeId) -> ScopeId {
        self.table
            .chain(scope)
            .find(|&s| self.table.scopes[s].kind != ScopeKind::Template)
            .unwrap_or(ScopeTable::GLOBAL)
    }

    fn add_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeId,
        range: Range<usize>,
        path: Vec<String>,
        member_of: Option<Vec<String>>,
    ) -> ScopeId {
        let id = self.table.scopes.len();
        self.table.scopes.push(Scope {
            kind,
            path,
            parent: Some(parent),
            range,
            symbols: Vec::new(),
            using_directives: Vec::new(),
            member_of,
            children: Vec::new(),
        });
        self.table.scopes[parent].children.push(id);
        id
    }

    /// Declare `name` at `name_node` with `scope` as the lexical scope.
    /// Template scopes forward declarations to their enclosing scope unless
    /// `exact` is set.
    fn declare(
        &mut self,
        scope: ScopeId,
        name_node: Node,
        kind: SymbolKind,
        exact: bool,
        extra: Declared,
    ) -> usize {
        let target_scope = if exact { scope } else { self.effective(scope) };
        let scope_kind = self.table.scopes[target_scope].kind;
        let local = matches!(
            scope_kind,
            ScopeKind::Function | ScopeKind::Block | ScopeKind::Template
        );
        let offset = name_node.start_byte();
        let (line, column) = self.table.position_of(offset);
        let name = self.text_of(name_node).to_string();

        let index = self.table.symbols.len();
        self.table.symbols.push(Symbol {
            name: name.clone(),
            kind,
            file: self.table.file.clone(),
            line,
            column,
            offset,
            scope_path: extra
                .scope_path
                .unwrap_or_else(|| self.table.scopes[target_scope].path.clone()),
            local,
            type_name: extra.type_name,
            arity: extra.arity,
            bases: extra.bases,
            target: extra.target,
            member_of: extra.member_of,
            is_definition: extra.is_definition,
        });
        self.table.by_name.entry(name).or_default().push(index);
        self.table.by_offset.insert(offset, index);
        if !extra.hidden {
            self.table.scopes[target_scope].symbols.push(index);
        }
        index
    }

    fn visit_children(&mut self, node: Node, scope: ScopeId) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
    }

    fn visit(&mut self, node: Node, scope: ScopeId) {
        match node.kind() {
            "namespace_definition" => self.namespace(node, scope),
            "class_specifier" | "struct_specifier" | "union_specifier" => self.class(node, scope),
            "enum_specifier" => self.enumeration(node, scope),
            "function_definition" => self.function_definition(node, scope),
            "declaration" | "field_declaration" => self.declaration(node, scope),
            "type_definition" => self.type_definition(node, scope),
            "alias_declaration" => self.alias(node, scope),
            "using_declaration" => self.using(node, scope),
            "template_declaration" => self.template(node, scope),
            "lambda_expression" => self.lambda(node, scope),
            "compound_statement" | "for_statement" | "for_range_loop" | "while_statement"
            | "do_statement" | "if_statement" | "switch_statement" | "catch_clause" => {
                self.block(node, scope)
            }
            "friend_declaration" => {}
            _ => self.visit_children(node, scope),
        }
    }

    fn namespace(&mut self, node: Node, scope: ScopeId) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut path = self.table.scopes[self.effective(scope)].path.clone();

        match node.child_by_field_name("name") {
            None => {
                // anonymous namespaces are transparent
                self.visit_children(body, scope);
                return;
            }
            Some(name) if name.kind() == "nested_namespace_specifier" => {
                let mut cursor = name.walk();
                let segments: Vec<Node> = name.named_children(&mut cursor).collect();
                for segment in segments {
                    self.declare(
                        scope,
                        segment,
                        SymbolKind::Namespace,
                        false,
                        Declared {
                            scope_path: Some(path.clone()),
                            hidden: !path.is_empty(),
                            is_definition: true,
                            ..Declared::default()
                        },
                    );
                    path.push(self.text_of(segment).to_string());
                }
            }
            Some(name) => {
                self.declare(
                    scope,
                    name,
                    SymbolKind::Namespace,
                    false,
                    Declared {
                        is_definition: true,
                        ..Declared::default()
                    },
                );
                path.push(self.text_of(name).to_string());
            }
        }

        let ns = self.add_scope(
            ScopeKind::Namespace,
            scope,
            body.start_byte()..body.end_byte(),
            path,
            None,
        );
        self.visit_children(body, ns);
    }

    /// Whether a body-less class or enum specifier declares the name
    /// (`class Foo;`) rather than referring to it (`class Foo* p;`).
    fn is_forward_declaration(node: Node) -> bool {
        match node.parent() {
            Some(parent) => match parent.kind() {
                "declaration" | "field_declaration" => {
                    parent.child_by_field_name("declarator").is_none()
                }
                "template_declaration" | "translation_unit" | "declaration_list"
                | "field_declaration_list" => true,
                _ => false,
            },
            None => false,
        }
    }

    fn class(&mut self, node: Node, scope: ScopeId) {
        let kind = match node.kind() {
            "class_specifier" => SymbolKind::Class,
            "struct_specifier" => SymbolKind::Struct,
            _ => SymbolKind::Union,
        };
        let body = node.child_by_field_name("body");
        let eff = self.effective(scope);
        let mut path = self.table.scopes[eff].path.clone();

        match node.child_by_field_name("name") {
            Some(name) => {
                let (qualifier, tail) = self.split_qualified(name);
                let tail = match tail.kind() {
                    "template_type" => match tail.child_by_field_name("name") {
                        Some(n) => n,
                        None => return,
                    },
                    _ => tail,
                };
                path.extend(qualifier.iter().cloned());

                if body.is_some() || Self::is_forward_declaration(node) {
                    let bases = self.base_classes(node);
                    self.declare(
                        scope,
                        tail,
                        kind,
                        false,
                        Declared {
                            bases,
                            scope_path: Some(path.clone()),
                            hidden: !qualifier.is_empty(),
                            is_definition: body.is_some(),
                            ..Declared::default()
                        },
                    );
                }
                path.push(self.text_of(tail).to_string());
            }
            None => path.push("<anonymous>".to_string()),
        }

        if let Some(body) = body {
            let class = self.add_scope(
                ScopeKind::Class,
                scope,
                body.start_byte()..body.end_byte(),
                path,
                None,
            );
            self.visit_children(body, class);
        }
    }

    fn base_classes(&self, node: Node) -> Vec<String> {
        let mut bases = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "base_class_clause" {
                continue;
            }
            let mut inner = child.walk();
            for base in child.named_children(&mut inner) {
                if matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
                    bases.push(self.text_of(base).chars().filter(|c| !c.is_whitespace()).collect());
                }
            }
        }
        bases
    }

    fn enumeration(&mut self, node: Node, scope: ScopeId) {
        let body = node.child_by_field_name("body");
        let scoped = {
            let mut cursor = node.walk();
            let found = node
                .children(&mut cursor)
                .any(|c| !c.is_named() && matches!(c.kind(), "class" | "struct"));
            found
        };
        let eff = self.effective(scope);
        let mut enum_path = self.table.scopes[eff].path.clone();

        if let Some(name) = node.child_by_field_name("name") {
            if body.is_some() || Self::is_forward_declaration(node) {
                self.declare(
                    scope,
                    name,
                    SymbolKind::Enum,
                    false,
                    Declared {
                        type_name: node
                            .child_by_field_name("base")
                            .map(|b| self.type_text(b)),
                        is_definition: body.is_some(),
                        ..Declared::default()
                    },
                );
            }
            enum_path.push(self.text_of(name).to_string());
        }

        let Some(body) = body else {
            return;
        };
        let mut cursor = body.walk();
        let enumerators: Vec<Node> = body.named_children(&mut cursor).collect();
        for enumerator in enumerators {
            if enumerator.kind() != "enumerator" {
                continue;
            }
            if let Some(name) = enumerator.child_by_field_name("name") {
                let scope_path = scoped.then(|| enum_path.clone());
                self.declare(
                    scope,
                    name,
                    SymbolKind::Enumerator,
                    false,
                    Declared {
                        hidden: scoped,
                        scope_path,
                        ..Declared::default()
                    },
                );
            }
        }
    }

    /// Split a possibly qualified name into qualifier segments and the tail node.
    fn split_qualified<'n>(&self, node: Node<'n>) -> (Vec<String>, Node<'n>) {
        let mut qualifier = Vec::new();
        let mut current = node;
        while current.kind() == "qualified_identifier" {
            if let Some(scope) = current.child_by_field_name("scope") {
                let segment = match scope.kind() {
                    "template_type" => scope
                        .child_by_field_name("name")
                        .map(|n| self.text_of(n))
                        .unwrap_or(""),
                    _ => self.text_of(scope),
                };
                qualifier.push(segment.to_string());
            }
            match current.child_by_field_name("name") {
                Some(name) => current = name,
                None => break,
            }
        }
        (qualifier, current)
    }

    fn type_text(&self, node: Node) -> String {
        let node = match node.kind() {
            "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => {
                node.child_by_field_name("name").unwrap_or(node)
            }
            _ => node,
        };
        self.text_of(node)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    fn declared_type(&self, node: Node) -> Option<String> {
        let type_node = node.child_by_field_name("type")?;
        match type_node.kind() {
            "placeholder_type_specifier" | "auto" | "primitive_type" | "sized_type_specifier" => {
                None
            }
            _ => Some(self.type_text(type_node)),
        }
    }

    /// Declare the function named by `name_node`. Returns the class or
    /// namespace an out-of-line definition belongs to.
    fn declare_function(
        &mut self,
        scope: ScopeId,
        name_node: Node,
        arity: Option<Arity>,
        type_name: Option<String>,
        is_definition: bool,
    ) -> Option<Vec<String>> {
        let eff = self.effective(scope);
        let in_class = self.table.scopes[eff].kind == ScopeKind::Class;
        let (qualifier, tail) = self.split_qualified(name_node);
        let tail = match tail.kind() {
            "template_function" => tail.child_by_field_name("name")?,
            _ => tail,
        };

        let mut path = self.table.scopes[eff].path.clone();
        path.extend(qualifier.iter().cloned());
        let member_of = (!qualifier.is_empty()).then(|| path.clone());

        if !matches!(tail.kind(), "identifier" | "field_identifier") {
            return member_of;
        }
        let name = self.text_of(tail);
        let owner = if qualifier.is_empty() {
            in_class.then(|| self.table.scopes[eff].path.last().cloned()).flatten()
        } else {
            qualifier.last().cloned()
        };
        if owner.as_deref() == Some(name) && (in_class || member_of.is_some()) {
            // constructor
            return member_of;
        }

        let is_namespace = member_of.as_ref().is_some_and(|p| {
            self.table
                .symbols
                .iter()
                .any(|s| s.kind == SymbolKind::Namespace && s.member_path() == *p)
        });
        let kind = if in_class || (member_of.is_some() && !is_namespace) {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };

        self.declare(
            scope,
            tail,
            kind,
            false,
            Declared {
                type_name,
                arity,
                member_of: member_of.clone(),
                scope_path: Some(path),
                hidden: !qualifier.is_empty(),
                is_definition,
                ..Declared::default()
            },
        );
        member_of
    }

    fn function_definition(&mut self, node: Node, scope: ScopeId) {
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let function = find_function_declarator(declarator);
        let parameters = function.and_then(|f| f.child_by_field_name("parameters"));
        let type_name = self.declared_type(node);

        let member_of = function
            .and_then(|f| f.child_by_field_name("declarator"))
            .and_then(declarator_name)
            .and_then(|name| {
                let arity = parameters.map(|p| self.arity_of(p));
                self.declare_function(scope, name, arity, type_name, true)
            });

        let start = parameters
            .map(|p| p.start_byte())
            .or_else(|| node.child_by_field_name("body").map(|b| b.start_byte()))
            .unwrap_or(node.end_byte());
        let path = self.table.scopes[self.effective(scope)].path.clone();
        let function_scope = self.add_scope(
            ScopeKind::Function,
            scope,
            start..node.end_byte(),
            path,
            member_of,
        );

        if let Some(parameters) = parameters {
            self.parameters(parameters, function_scope);
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "compound_statement" => self.visit_children(child, function_scope),
                "field_initializer_list" | "try_statement" => self.visit(child, function_scope),
                _ => {}
            }
        }
    }

    fn declaration(&mut self, node: Node, scope: ScopeId) {
        if let Some(type_node) = node.child_by_field_name("type") {
            self.visit(type_node, scope);
        }
        let type_name = self.declared_type(node);
        let in_class = self.table.scopes[self.effective(scope)].kind == ScopeKind::Class;

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for declarator in declarators {
            self.declarator(declarator, scope, type_name.clone(), in_class);
        }
        if let Some(default) = node.child_by_field_name("default_value") {
            self.visit(default, scope);
        }
    }

    fn declarator(
        &mut self,
        declarator: Node,
        scope: ScopeId,
        type_name: Option<String>,
        in_class: bool,
    ) {
        if let Some(function) = find_function_declarator(declarator) {
            let parameters = function.child_by_field_name("parameters");
            if let Some(name) = function
                .child_by_field_name("declarator")
                .and_then(declarator_name)
            {
                let arity = parameters.map(|p| self.arity_of(p));
                self.declare_function(scope, name, arity, type_name, false);
            }
            if let Some(parameters) = parameters {
                let path = self.table.scopes[self.effective(scope)].path.clone();
                let prototype = self.add_scope(
                    ScopeKind::Block,
                    scope,
                    parameters.start_byte()..parameters.end_byte(),
                    path,
                    None,
                );
                self.parameters(parameters, prototype);
            }
        } else if let Some(name) = declarator_name(declarator) {
            if matches!(name.kind(), "identifier" | "field_identifier") {
                let kind = if in_class {
                    SymbolKind::Field
                } else {
                    SymbolKind::Variable
                };
                self.declare(
                    scope,
                    name,
                    kind,
                    false,
                    Declared {
                        type_name,
                        ..Declared::default()
                    },
                );
            }
        }

        if declarator.kind() == "init_declarator" {
            if let Some(value) = declarator.child_by_field_name("value") {
                self.visit(value, scope);
            }
        }
    }

    fn arity_of(&self, parameters: Node) -> Arity {
        let mut min = 0;
        let mut total = 0;
        let mut variadic = false;
        let mut cursor = parameters.walk();
        for child in parameters.children(&mut cursor) {
            match child.kind() {
                "parameter_declaration" => {
                    let is_void = child.child_by_field_name("declarator").is_none()
                        && child
                            .child_by_field_name("type")
                            .is_some_and(|t| self.text_of(t) == "void");
                    if !is_void {
                        min += 1;
                        total += 1;
                    }
                }
                "optional_parameter_declaration" => total += 1,
                "variadic_parameter_declaration" | "variadic_parameter" | "..." => {
                    variadic = true
                }
                _ => {}
            }
        }
        Arity {
            min,
            max: (!variadic).then_some(total),
        }
    }

    fn parameters(&mut self, parameters: Node, scope: ScopeId) {
        let mut cursor = parameters.walk();
        let children: Vec<Node> = parameters.named_children(&mut cursor).collect();
        for parameter in children {
            if !matches!(
                parameter.kind(),
                "parameter_declaration"
                    | "optional_parameter_declaration"
                    | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let type_name = self.declared_type(parameter);
            if let Some(name) = parameter
                .child_by_field_name("declarator")
                .and_then(declarator_name)
                .filter(|n| n.kind() == "identifier")
            {
                self.declare(
                    scope,
                    name,
                    SymbolKind::Parameter,
                    true,
                    Declared {
                        type_name,
                        ..Declared::default()
                    },
                );
            }
            if let Some(default) = parameter.child_by_field_name("default_value") {
                self.visit(default, scope);
            }
        }
    }

    fn type_definition(&mut self, node: Node, scope: ScopeId) {
        if let Some(type_node) = node.child_by_field_name("type") {
            self.visit(type_node, scope);
        }
        let type_name = node
            .child_by_field_name("type")
            .map(|t| self.type_text(t));
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for declarator in declarators {
            if let Some(name) = declarator_name(declarator) {
                self.declare(
                    scope,
                    name,
                    SymbolKind::Typedef,
                    false,
                    Declared {
                        type_name: type_name.clone(),
                        ..Declared::default()
                    },
                );
            }
        }
    }

    fn alias(&mut self, node: Node, scope: ScopeId) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let type_name = node
            .child_by_field_name("type")
            .map(|t| self.type_text(t));
        self.declare(
            scope,
            name,
            SymbolKind::Typedef,
            false,
            Declared {
                type_name,
                ..Declared::default()
            },
        );
    }

    fn using(&mut self, node: Node, scope: ScopeId) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        let is_directive = children
            .iter()
            .any(|c| !c.is_named() && c.kind() == "namespace");
        let Some(name) = children.iter().copied().find(|c| {
            matches!(
                c.kind(),
                "identifier" | "qualified_identifier" | "namespace_identifier"
            )
        }) else {
            return;
        };
        let path = QualifiedPath::parse(self.text_of(name));
        let target_scope = self.effective(scope);

        if is_directive {
            self.table.scopes[target_scope]
                .using_directives
                .push(UsingDirective {
                    path,
                    offset: node.start_byte(),
                });
            return;
        }
        if path.segments.len() < 2 && !path.global {
            return;
        }
        let (_, tail) = self.split_qualified(name);
        if tail.kind() != "identifier" && tail.kind() != "type_identifier" {
            return;
        }
        self.declare(
            scope,
            tail,
            SymbolKind::Using,
            false,
            Declared {
                target: Some(path),
                ..Declared::default()
            },
        );
    }

    fn template(&mut self, node: Node, scope: ScopeId) {
        let path = self.table.scopes[self.effective(scope)].path.clone();
        let template = self.add_scope(
            ScopeKind::Template,
            scope,
            node.start_byte()..node.end_byte(),
            path,
            None,
        );

        let parameters = node.child_by_field_name("parameters");
        if let Some(parameters) = parameters {
            let mut cursor = parameters.walk();
            let children: Vec<Node> = parameters.named_children(&mut cursor).collect();
            for parameter in children {
                let name = match parameter.kind() {
                    "type_parameter_declaration" | "variadic_type_parameter_declaration" => {
                        let mut inner = parameter.walk();
                        let found = parameter
                            .named_children(&mut inner)
                            .filter(|c| c.kind() == "type_identifier")
                            .last();
                        found
                    }
                    "optional_type_parameter_declaration" => parameter.child_by_field_name("name"),
                    "parameter_declaration"
                    | "optional_parameter_declaration"
                    | "variadic_parameter_declaration" => parameter
                        .child_by_field_name("declarator")
                        .and_then(declarator_name),
                    _ => None,
                };
                if let Some(name) = name {
                    self.declare(
                        template,
                        name,
                        SymbolKind::TemplateParameter,
                        true,
                        Declared::default(),
                    );
                }
            }
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            if Some(child.id()) != parameters.map(|p| p.id()) {
                self.visit(child, template);
            }
        }
    }

    fn lambda(&mut self, node: Node, scope: ScopeId) {
        let path = self.table.scopes[self.effective(scope)].path.clone();
        let block = self.add_scope(
            ScopeKind::Block,
            scope,
            node.start_byte()..node.end_byte(),
            path,
            None,
        );
        if let Some(parameters) = node
            .child_by_field_name("declarator")
            .and_then(|d| d.child_by_field_name("parameters"))
        {
            self.parameters(parameters, block);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, block);
        }
    }

    fn block(&mut self, node: Node, scope: ScopeId) {
        let path = self.table.scopes[self.effective(scope)].path.clone();
        let block = self.add_scope(
            ScopeKind::Block,
            scope,
            node.start_byte()..node.end_byte(),
            path,
            None,
        );

        match node.kind() {
            "for_range_loop" => {
                let type_name = self.declared_type(node);
                if let Some(name) = node
                    .child_by_field_name("declarator")
                    .and_then(declarator_name)
                    .filter(|n| n.kind() == "identifier")
                {
                    self.declare(
                        block,
                        name,
                        SymbolKind::Variable,
                        true,
                        Declared {
                            type_name,
                            ..Declared::default()
                        },
                    );
                }
                for field in ["right", "body"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.visit(child, block);
                    }
                }
            }
            "catch_clause" => {
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    self.parameters(parameters, block);
                }
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit_children(body, block);
                }
            }
            "compound_statement" => self.visit_children(node, block),
            _ => self.visit_children(node, block),
        }
    }
}

/// Innermost name node of a declarator.
fn declarator_name(node: Node) -> Option<Node> {
    let mut node = node;
    loop {
        match node.kind() {
            "identifier" | "field_identifier" | "type_identifier" | "qualified_identifier"
            | "template_function" | "destructor_name" | "operator_name" => return Some(node),
            "init_declarator"
            | "pointer_declarator"
            | "reference_declarator"
            | "array_declarator"
            | "function_declarator"
            | "parenthesized_declarator"
            | "attributed_declarator" => {
                node = match node.child_by_field_name("declarator") {
                    Some(inner) => inner,
                    None => node.named_child(node.named_child_count().checked_sub(1)?)?,
                };
            }
            _ => return None,
        }
    }
}

/// The function declarator inside `node`, if it declares a function.
fn find_function_declarator(node: Node) -> Option<Node> {
    let mut node = node;
    loop {
        match node.kind() {
            "function_declarator" => return Some(node),
            "init_declarator" | "pointer_declarator" | "reference_declarator"
            | "parenthesized_declarator" | "attributed_declarator" => {
                node = match node.child_by_field_name("declarator") {
                    Some(inner) => inner,
                    None => node.named_child(node.named_child_count().checked_sub(1)?)?,
                };
            }
            _ => return None,
        }
    }
}

/// Drop `<...>` groups from a type spelling.
pub fn strip_template_args(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::syntax::parse_tree;

    fn bind_source(text: &str) -> ScopeTable {
        let path = Path::new("/src/test.cpp");
        let tree = parse_tree(path, text).unwrap();
        bind(path, &tree, text)
    }

    fn find<'a>(table: &'a ScopeTable, name: &str) -> &'a Symbol {
        table
            .named(name)
            .next()
            .unwrap_or_else(|| panic!("no symbol {}", name))
    }

    #[test]
    fn test_namespace_and_class_paths() {
        let table = bind_source(
            "namespace Ns {\nclass Widget : public Base {\npublic:\n  void draw(int x);\n  int size;\n};\n}\n",
        );
        let widget = find(&table, "Widget");
        assert_eq!(widget.kind, SymbolKind::Class);
        assert_eq!(widget.scope_path, vec!["Ns"]);
        assert_eq!(widget.bases, vec!["Base"]);
        assert_eq!((widget.line, widget.column), (2, 7));

        let draw = find(&table, "draw");
        assert_eq!(draw.kind, SymbolKind::Method);
        assert_eq!(draw.scope_path, vec!["Ns", "Widget"]);
        assert_eq!(draw.arity, Some(Arity { min: 1, max: Some(1) }));

        let size = find(&table, "size");
        assert_eq!(size.kind, SymbolKind::Field);
        assert_eq!(size.type_name, None);

        // prototype parameters are local to their own scope
        let x = find(&table, "x");
        assert!(x.local);
        assert_eq!(x.kind, SymbolKind::Parameter);
    }

    #[test]
    fn test_out_of_line_definition_belongs_to_class() {
        let table = bind_source("struct W { void run(); };\nvoid W::run() { int local = 0; }\n");
        let runs: Vec<&Symbol> = table.named("run").collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].member_of, Some(vec!["W".to_string()]));
        assert_eq!(runs[1].scope_path, vec!["W"]);
        assert!(runs[1].is_definition);
        assert!(table.scope(ScopeTable::GLOBAL).symbols.iter().all(|&i| table.symbol(i).name != "run"));

        let local = find(&table, "local");
        let scope = table.scope_at(local.offset);
        assert_eq!(table.scope(scope).kind, ScopeKind::Function);
        assert_eq!(table.scope(scope).member_of, Some(vec!["W".to_string()]));
    }

    #[test]
    fn test_constructors_declare_no_symbol() {
        let table =
            bind_source("class Widget {\npublic:\n  Widget();\n  ~Widget();\n};\nWidget::Widget() {}\n");
        let widgets: Vec<&Symbol> = table.named("Widget").collect();
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].kind, SymbolKind::Class);
    }

    #[test]
    fn test_local_scopes_and_shadowing() {
        let table = bind_source("int v;\nint f(int v) {\n  { int v = 2; return v; }\n}\n");
        let vs: Vec<&Symbol> = table.named("v").collect();
        assert_eq!(vs.len(), 3);
        assert!(!vs[0].local);
        assert_eq!(vs[1].kind, SymbolKind::Parameter);
        assert_eq!(vs[2].kind, SymbolKind::Variable);
        assert!(vs[2].local);

        let inner = table.scope_at(vs[2].offset);
        assert_eq!(table.scope(inner).kind, ScopeKind::Block);
        let chain: Vec<ScopeKind> = table.chain(inner).map(|s| table.scope(s).kind).collect();
        assert_eq!(
            chain,
            vec![ScopeKind::Block, ScopeKind::Function, ScopeKind::Global]
        );
    }

    #[test]
    fn test_enums_scoped_and_plain() {
        let table = bind_source("enum Color { Red };\nenum class Mode { Fast };\n");
        assert!(table.members(&[], "Red").next().is_some());
        let mode_path = vec!["Mode".to_string()];
        assert!(table.members(&mode_path, "Fast").next().is_some());
        assert!(table.members(&[], "Fast").next().is_none());
    }

    #[test]
    fn test_template_parameters_and_member_path() {
        let table = bind_source("template <typename T>\nclass Box { T value; };\n");
        let t = find(&table, "T");
        assert_eq!(t.kind, SymbolKind::TemplateParameter);
        assert!(t.local);
        let boxed = find(&table, "Box");
        assert!(!boxed.local);
        assert!(table.members(&[], "Box").next().is_some());
        let value = find(&table, "value");
        assert_eq!(value.scope_path, vec!["Box"]);
        assert_eq!(value.type_name.as_deref(), Some("T"));
    }

    #[test]
    fn test_using_declaration_and_directive() {
        let table = bind_source("namespace A { int x; }\nusing A::x;\nusing namespace A;\n");
        let using = table
            .named("x")
            .find(|s| s.kind == SymbolKind::Using)
            .unwrap();
        assert_eq!(
            using.target,
            Some(QualifiedPath {
                global: false,
                segments: vec!["A".to_string(), "x".to_string()],
            })
        );
        let global = table.scope(ScopeTable::GLOBAL);
        assert_eq!(global.using_directives.len(), 1);
        assert_eq!(global.using_directives[0].path.segments, vec!["A"]);
    }

    #[test]
    fn test_forward_declaration_vs_elaborated_reference() {
        let table = bind_source("class Fwd;\nstruct Other* ptr;\n");
        assert!(table.named("Fwd").next().is_some());
        assert!(table.named("Other").next().is_none());
        assert_eq!(find(&table, "ptr").type_name.as_deref(), Some("Other"));
    }

    #[test]
    fn test_arity_with_defaults_and_variadic() {
        let table = bind_source("void f(int a, int b = 1);\nvoid g(const char* fmt, ...);\nvoid h(void);\n");
        assert_eq!(find(&table, "f").arity, Some(Arity { min: 1, max: Some(2) }));
        assert_eq!(find(&table, "g").arity, Some(Arity { min: 1, max: None }));
        assert_eq!(find(&table, "h").arity, Some(Arity { min: 0, max: Some(0) }));
    }

    #[test]
    fn test_positions_round_trip() {
        let table = bind_source("int a;\n  int b;\n");
        let b = find(&table, "b");
        assert_eq!((b.line, b.column), (2, 7));
        assert_eq!(table.offset_of(2, 7), Some(b.offset));
        assert_eq!(table.position_of(b.offset), (2, 7));
    }

    #[test]
    fn test_strip_template_args() {
        assert_eq!(strip_template_args("std::vector<std::pair<int, int>>"), "std::vector");
    }
}
