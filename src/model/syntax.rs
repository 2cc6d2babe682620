//! Owned abstract syntax tree.
//!
//! tree-sitter produces the concrete tree; [`lower`] turns it into a small
//! tagged-variant AST that a [`Document`](super::Document) can own and share
//! between threads. Only name-like nodes get dedicated variants, everything
//! else becomes a [`NodeKind::Container`] whose children are walked
//! unchanged.

use super::intern::Ident;
use super::lexer::{Token, TokenKind};
use crate::error::{CppRefError, Result};
use std::ops::Range;
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Parse preprocessed C++ text with tree-sitter.
pub fn parse_tree(path: &Path, text: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_cpp::language())
        .map_err(|e| CppRefError::Parse {
            file: path.to_path_buf(),
            message: format!("Failed to set C++ language: {:?}", e),
        })?;

    parser
        .parse(text, None)
        .ok_or_else(|| CppRefError::Parse {
            file: path.to_path_buf(),
            message: "Parse failed - no tree returned".to_string(),
        })
}

/// Object of a member access (`obj.name`, `ptr->name`, `this->name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberObject {
    /// A plain variable.
    Name(String),
    /// `this`.
    This,
    /// Any other expression; its type is not tracked.
    Unknown,
}

/// An unqualified name occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct NameRef {
    /// Interned spelling.
    pub ident: Ident,
    /// Index of the identifier token in the document's token stream.
    pub token: usize,
    /// Argument count when the name is the callee of a call.
    pub call_arity: Option<usize>,
    /// Set when the name is accessed through an object.
    pub object: Option<MemberObject>,
}

/// One `::`-separated segment of a qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Interned spelling.
    pub ident: Ident,
    /// Token index of the segment.
    pub token: usize,
}

/// Structure of a qualified name, e.g. `::Ns::Widget::draw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Leading `::`.
    pub global: bool,
    /// All segments, the trailing unqualified name last. Never empty.
    pub segments: Vec<Segment>,
}

impl QualifiedName {
    /// The trailing unqualified name.
    pub fn tail(&self) -> Segment {
        self.segments[self.segments.len() - 1]
    }

    /// Segments before the tail.
    pub fn qualifier(&self) -> &[Segment] {
        &self.segments[..self.segments.len() - 1]
    }
}

/// A qualified name occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedRef {
    /// Lowered structure, or `None` when error recovery made it underivable.
    /// [`NameChecker`] re-derives it from the tokens on demand.
    pub name: Option<QualifiedName>,
    /// Token range `first..=last` covered by the name.
    pub first_token: usize,
    /// Last token of the name.
    pub last_token: usize,
    /// Argument count when the name is the callee of a call.
    pub call_arity: Option<usize>,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Any non-name node, tagged with its grammar kind.
    Container(&'static str),
    /// `foo`
    SimpleName(NameRef),
    /// `foo<int>`; template arguments are the node's children.
    TemplateId(NameRef),
    /// `Ns::foo`; template arguments anywhere in the name are the children.
    QualifiedName(QualifiedRef),
}

/// One AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    /// Payload.
    pub kind: NodeKind,
    /// Byte range in the document text.
    pub span: Range<usize>,
    /// Child nodes in source order.
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Whether this node is one of the name variants.
    pub fn is_name(&self) -> bool {
        !matches!(self.kind, NodeKind::Container(_))
    }

    /// Pre-order iterator over this node and its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Pre-order traversal over an [`AstNode`] tree.
pub struct Descendants<'a> {
    stack: Vec<&'a AstNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a AstNode;

    fn next(&mut self) -> Option<&'a AstNode> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// The lowered tree of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    /// The `translation_unit` node.
    pub root: AstNode,
    /// Number of name nodes in the tree.
    pub name_count: usize,
    /// Number of `ERROR` nodes tree-sitter produced.
    pub error_count: usize,
}

impl Ast {
    /// Name node whose identifier tokens include `token`.
    pub fn name_at_token(&self, token: usize) -> Option<&AstNode> {
        self.root.descendants().find(|node| match &node.kind {
            NodeKind::SimpleName(name) | NodeKind::TemplateId(name) => name.token == token,
            NodeKind::QualifiedName(q) => (q.first_token..=q.last_token).contains(&token),
            NodeKind::Container(_) => false,
        })
    }
}

/// Lower a tree-sitter tree over `text` into an [`Ast`].
///
/// `tokens` must be the token stream of the same text.
pub fn lower(tree: &Tree, text: &str, tokens: &[Token]) -> Ast {
    let mut lowering = Lowering {
        text,
        tokens,
        name_count: 0,
        error_count: 0,
    };
    let root = tree.root_node();
    let children = lowering.children(root);
    Ast {
        root: AstNode {
            kind: NodeKind::Container("translation_unit"),
            span: root.start_byte()..root.end_byte(),
            children,
        },
        name_count: lowering.name_count,
        error_count: lowering.error_count,
    }
}

/// Index of the identifier token starting at `offset`.
pub fn identifier_token_at(tokens: &[Token], offset: usize) -> Option<usize> {
    let index = tokens.binary_search_by_key(&offset, |t| t.offset).ok()?;
    (tokens[index].kind == TokenKind::Identifier).then_some(index)
}

struct Lowering<'t> {
    text: &'t str,
    tokens: &'t [Token],
    name_count: usize,
    error_count: usize,
}

impl<'t> Lowering<'t> {
    fn children(&mut self, node: Node) -> Vec<AstNode> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if let Some(lowered) = self.node(child, None) {
                out.push(lowered);
            }
        }
        out
    }

    fn node(&mut self, node: Node, call_arity: Option<usize>) -> Option<AstNode> {
        let span = node.start_byte()..node.end_byte();
        if node.is_error() {
            self.error_count += 1;
        }

        match node.kind() {
            "comment" | "string_literal" | "raw_string_literal" | "char_literal"
            | "number_literal" | "concatenated_string" | "system_lib_string"
            | "preproc_arg" | "true" | "false" | "null" | "nullptr" => None,

            "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" => {
                let name = self.name_ref(node, call_arity, None)?;
                Some(self.leaf(NodeKind::SimpleName(name), span))
            }

            "qualified_identifier"
            | "qualified_type_identifier"
            | "qualified_field_identifier"
            | "scoped_identifier"
            | "scoped_type_identifier"
            | "scoped_namespace_identifier" => Some(self.qualified(node, call_arity)),

            "template_type" | "template_function" | "template_method" => {
                Some(self.template_id(node, call_arity, None))
            }

            "call_expression" => {
                let arguments = node.child_by_field_name("arguments");
                let arity = arguments.map(|args| {
                    let mut cursor = args.walk();
                    let count = args
                        .named_children(&mut cursor)
                        .filter(|a| a.kind() != "comment")
                        .count();
                    count
                });
                let mut children = Vec::new();
                if let Some(function) = node.child_by_field_name("function") {
                    children.extend(self.node(function, arity));
                }
                if let Some(arguments) = arguments {
                    children.extend(self.children(arguments));
                }
                Some(AstNode {
                    kind: NodeKind::Container("call_expression"),
                    span,
                    children,
                })
            }

            "field_expression" => {
                let mut children = Vec::new();
                let argument = node.child_by_field_name("argument");
                let object = argument.map(|a| self.member_object(a));
                if let Some(argument) = argument {
                    children.extend(self.node(argument, None));
                }
                if let Some(field) = node.child_by_field_name("field") {
                    let lowered = match field.kind() {
                        "field_identifier" | "identifier" => self
                            .name_ref(field, call_arity, object)
                            .map(|name| {
                                self.leaf(
                                    NodeKind::SimpleName(name),
                                    field.start_byte()..field.end_byte(),
                                )
                            }),
                        "template_method" => Some(self.template_id(field, call_arity, object)),
                        _ => self.node(field, call_arity),
                    };
                    children.extend(lowered);
                }
                Some(AstNode {
                    kind: NodeKind::Container("field_expression"),
                    span,
                    children,
                })
            }

            "parenthesized_expression" => {
                // `(f)(x)` still calls `f`
                let children = {
                    let mut cursor = node.walk();
                    let inner: Vec<Node> = node.named_children(&mut cursor).collect();
                    let mut out = Vec::new();
                    for child in inner {
                        out.extend(self.node(child, call_arity));
                    }
                    out
                };
                Some(AstNode {
                    kind: NodeKind::Container("parenthesized_expression"),
                    span,
                    children,
                })
            }

            kind => Some(AstNode {
                kind: NodeKind::Container(static_kind(kind)),
                span,
                children: self.children(node),
            }),
        }
    }

    fn leaf(&mut self, kind: NodeKind, span: Range<usize>) -> AstNode {
        self.name_count += 1;
        AstNode {
            kind,
            span,
            children: Vec::new(),
        }
    }

    fn name_ref(
        &self,
        node: Node,
        call_arity: Option<usize>,
        object: Option<MemberObject>,
    ) -> Option<NameRef> {
        let token = identifier_token_at(self.tokens, node.start_byte())?;
        let ident = self.tokens[token].ident?;
        Some(NameRef {
            ident,
            token,
            call_arity,
            object,
        })
    }

    fn member_object(&self, argument: Node) -> MemberObject {
        match argument.kind() {
            "this" => MemberObject::This,
            "identifier" => argument
                .utf8_text(self.text.as_bytes())
                .map(|t| MemberObject::Name(t.to_string()))
                .unwrap_or(MemberObject::Unknown),
            "parenthesized_expression" | "pointer_expression" => {
                // `(*p).x` and `(p)->x`
                let mut cursor = argument.walk();
                let inner: Vec<Node> = argument.named_children(&mut cursor).collect();
                match inner.as_slice() {
                    [only] => self.member_object(*only),
                    _ => MemberObject::Unknown,
                }
            }
            _ => MemberObject::Unknown,
        }
    }

    fn template_id(
        &mut self,
        node: Node,
        call_arity: Option<usize>,
        object: Option<MemberObject>,
    ) -> AstNode {
        let span = node.start_byte()..node.end_byte();
        let children = node
            .child_by_field_name("arguments")
            .map(|args| self.children(args))
            .unwrap_or_default();

        let name = node
            .child_by_field_name("name")
            .and_then(|n| self.name_ref(n, call_arity, object));
        match name {
            Some(name) => {
                self.name_count += 1;
                AstNode {
                    kind: NodeKind::TemplateId(name),
                    span,
                    children,
                }
            }
            None => AstNode {
                kind: NodeKind::Container("template_id"),
                span,
                children,
            },
        }
    }

    fn qualified(&mut self, node: Node, call_arity: Option<usize>) -> AstNode {
        let span = node.start_byte()..node.end_byte();
        let parts = qualified_parts(node);
        let mut children = Vec::new();
        for args in parts.as_ref().map(|p| p.template_args.clone()).unwrap_or_default() {
            children.extend(self.children(args));
        }

        let name = parts.and_then(|parts| {
            let segments = parts
                .segments
                .iter()
                .map(|seg| {
                    let token = identifier_token_at(self.tokens, seg.start_byte())?;
                    let ident = self.tokens[token].ident?;
                    Some(Segment { ident, token })
                })
                .collect::<Option<Vec<_>>>()?;
            (!segments.is_empty()).then_some(QualifiedName {
                global: parts.global,
                segments,
            })
        });

        let first_token = token_index_from(self.tokens, span.start);
        let last_token = token_index_before(self.tokens, span.end).max(first_token);
        self.name_count += 1;
        AstNode {
            kind: NodeKind::QualifiedName(QualifiedRef {
                name,
                first_token,
                last_token,
                call_arity,
            }),
            span,
            children,
        }
    }
}

/// Index of the first token at or after `offset`.
fn token_index_from(tokens: &[Token], offset: usize) -> usize {
    tokens.partition_point(|t| t.offset < offset)
}

/// Index of the last token ending at or before `end`.
fn token_index_before(tokens: &[Token], end: usize) -> usize {
    tokens.partition_point(|t| t.end() <= end).saturating_sub(1)
}

/// Segment and template-argument nodes of a tree-sitter qualified name.
pub(crate) struct QualifiedParts<'tree> {
    pub global: bool,
    pub segments: Vec<Node<'tree>>,
    pub template_args: Vec<Node<'tree>>,
}

/// Split a qualified name into its segments, innermost last.
///
/// Returns `None` for shapes that do not reduce to plain segments (decltype
/// scopes, operator and destructor names, error nodes).
pub(crate) fn qualified_parts(node: Node) -> Option<QualifiedParts> {
    let mut parts = QualifiedParts {
        global: false,
        segments: Vec::new(),
        template_args: Vec::new(),
    };
    collect_qualified(node, &mut parts)?;
    Some(parts)
}

fn collect_qualified<'tree>(node: Node<'tree>, parts: &mut QualifiedParts<'tree>) -> Option<()> {
    if node.has_error() {
        return None;
    }
    match node.child_by_field_name("scope") {
        Some(scope) => push_segment(scope, parts)?,
        None if parts.segments.is_empty() => parts.global = true,
        None => return None,
    }
    let name = node.child_by_field_name("name")?;
    match name.kind() {
        "qualified_identifier"
        | "qualified_type_identifier"
        | "qualified_field_identifier"
        | "scoped_identifier"
        | "scoped_type_identifier"
        | "scoped_namespace_identifier" => collect_qualified(name, parts),
        _ => push_segment(name, parts),
    }
}

fn push_segment<'tree>(node: Node<'tree>, parts: &mut QualifiedParts<'tree>) -> Option<()> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" => {
            parts.segments.push(node);
            Some(())
        }
        "template_type" | "template_function" | "template_method" => {
            parts.segments.push(node.child_by_field_name("name")?);
            if let Some(args) = node.child_by_field_name("arguments") {
                parts.template_args.push(args);
            }
            Some(())
        }
        _ => None,
    }
}

/// Re-derives qualified names from the token stream.
///
/// Used when lowering could not recover a qualified name's structure.
pub struct NameChecker<'d> {
    tokens: &'d [Token],
    text: &'d str,
}

impl<'d> NameChecker<'d> {
    /// Checker over one document's tokens and text.
    pub fn new(tokens: &'d [Token], text: &'d str) -> Self {
        Self { tokens, text }
    }

    /// Derive the structure of the name spanning `first..=last`.
    ///
    /// Accepts `[::] ident (<...>)? (:: ident (<...>)?)*`; anything else
    /// (operators, destructors, unbalanced brackets) yields `None`.
    pub fn check(&self, first: usize, last: usize) -> Option<QualifiedName> {
        let tokens = self.tokens.get(first..=last)?;
        let mut global = false;
        let mut segments = Vec::new();
        let mut expect_name = true;
        let mut i = 0;

        while i < tokens.len() {
            let token = &tokens[i];
            let text = token.text(self.text);
            match (expect_name, token.kind) {
                (true, TokenKind::Identifier) => {
                    segments.push(Segment {
                        ident: token.ident?,
                        token: first + i,
                    });
                    expect_name = false;
                }
                (true, TokenKind::Punct) if text == "::" && segments.is_empty() && !global => {
                    global = true;
                }
                (true, TokenKind::Keyword) if text == "template" => {}
                (false, TokenKind::Punct) if text == "::" => expect_name = true,
                (false, TokenKind::Punct) if text == "<" => {
                    i = self.skip_template_args(tokens, i)?;
                }
                _ => return None,
            }
            i += 1;
        }

        if expect_name || segments.is_empty() {
            return None;
        }
        Some(QualifiedName { global, segments })
    }

    fn skip_template_args(&self, tokens: &[Token], open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (offset, token) in tokens[open..].iter().enumerate() {
            match token.text(self.text) {
                "<" => depth += 1,
                ">" => depth -= 1,
                ">>" => depth = depth.checked_sub(2)?,
                _ => {}
            }
            if depth == 0 {
                return Some(open + offset);
            }
        }
        None
    }
}

fn static_kind(kind: &str) -> &'static str {
    CONTAINER_KINDS
        .iter()
        .find(|k| **k == kind)
        .copied()
        .unwrap_or("node")
}

const CONTAINER_KINDS: &[&str] = &[
    "translation_unit",
    "function_definition",
    "declaration",
    "field_declaration",
    "parameter_declaration",
    "init_declarator",
    "function_declarator",
    "compound_statement",
    "class_specifier",
    "struct_specifier",
    "union_specifier",
    "enum_specifier",
    "namespace_definition",
    "template_declaration",
    "using_declaration",
    "alias_declaration",
    "type_definition",
    "argument_list",
    "template_argument_list",
    "return_statement",
    "expression_statement",
    "if_statement",
    "for_statement",
    "for_range_loop",
    "while_statement",
    "lambda_expression",
    "this",
    "ERROR",
];
