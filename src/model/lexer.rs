//! C/C++ tokenizer.
//!
//! Produces the token stream of a preprocessed translation unit and fills
//! the document's identifier table. Runs before, and independently of,
//! tree-sitter: only files that mention the searched spelling get parsed.

use crate::model::intern::{Ident, IdentTable};

/// Coarse token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier (interned).
    Identifier,
    /// Reserved word.
    Keyword,
    /// Integer or floating literal.
    Number,
    /// String literal, including raw and prefixed forms.
    String,
    /// Character literal.
    Char,
    /// Operator or punctuation.
    Punct,
}

/// One token of the preprocessed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Classification.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
    /// Line (1-based).
    pub line: u32,
    /// Column (1-based, in bytes).
    pub column: u32,
    /// Interned spelling, for identifiers.
    pub ident: Option<Ident>,
}

impl Token {
    /// Byte offset one past the last character.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Source text of the token.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.offset..self.end()]
    }
}

const KEYWORDS: &[&str] = &[
    "alignas", "alignof", "asm", "auto", "bool", "break", "case", "catch", "char", "char16_t",
    "char32_t", "char8_t", "class", "co_await", "co_return", "co_yield", "concept", "const",
    "const_cast", "consteval", "constexpr", "constinit", "continue", "decltype", "default",
    "delete", "do", "double", "dynamic_cast", "else", "enum", "explicit", "export", "extern",
    "false", "float", "for", "friend", "goto", "if", "inline", "int", "long", "mutable",
    "namespace", "new", "noexcept", "nullptr", "operator", "private", "protected", "public",
    "register", "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "wchar_t", "while",
];

/// Three- and two-character punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "->*", "<=>", "::", "->", "++", "--", "<<", ">>", "<=", ">=", "==",
    "!=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ".*", "##",
];

/// Whether `text` is a reserved word.
pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.binary_search(&text).is_ok()
}

/// Whether `text` is a well-formed identifier spelling.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_continue) && !is_keyword(text),
        _ => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || !c.is_ascii()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric() || !c.is_ascii()
}

/// Tokenize `source`, interning identifiers into `idents`.
pub fn tokenize(source: &str, idents: &mut IdentTable) -> Vec<Token> {
    Lexer::new(source).run(idents)
}

struct Lexer<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    line_start: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn run(mut self, idents: &mut IdentTable) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token(idents) {
            tokens.push(token);
        }
        tokens
    }

    fn peek(&self, ahead: usize) -> u8 {
        self.bytes.get(self.pos + ahead).copied().unwrap_or(0)
    }

    fn bump(&mut self) {
        if self.peek(0) == b'\n' {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.bytes.len() {
            match (self.peek(0), self.peek(1)) {
                (b'/', b'/') => {
                    while self.pos < self.bytes.len() && self.peek(0) != b'\n' {
                        // a backslash-newline continues a line comment
                        if self.peek(0) == b'\\' && self.peek(1) == b'\n' {
                            self.bump();
                        }
                        self.bump();
                    }
                }
                (b'/', b'*') => {
                    self.bump();
                    self.bump();
                    while self.pos < self.bytes.len() && !(self.peek(0) == b'*' && self.peek(1) == b'/')
                    {
                        self.bump();
                    }
                    if self.pos < self.bytes.len() {
                        self.bump();
                        self.bump();
                    }
                }
                (b'\\', b'\n') => {
                    self.bump();
                    self.bump();
                }
                (c, _) if c.is_ascii_whitespace() => self.bump(),
                _ => break,
            }
        }
    }

    fn next_token(&mut self, idents: &mut IdentTable) -> Option<Token> {
        self.skip_trivia();
        if self.pos >= self.bytes.len() {
            return None;
        }

        let start = self.pos;
        let line = self.line;
        let column = (start - self.line_start) as u32 + 1;
        let first = self.src[start..].chars().next()?;

        let kind = if let Some(kind) = self.lex_prefixed_literal() {
            kind
        } else if is_ident_start(first) {
            self.lex_identifier();
            TokenKind::Identifier
        } else if first.is_ascii_digit() || (first == '.' && self.peek(1).is_ascii_digit()) {
            self.lex_number();
            TokenKind::Number
        } else if first == '"' {
            self.lex_quoted(b'"');
            TokenKind::String
        } else if first == '\'' {
            self.lex_quoted(b'\'');
            TokenKind::Char
        } else {
            self.lex_punct();
            TokenKind::Punct
        };

        let len = self.pos - start;
        let (kind, ident) = if kind == TokenKind::Identifier {
            let text = &self.src[start..self.pos];
            if is_keyword(text) {
                (TokenKind::Keyword, None)
            } else {
                (TokenKind::Identifier, Some(idents.intern(text)))
            }
        } else {
            (kind, None)
        };

        Some(Token {
            kind,
            offset: start,
            len,
            line,
            column,
            ident,
        })
    }

    /// String and character literals with encoding prefixes (`u8"…"`, `L'x'`,
    /// `R"d(…)d"`). Returns None when the input is an ordinary identifier.
    fn lex_prefixed_literal(&mut self) -> Option<TokenKind> {
        let rest = &self.bytes[self.pos..];
        let prefix_len = [&b"u8R"[..], b"uR", b"UR", b"LR", b"u8", b"R", b"u", b"U", b"L"]
            .iter()
            .find(|p| rest.starts_with(p) && matches!(rest.get(p.len()), Some(b'"') | Some(b'\'')))
            .map(|p| p.len())?;
        let raw = rest[prefix_len - 1] == b'R';
        let quote = rest[prefix_len];

        for _ in 0..prefix_len {
            self.bump();
        }
        if raw && quote == b'"' {
            self.lex_raw_string();
            return Some(TokenKind::String);
        }
        self.lex_quoted(quote);
        Some(if quote == b'"' {
            TokenKind::String
        } else {
            TokenKind::Char
        })
    }

    fn lex_identifier(&mut self) {
        while let Some(c) = self.src[self.pos..].chars().next() {
            if !is_ident_continue(c) {
                break;
            }
            for _ in 0..c.len_utf8() {
                self.bump();
            }
        }
    }

    fn lex_number(&mut self) {
        while self.pos < self.bytes.len() {
            let c = self.peek(0);
            let exponent = matches!(c, b'e' | b'E' | b'p' | b'P') && matches!(self.peek(1), b'+' | b'-');
            if exponent {
                self.bump();
                self.bump();
            } else if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' {
                self.bump();
            } else if c == b'\'' && self.peek(1).is_ascii_alphanumeric() {
                // digit separator
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_quoted(&mut self, quote: u8) {
        self.bump();
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'\\' => {
                    self.bump();
                    if self.pos < self.bytes.len() {
                        self.bump();
                    }
                }
                b'\n' => return,
                c if c == quote => {
                    self.bump();
                    return;
                }
                _ => self.bump(),
            }
        }
    }

    fn lex_raw_string(&mut self) {
        self.bump(); // opening quote
        let delim_start = self.pos;
        while self.pos < self.bytes.len() && !matches!(self.peek(0), b'(' | b'\n' | b'"') {
            self.bump();
        }
        if self.peek(0) != b'(' {
            return;
        }
        let mut terminator = Vec::with_capacity(self.pos - delim_start + 2);
        terminator.push(b')');
        terminator.extend_from_slice(&self.bytes[delim_start..self.pos]);
        terminator.push(b'"');
        self.bump();

        while self.pos < self.bytes.len() {
            if self.bytes[self.pos..].starts_with(&terminator) {
                for _ in 0..terminator.len() {
                    self.bump();
                }
                return;
            }
            self.bump();
        }
    }

    fn lex_punct(&mut self) {
        let rest = &self.src[self.pos..];
        let len = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p))
            .map(|p| p.len())
            .unwrap_or_else(|| rest.chars().next().map_or(1, char::len_utf8));
        for _ in 0..len {
            self.bump();
        }
    }
}
