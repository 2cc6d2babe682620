//! Line-preserving preprocessing.
//!
//! The output has exactly the byte length and line structure of the input:
//! lines in inactive conditional regions, and the conditional directives
//! themselves, are overwritten with spaces. Token positions in the
//! preprocessed text therefore are positions in the file on disk, which is
//! what match results report.
//!
//! Macro bodies are recorded but not substituted into the text.

use crate::ingest::{self, includes::IncludeKind};
use std::collections::BTreeMap;

/// A macro definition seen while preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    /// Parameter names for function-like macros.
    pub params: Option<Vec<String>>,
    /// Replacement list as written.
    pub body: String,
    /// Line of the `#define` (0 for configured macros).
    pub line: u32,
}

/// An `#include` found in an active region.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    /// Header name between the delimiters.
    pub spelled: String,
    /// `<...>` or `"..."`.
    pub kind: IncludeKind,
    /// Line of the directive (1-based).
    pub line: u32,
}

/// Result of preprocessing one file.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Source with inactive regions blanked.
    pub text: String,
    /// Active include directives in source order.
    pub includes: Vec<IncludeDirective>,
    /// Macro table at the end of the file.
    pub macros: BTreeMap<String, Macro>,
    /// Number of physical lines that were blanked.
    pub blanked_lines: usize,
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    parent_active: bool,
    taken: bool,
    active: bool,
}

/// Preprocess `source` under the configured macro definitions.
pub fn preprocess(source: &str, defines: &BTreeMap<String, String>) -> Preprocessed {
    let mut macros: BTreeMap<String, Macro> = defines
        .iter()
        .map(|(name, value)| {
            (
                name.clone(),
                Macro {
                    params: None,
                    body: value.clone(),
                    line: 0,
                },
            )
        })
        .collect();

    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut includes = Vec::new();
    let mut stack: Vec<Conditional> = Vec::new();
    let mut in_comment = false;
    let mut blanked_lines = 0;

    for logical in logical_lines(source) {
        let active = stack.last().map_or(true, |c| c.active);
        let line_text = &source[logical.start..logical.end];
        let directive = if in_comment {
            None
        } else {
            parse_directive(line_text)
        };
        in_comment = scan_comments(line_text.as_bytes(), in_comment);

        let blank = match directive {
            Some((name, rest)) => match name {
                "if" | "ifdef" | "ifndef" => {
                    let holds = active
                        && match name {
                            "ifdef" => macros.contains_key(first_word(rest)),
                            "ifndef" => !macros.contains_key(first_word(rest)),
                            _ => evaluate(rest, &macros) != 0,
                        };
                    stack.push(Conditional {
                        parent_active: active,
                        taken: holds,
                        active: holds,
                    });
                    true
                }
                "elif" | "elifdef" | "elifndef" => {
                    if let Some(top) = stack.last_mut() {
                        let holds = top.parent_active
                            && !top.taken
                            && match name {
                                "elifdef" => macros.contains_key(first_word(rest)),
                                "elifndef" => !macros.contains_key(first_word(rest)),
                                _ => evaluate(rest, &macros) != 0,
                            };
                        top.active = holds;
                        top.taken |= holds;
                    }
                    true
                }
                "else" => {
                    if let Some(top) = stack.last_mut() {
                        top.active = top.parent_active && !top.taken;
                        top.taken = true;
                    }
                    true
                }
                "endif" => {
                    stack.pop();
                    true
                }
                _ if !active => true,
                "define" => {
                    if let Some((name, definition)) = parse_define(rest, logical.line) {
                        macros.insert(name, definition);
                    }
                    false
                }
                "undef" => {
                    macros.remove(first_word(rest));
                    false
                }
                "include" | "include_next" | "import" => {
                    if let Some((spelled, kind)) = parse_include(rest) {
                        includes.push(IncludeDirective {
                            spelled,
                            kind,
                            line: logical.line,
                        });
                    }
                    false
                }
                _ => false,
            },
            None => !active,
        };

        if blank {
            blanked_lines += logical.physical_lines;
            for byte in &mut out[logical.start..logical.end] {
                if *byte != b'\n' {
                    *byte = b' ';
                }
            }
        }
    }

    let text = ingest::decode_source(out);

    Preprocessed {
        text,
        includes,
        macros,
        blanked_lines,
    }
}

struct LogicalLine {
    start: usize,
    end: usize,
    line: u32,
    physical_lines: usize,
}

/// Split into logical lines, joining backslash continuations.
fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let bytes = source.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut line = 1u32;

    while start < bytes.len() {
        let mut end = start;
        let mut physical = 1;
        loop {
            while end < bytes.len() && bytes[end] != b'\n' {
                end += 1;
            }
            let content = &bytes[start..end];
            let continued = content.ends_with(b"\\") || content.ends_with(b"\\\r");
            if continued && end < bytes.len() {
                end += 1;
                physical += 1;
                continue;
            }
            break;
        }
        lines.push(LogicalLine {
            start,
            end,
            line,
            physical_lines: physical,
        });
        line += physical as u32;
        start = end + 1;
    }

    lines
}

/// Whether a block comment is still open at the end of `line`.
fn scan_comments(line: &[u8], mut in_comment: bool) -> bool {
    let mut i = 0;
    while i < line.len() {
        if in_comment {
            if line[i..].starts_with(b"*/") {
                in_comment = false;
                i += 2;
                continue;
            }
        } else if line[i..].starts_with(b"//") {
            return false;
        } else if line[i..].starts_with(b"/*") {
            in_comment = true;
            i += 2;
            continue;
        } else if line[i] == b'"' || line[i] == b'\'' {
            let quote = line[i];
            i += 1;
            while i < line.len() && line[i] != quote {
                if line[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
        }
        i += 1;
    }
    in_comment
}

/// Split `# name rest` into its directive name and remainder.
fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let after_hash = trimmed.strip_prefix('#')?.trim_start();
    let name_len = after_hash
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after_hash.len());
    Some((&after_hash[..name_len], &after_hash[name_len..]))
}

fn first_word(rest: &str) -> &str {
    let rest = rest.trim_start();
    let len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..len]
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        if rest.starts_with("//") {
            break;
        }
        if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(end) => &after[end + 2..],
                None => "",
            };
            out.push(' ');
            continue;
        }
        if let Some(after) = rest.strip_prefix("\\\n") {
            rest = after;
            out.push(' ');
            continue;
        }
        let c = rest.chars().next().unwrap_or(' ');
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn parse_define(rest: &str, line: u32) -> Option<(String, Macro)> {
    let rest = strip_comments(rest);
    let rest = rest.trim_start();
    let name = first_word(rest);
    if name.is_empty() {
        return None;
    }
    let after = &rest[name.len()..];

    let (params, body) = match after.strip_prefix('(') {
        Some(list) => {
            let close = list.find(')')?;
            let params = list[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            (Some(params), &list[close + 1..])
        }
        None => (None, after),
    };

    Some((
        name.to_string(),
        Macro {
            params,
            body: body.trim().to_string(),
            line,
        },
    ))
}

fn parse_include(rest: &str) -> Option<(String, IncludeKind)> {
    let rest = strip_comments(rest);
    let rest = rest.trim();
    let (open, close, kind) = match rest.chars().next()? {
        '<' => ('<', '>', IncludeKind::System),
        '"' => ('"', '"', IncludeKind::Local),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let spelled = inner[..end].trim();
    if spelled.is_empty() {
        return None;
    }
    Some((spelled.to_string(), kind))
}

// ---------------------------------------------------------------------------
// #if expression evaluation

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Num(i64),
    Op(&'static str),
}

const EXPR_OPS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "(", ")", "!", "~", "*", "/", "%", "+", "-",
    "<", ">", "&", "^", "|", "?", ":",
];

const MAX_EXPANSION_DEPTH: usize = 16;

/// Evaluate a conditional expression; malformed input evaluates to 0.
fn evaluate(expr: &str, macros: &BTreeMap<String, Macro>) -> i64 {
    let tokens = expr_tokens(&strip_comments(expr), macros, 0);
    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.ternary();
    if parser.pos == parser.tokens.len() {
        value
    } else {
        0
    }
}

fn expr_tokens(expr: &str, macros: &BTreeMap<String, Macro>, depth: usize) -> Vec<ExprToken> {
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();

    while !rest.is_empty() {
        let c = rest.chars().next().unwrap_or(' ');
        if c.is_ascii_digit() {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '\''))
                .unwrap_or(rest.len());
            tokens.push(ExprToken::Num(parse_int(&rest[..len])));
            rest = &rest[len..];
        } else if c == '_' || c.is_ascii_alphabetic() {
            let word = first_word(rest);
            rest = &rest[word.len()..];
            if word == "defined" {
                let mut after = rest.trim_start();
                let parenthesized = after.starts_with('(');
                if parenthesized {
                    after = after[1..].trim_start();
                }
                let name = first_word(after);
                after = &after[name.len()..];
                if parenthesized {
                    after = after.trim_start().strip_prefix(')').unwrap_or(after);
                }
                rest = after;
                tokens.push(ExprToken::Num(macros.contains_key(name) as i64));
            } else if let Some(definition) = macros.get(word) {
                if definition.params.is_some() {
                    // function-like macro invocations are not expanded
                    tokens.push(ExprToken::Num(0));
                    rest = skip_call_arguments(rest);
                } else if depth < MAX_EXPANSION_DEPTH {
                    let body = if definition.body.is_empty() {
                        "1"
                    } else {
                        definition.body.as_str()
                    };
                    tokens.push(ExprToken::Op("("));
                    tokens.extend(expr_tokens(body, macros, depth + 1));
                    tokens.push(ExprToken::Op(")"));
                } else {
                    tokens.push(ExprToken::Num(0));
                }
            } else {
                tokens.push(ExprToken::Num((word == "true") as i64));
            }
        } else if let Some(op) = EXPR_OPS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(ExprToken::Op(op));
            rest = &rest[op.len()..];
        } else {
            rest = &rest[c.len_utf8()..];
        }
        rest = rest.trim_start();
    }

    tokens
}

fn skip_call_arguments(rest: &str) -> &str {
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('(') {
        return rest;
    }
    let mut depth = 0;
    for (i, c) in trimmed.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return &trimmed[i + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

fn parse_int(literal: &str) -> i64 {
    let digits: String = literal.chars().filter(|c| *c != '\'').collect();
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    let body = body.trim_end_matches(['u', 'l']);
    i64::from_str_radix(body, radix).unwrap_or(0)
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprParser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn ternary(&mut self) -> i64 {
        let cond = self.binary(0);
        if self.peek_op() == Some("?") {
            self.pos += 1;
            let then = self.ternary();
            if self.peek_op() == Some(":") {
                self.pos += 1;
            }
            let otherwise = self.ternary();
            return if cond != 0 { then } else { otherwise };
        }
        cond
    }

    fn binary(&mut self, min_prec: u8) -> i64 {
        let mut lhs = self.unary();
        while let Some(op) = self.peek_op() {
            let prec = match precedence(op) {
                Some(p) if p >= min_prec => p,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.binary(prec + 1);
            lhs = apply(op, lhs, rhs);
        }
        lhs
    }

    fn unary(&mut self) -> i64 {
        match self.tokens.get(self.pos).cloned() {
            Some(ExprToken::Num(n)) => {
                self.pos += 1;
                n
            }
            Some(ExprToken::Op("(")) => {
                self.pos += 1;
                let value = self.ternary();
                if self.peek_op() == Some(")") {
                    self.pos += 1;
                }
                value
            }
            Some(ExprToken::Op("!")) => {
                self.pos += 1;
                (self.unary() == 0) as i64
            }
            Some(ExprToken::Op("~")) => {
                self.pos += 1;
                !self.unary()
            }
            Some(ExprToken::Op("-")) => {
                self.pos += 1;
                self.unary().wrapping_neg()
            }
            Some(ExprToken::Op("+")) => {
                self.pos += 1;
                self.unary()
            }
            _ => 0,
        }
    }
}

fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn apply(op: &str, lhs: i64, rhs: i64) -> i64 {
    match op {
        "||" => (lhs != 0 || rhs != 0) as i64,
        "&&" => (lhs != 0 && rhs != 0) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.wrapping_shl(rhs as u32),
        ">>" => lhs.wrapping_shr(rhs as u32),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" => lhs.checked_div(rhs).unwrap_or(0),
        "%" => lhs.checked_rem(rhs).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Preprocessed {
        preprocess(source, &BTreeMap::new())
    }

    #[test]
    fn test_output_preserves_layout() {
        let source = "#if 0\nint hidden;\n#endif\nint shown;\n";
        let out = run(source);
        assert_eq!(out.text.len(), source.len());
        assert_eq!(out.text.lines().count(), source.lines().count());
        assert!(!out.text.contains("hidden"));
        assert!(!out.text.contains("#if"));
        assert!(out.text.contains("int shown;"));
        assert_eq!(out.blanked_lines, 3);
    }

    #[test]
    fn test_ifdef_else_with_configured_define() {
        let source = "#ifdef FEATURE\nint on;\n#else\nint off;\n#endif\n";
        let mut defines = BTreeMap::new();
        defines.insert("FEATURE".to_string(), "1".to_string());

        let with = preprocess(source, &defines);
        assert!(with.text.contains("int on;"));
        assert!(!with.text.contains("int off;"));

        let without = run(source);
        assert!(!without.text.contains("int on;"));
        assert!(without.text.contains("int off;"));
    }

    #[test]
    fn test_elif_chain_takes_first_true_branch() {
        let source = "#define LEVEL 2\n#if LEVEL == 1\nint one;\n#elif LEVEL == 2\nint two;\n#elif LEVEL > 1\nint more;\n#else\nint none;\n#endif\n";
        let out = run(source);
        assert!(out.text.contains("int two;"));
        assert!(!out.text.contains("int one;"));
        assert!(!out.text.contains("int more;"));
        assert!(!out.text.contains("int none;"));
    }

    #[test]
    fn test_nested_inactive_region_stays_inactive() {
        let source = "#if 0\n#if 1\nint inner;\n#endif\n#else\nint outer;\n#endif\n";
        let out = run(source);
        assert!(!out.text.contains("inner"));
        assert!(out.text.contains("int outer;"));
    }

    #[test]
    fn test_defined_and_undef() {
        let source = "#define A\n#undef A\n#if !defined(A) && !defined B\nint yes;\n#endif\n";
        assert!(run(source).text.contains("int yes;"));
    }

    #[test]
    fn test_includes_only_from_active_regions() {
        let source = "#include <vector>\n#if 0\n#include \"hidden.h\"\n#endif\n  #  include \"a/b.h\" // note\n";
        let out = run(source);
        assert_eq!(
            out.includes,
            vec![
                IncludeDirective {
                    spelled: "vector".to_string(),
                    kind: IncludeKind::System,
                    line: 1,
                },
                IncludeDirective {
                    spelled: "a/b.h".to_string(),
                    kind: IncludeKind::Local,
                    line: 5,
                },
            ]
        );
    }

    #[test]
    fn test_directive_inside_block_comment_is_ignored() {
        let source = "/*\n#if 0\n*/\nint kept;\n";
        assert!(run(source).text.contains("int kept;"));
    }

    #[test]
    fn test_function_like_macro_recorded() {
        let out = run("#define MAX(a, b) ((a) > (b) ? (a) : (b))\n");
        let max = &out.macros["MAX"];
        assert_eq!(max.params, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(max.body, "((a) > (b) ? (a) : (b))");
        assert_eq!(max.line, 1);
    }

    #[test]
    fn test_expression_arithmetic() {
        let macros = BTreeMap::new();
        assert_eq!(evaluate("1 + 2 * 3", &macros), 7);
        assert_eq!(evaluate("(1 + 2) * 3", &macros), 9);
        assert_eq!(evaluate("0x10 >> 2", &macros), 4);
        assert_eq!(evaluate("1 ? 5 : 6", &macros), 5);
        assert_eq!(evaluate("10 / 0", &macros), 0);
        assert_eq!(evaluate("UNKNOWN", &macros), 0);
    }

    #[test]
    fn test_continuation_lines_are_one_directive() {
        let source = "#if 1 && \\\n    0\nint gone;\n#endif\n";
        let out = run(source);
        assert!(!out.text.contains("gone"));
        assert_eq!(out.text.len(), source.len());
    }
}
