//! Tokenizer for the C/C++ subset
//!
//! Produces a flat token stream with byte spans. Preprocessor lines are
//! captured as single [`TokenKind::Directive`] tokens so the parser can
//! keep `#include` blocks verbatim. Comments are skipped.

use crate::source::{SourceFile, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Str,
    Char,
    Punct,
    /// A whole preprocessor line (`#include <...>`, `#define ...`).
    Directive,
}

/// A token with its verbatim text and source span.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            span: Span::new(start, end),
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

/// Multi-character punctuators, longest first so maximal munch works.
const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "->*", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "->", "::", "+", "-", "*", "/", "%", "&", "|", "^",
    "~", "!", "<", ">", "=", "?", ":", ";", ",", ".", "(", ")", "[", "]", "{", "}",
];

/// Tokenize the whole source file.
pub fn tokenize(source: &SourceFile) -> Vec<Token> {
    let text = source.text();
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut at_line_start = true;

    while i < bytes.len() {
        let c = bytes[i] as char;

        // Line comments
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        // Block comments
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            continue;
        }

        if c == '\n' {
            at_line_start = true;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Preprocessor line, captured verbatim (including continuations)
        if c == '#' && at_line_start {
            let start = i;
            loop {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                if i > start && bytes[i - 1] == b'\\' && i < bytes.len() {
                    i += 1; // line continuation
                    continue;
                }
                break;
            }
            let line = text[start..i].trim_end();
            tokens.push(Token::new(TokenKind::Directive, line, start, start + line.len()));
            continue;
        }
        at_line_start = false;

        // Identifiers and keywords
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() {
                let ch = bytes[i] as char;
                if ch.is_alphanumeric() || ch == '_' {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Ident, &text[start..i], start, i));
            continue;
        }

        // Numbers: integer or floating point, with suffixes
        if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()))
        {
            let start = i;
            let mut is_float = c == '.';
            if c == '0' && matches!(bytes.get(i + 1), Some(&b'x') | Some(&b'X')) {
                i += 2;
                while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                    i += 1;
                }
            } else {
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_ascii_digit() {
                        i += 1;
                    } else if ch == '.' && !is_float {
                        is_float = true;
                        i += 1;
                    } else if (ch == 'e' || ch == 'E')
                        && bytes.get(i + 1).is_some_and(|b| {
                            b.is_ascii_digit() || *b == b'+' || *b == b'-'
                        })
                    {
                        is_float = true;
                        i += 2;
                    } else {
                        break;
                    }
                }
            }
            // Suffixes: u, l, f and combinations
            while i < bytes.len() && matches!(bytes[i], b'u' | b'U' | b'l' | b'L' | b'f' | b'F') {
                if matches!(bytes[i], b'f' | b'F') {
                    is_float = true;
                }
                i += 1;
            }
            let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
            tokens.push(Token::new(kind, &text[start..i], start, i));
            continue;
        }

        // String literals
        if c == '"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            tokens.push(Token::new(TokenKind::Str, &text[start..i], start, i));
            continue;
        }

        // Character literals
        if c == '\'' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'\'' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            tokens.push(Token::new(TokenKind::Char, &text[start..i], start, i));
            continue;
        }

        // Punctuators, longest match first
        let rest = &text[i..];
        let mut matched = false;
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                tokens.push(Token::new(TokenKind::Punct, *p, i, i + p.len()));
                i += p.len();
                matched = true;
                break;
            }
        }
        if !matched {
            // Unknown byte: emit as a single punct so the parser can report it
            let len = c.len_utf8();
            tokens.push(Token::new(TokenKind::Punct, &text[i..i + len], i, i + len));
            i += len;
        }
    }

    tokens
}
