//! PromQL/MetricsQL tokenizer
//!
//! Only distinguishes what label injection needs: identifiers, literals,
//! brackets, commas and operators. Tokens keep their byte span so the
//! rewriter can splice text into the original query.

use crate::error::RewriteError;

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Metric names, label names, function names and keywords
    Ident,
    /// Numbers and durations (`5m`, `1.5`, `0x1f`)
    Number,
    /// Quoted string, quotes included
    String,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    /// Arithmetic, comparison, matcher and modifier operators
    Operator,
}

/// A token borrowed from the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Operators, longest first
const OPERATORS: &[&str] = &[
    "=~", "!~", "!=", "==", "<=", ">=", "=", "<", ">", "+", "-", "*", "/", "%", "^", "@", ":",
];

/// Split a query into tokens, skipping whitespace and `#` comments
pub fn tokenize(query: &str) -> Result<Vec<Token<'_>>, RewriteError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(ch) = query[pos..].chars().next() {
        let start = pos;

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if ch == '#' {
            pos = query[pos..].find('\n').map_or(query.len(), |n| pos + n);
            continue;
        }

        let kind = match ch {
            '{' => single(&mut pos, TokenKind::LeftBrace),
            '}' => single(&mut pos, TokenKind::RightBrace),
            '(' => single(&mut pos, TokenKind::LeftParen),
            ')' => single(&mut pos, TokenKind::RightParen),
            '[' => single(&mut pos, TokenKind::LeftBracket),
            ']' => single(&mut pos, TokenKind::RightBracket),
            ',' => single(&mut pos, TokenKind::Comma),
            '"' | '\'' | '`' => {
                pos = string_end(query, start, ch)?;
                TokenKind::String
            }
            c if c.is_ascii_digit() || (c == '.' && next_is_digit(query, pos + 1)) => {
                pos = scan_while(query, pos, |c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
                TokenKind::Number
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                pos = scan_while(query, pos, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
                TokenKind::Ident
            }
            _ => {
                let op = OPERATORS
                    .iter()
                    .find(|op| query[pos..].starts_with(**op))
                    .ok_or_else(|| {
                        RewriteError::lex(pos, format!("unexpected character {ch:?}"))
                    })?;
                pos += op.len();
                TokenKind::Operator
            }
        };

        tokens.push(Token {
            kind,
            text: &query[start..pos],
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

fn single(pos: &mut usize, kind: TokenKind) -> TokenKind {
    *pos += 1;
    kind
}

fn next_is_digit(query: &str, pos: usize) -> bool {
    query[pos..].chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn scan_while(query: &str, pos: usize, accept: impl Fn(char) -> bool) -> usize {
    query[pos..]
        .char_indices()
        .find(|(_, c)| !accept(*c))
        .map_or(query.len(), |(n, _)| pos + n)
}

/// Position right after the closing quote of the string starting at `start`
fn string_end(query: &str, start: usize, quote: char) -> Result<usize, RewriteError> {
    let mut escaped = false;

    for (n, c) in query[start + 1..].char_indices() {
        match c {
            // Backquoted strings are raw
            '\\' if quote != '`' && !escaped => escaped = true,
            c if c == quote && !escaped => return Ok(start + 1 + n + c.len_utf8()),
            _ => escaped = false,
        }
    }

    Err(RewriteError::lex(start, "unterminated string"))
}
