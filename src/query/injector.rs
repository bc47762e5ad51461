//! Label filter injection
//!
//! Adds the ACL's label filter to every series selector of a query. Caller
//! matchers are left in place, so the selector ends up matching the
//! intersection of what the caller asked for and what the ACL permits.

use crate::acl::LabelFilter;
use crate::error::RewriteError;
use crate::query::lexer::{Token, TokenKind, tokenize};
use tracing::trace;

/// Binary operators spelled as words, matched in any case
const BINARY_KEYWORDS: &[&str] = &["and", "or", "unless", "atan2"];

/// MetricsQL binary operators, matched exactly
const METRICSQL_BINARY_KEYWORDS: &[&str] = &["if", "ifnot", "default"];

const COMPARISON_OPERATORS: &[&str] = &["==", "!=", ">", "<", ">=", "<="];

const MATCH_OPERATORS: &[&str] = &["=", "!=", "=~", "!~"];

/// What the previous token leaves the parser expecting.
///
/// Words like `and` or `limit` are only operators right after an operand;
/// anywhere else they are metric names and get the filter like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Start of an expression or argument
    Operand,
    /// After a complete operand, where only operators and modifiers follow
    AfterOperand,
    /// After a comparison, where `bool` may follow
    AfterComparison,
    /// After a binary operator, where `on`/`ignoring` may follow
    AfterBinary,
    /// After an `on`/`ignoring` label list, where `group_left`/`group_right` may follow
    AfterMatching,
}

/// Injects one label filter into queries
#[derive(Debug, Clone)]
pub struct LabelInjector {
    filter: LabelFilter,
    matcher: String,
}

impl LabelInjector {
    pub fn new(filter: LabelFilter) -> Self {
        let matcher = filter.to_string();
        Self { filter, matcher }
    }

    pub fn filter(&self) -> &LabelFilter {
        &self.filter
    }

    /// Rewrite a query so that every selector carries the filter.
    ///
    /// Fails instead of guessing when the query cannot be parsed.
    pub fn inject(&self, query: &str) -> Result<String, RewriteError> {
        let tokens = tokenize(query)?;
        check_balanced(&tokens, query.len())?;

        let mut insertions: Vec<(usize, String)> = Vec::new();
        let mut position = Position::Operand;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];

            match token.kind {
                TokenKind::LeftBrace => {
                    let (end, insertion) = self.selector_block(&tokens, i)?;
                    insertions.extend(insertion);
                    position = Position::AfterOperand;
                    i = end;
                }
                TokenKind::Ident => {
                    (i, position) = self.identifier(&tokens, i, position, &mut insertions)?;
                }
                TokenKind::Operator if COMPARISON_OPERATORS.contains(&token.text) => {
                    position = Position::AfterComparison;
                    i += 1;
                }
                TokenKind::Operator => {
                    position = Position::AfterBinary;
                    i += 1;
                }
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Comma => {
                    position = Position::Operand;
                    i += 1;
                }
                TokenKind::Number
                | TokenKind::String
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace => {
                    position = Position::AfterOperand;
                    i += 1;
                }
            }
        }

        Ok(apply(query, insertions))
    }

    /// Handle the identifier at `i`, returning the next index and position
    fn identifier(
        &self,
        tokens: &[Token<'_>],
        i: usize,
        position: Position,
        insertions: &mut Vec<(usize, String)>,
    ) -> Result<(usize, Position), RewriteError> {
        let token = tokens[i];
        let word = token.text.to_ascii_lowercase();
        let next = tokens.get(i + 1);
        let followed_by_paren = next.is_some_and(|t| t.is(TokenKind::LeftParen));

        if word == "with" && followed_by_paren {
            return Err(RewriteError::syntax(
                token.start,
                "WITH templates are not supported",
            ));
        }

        match position {
            Position::AfterOperand => return operator_word(tokens, i, &word),
            Position::AfterComparison if word == "bool" => {
                return Ok((i + 1, Position::AfterBinary));
            }
            Position::AfterComparison | Position::AfterBinary
                if followed_by_paren && matches!(word.as_str(), "on" | "ignoring") =>
            {
                return Ok((skip_label_list(tokens, i + 1)?, Position::AfterMatching));
            }
            Position::AfterMatching if matches!(word.as_str(), "group_left" | "group_right") => {
                let end = if followed_by_paren {
                    skip_label_list(tokens, i + 1)?
                } else {
                    i + 1
                };
                return Ok((end, Position::Operand));
            }
            _ => {}
        }

        if followed_by_paren {
            // Function call, its arguments are handled as they come
            return Ok((i + 1, Position::Operand));
        }

        // `sum by (job) (...)` puts the grouping before the arguments
        if let Some(args) = grouping_before_arguments(tokens, i)? {
            return Ok((args, Position::Operand));
        }

        if next.is_some_and(|t| t.is(TokenKind::LeftBrace)) {
            let (end, insertion) = self.selector_block(tokens, i + 1)?;
            insertions.extend(insertion);
            return Ok((end, Position::AfterOperand));
        }

        if matches!(word.as_str(), "inf" | "nan") {
            return Ok((i + 1, Position::AfterOperand));
        }

        trace!(metric = token.text, "Injecting into bare metric");
        insertions.push((token.end, format!("{{{}}}", self.matcher)));
        Ok((i + 1, Position::AfterOperand))
    }

    /// Parse the matchers of the block opening at `open`.
    ///
    /// Returns the index after the closing brace and the insertion, if any.
    fn selector_block(
        &self,
        tokens: &[Token<'_>],
        open: usize,
    ) -> Result<(usize, Option<(usize, String)>), RewriteError> {
        let mut i = open + 1;
        let mut last_value_end = None;
        let mut trailing_comma = false;
        let mut already_filtered = false;

        loop {
            let token = expect_token(tokens, i, tokens[open].end)?;
            if token.is(TokenKind::RightBrace) {
                break;
            }

            // Quoted label names are allowed by newer PromQL
            if !token.is(TokenKind::Ident) && !token.is(TokenKind::String) {
                return Err(RewriteError::syntax(token.start, "expected label name"));
            }
            let label = token;

            let op = expect_token(tokens, i + 1, label.end)?;
            if !op.is(TokenKind::Operator) || !MATCH_OPERATORS.contains(&op.text) {
                return Err(RewriteError::syntax(op.start, "expected label matcher operator"));
            }

            let value = expect_token(tokens, i + 2, op.end)?;
            if !value.is(TokenKind::String) {
                return Err(RewriteError::syntax(value.start, "expected quoted label value"));
            }

            if label.text == self.filter.label
                && op.text == self.filter.operator()
                && value.text == self.filter.quoted_value()
            {
                already_filtered = true;
            }
            last_value_end = Some(value.end);

            let separator = expect_token(tokens, i + 3, value.end)?;
            match separator.kind {
                TokenKind::Comma => {
                    trailing_comma = true;
                    i += 4;
                }
                TokenKind::RightBrace => {
                    trailing_comma = false;
                    i += 3;
                }
                // e.g. MetricsQL `{a="b" or c="d"}`
                _ => {
                    return Err(RewriteError::syntax(
                        separator.start,
                        "expected ',' or '}' after label matcher",
                    ));
                }
            }
        }

        let close = tokens[i];
        let insertion = match last_value_end {
            _ if already_filtered => None,
            None => Some((close.start, self.matcher.clone())),
            Some(_) if trailing_comma => Some((close.start, self.matcher.clone())),
            Some(end) => Some((end, format!(", {}", self.matcher))),
        };

        Ok((i + 1, insertion))
    }
}

/// Inject `filter` into `query`
pub fn inject(query: &str, filter: &LabelFilter) -> Result<String, RewriteError> {
    LabelInjector::new(filter.clone()).inject(query)
}

/// Interpret a word that follows a complete operand as an operator or modifier
fn operator_word(
    tokens: &[Token<'_>],
    i: usize,
    word: &str,
) -> Result<(usize, Position), RewriteError> {
    let token = tokens[i];
    let followed_by_paren = tokens.get(i + 1).is_some_and(|t| t.is(TokenKind::LeftParen));

    if BINARY_KEYWORDS.contains(&word) || METRICSQL_BINARY_KEYWORDS.contains(&token.text) {
        return Ok((i + 1, Position::AfterBinary));
    }

    match (word, token.text) {
        ("offset", _) | (_, "limit") => Ok((i + 1, Position::Operand)),
        ("by" | "without", _) if followed_by_paren => {
            Ok((skip_label_list(tokens, i + 1)?, Position::AfterOperand))
        }
        (_, "keep_metric_names") => Ok((i + 1, Position::AfterOperand)),
        _ => Err(RewriteError::syntax(
            token.start,
            format!("unexpected identifier {:?} after an operand", token.text),
        )),
    }
}

/// Index of the argument list when the identifier at `i` is an aggregation
/// written as `name by (labels) (args)`
fn grouping_before_arguments(
    tokens: &[Token<'_>],
    i: usize,
) -> Result<Option<usize>, RewriteError> {
    let is_grouping = tokens.get(i + 1).is_some_and(|t| {
        t.is(TokenKind::Ident) && matches!(t.text.to_ascii_lowercase().as_str(), "by" | "without")
    });
    if !is_grouping || !tokens.get(i + 2).is_some_and(|t| t.is(TokenKind::LeftParen)) {
        return Ok(None);
    }

    let args = skip_label_list(tokens, i + 2)?;
    Ok(tokens
        .get(args)
        .is_some_and(|t| t.is(TokenKind::LeftParen))
        .then_some(args))
}

fn expect_token<'a>(
    tokens: &[Token<'a>],
    i: usize,
    offset: usize,
) -> Result<Token<'a>, RewriteError> {
    tokens
        .get(i)
        .copied()
        .ok_or_else(|| RewriteError::syntax(offset, "unexpected end of query"))
}

/// Skip `( label, ... )` starting at the opening paren, returning the index after it
fn skip_label_list(tokens: &[Token<'_>], open: usize) -> Result<usize, RewriteError> {
    let mut i = open + 1;
    loop {
        let token = expect_token(tokens, i, tokens[open].end)?;
        match token.kind {
            TokenKind::RightParen => return Ok(i + 1),
            TokenKind::Ident | TokenKind::String | TokenKind::Comma => i += 1,
            _ => return Err(RewriteError::syntax(token.start, "expected label name")),
        }
    }
}

/// Verify that brackets pair up
fn check_balanced(tokens: &[Token<'_>], len: usize) -> Result<(), RewriteError> {
    let mut stack: Vec<Token<'_>> = Vec::new();

    for token in tokens {
        let opening = match token.kind {
            TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket => {
                stack.push(*token);
                continue;
            }
            TokenKind::RightBrace => TokenKind::LeftBrace,
            TokenKind::RightParen => TokenKind::LeftParen,
            TokenKind::RightBracket => TokenKind::LeftBracket,
            _ => continue,
        };

        match stack.pop() {
            Some(open) if open.kind == opening => {}
            _ => return Err(RewriteError::syntax(token.start, "unbalanced brackets")),
        }
    }

    match stack.last() {
        Some(open) => Err(RewriteError::syntax(
            open.start,
            format!("unclosed '{}' before byte {len}", open.text),
        )),
        None => Ok(()),
    }
}

fn apply(query: &str, mut insertions: Vec<(usize, String)>) -> String {
    insertions.sort_by_key(|(pos, _)| *pos);

    let extra: usize = insertions.iter().map(|(_, s)| s.len()).sum();
    let mut out = String::with_capacity(query.len() + extra);
    let mut last = 0;

    for (pos, text) in insertions {
        out.push_str(&query[last..pos]);
        out.push_str(&text);
        last = pos;
    }
    out.push_str(&query[last..]);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> LabelInjector {
        LabelInjector::new(LabelFilter::exact("minio"))
    }

    #[test]
    fn test_bare_metric() {
        assert_eq!(exact().inject("up").unwrap(), r#"up{namespace="minio"}"#);
    }

    #[test]
    fn test_metric_with_matchers() {
        assert_eq!(
            exact().inject(r#"up{job="a"}"#).unwrap(),
            r#"up{job="a", namespace="minio"}"#
        );
    }

    #[test]
    fn test_trailing_comma_and_empty_block() {
        assert_eq!(
            exact().inject(r#"up{job="a", }"#).unwrap(),
            r#"up{job="a", namespace="minio"}"#
        );
        assert_eq!(
            exact().inject("up{}").unwrap(),
            r#"up{namespace="minio"}"#
        );
    }

    #[test]
    fn test_selector_without_name() {
        assert_eq!(
            exact().inject(r#"{__name__=~"node_.*"}"#).unwrap(),
            r#"{__name__=~"node_.*", namespace="minio"}"#
        );
    }

    #[test]
    fn test_functions_and_ranges() {
        assert_eq!(
            exact().inject("rate(http_requests_total[5m])").unwrap(),
            r#"rate(http_requests_total{namespace="minio"}[5m])"#
        );
    }

    #[test]
    fn test_aggregation_label_lists_untouched() {
        assert_eq!(
            exact().inject("sum by (job, instance) (up)").unwrap(),
            r#"sum by (job, instance) (up{namespace="minio"})"#
        );
        assert_eq!(
            exact().inject("sum(up) without (pod)").unwrap(),
            r#"sum(up{namespace="minio"}) without (pod)"#
        );
    }

    #[test]
    fn test_binary_expressions() {
        assert_eq!(
            exact()
                .inject("a / on(pod) group_left(node) b > bool c offset 5m")
                .unwrap(),
            concat!(
                r#"a{namespace="minio"} / on(pod) group_left(node) b{namespace="minio"}"#,
                r#" > bool c{namespace="minio"} offset 5m"#
            )
        );
        assert_eq!(
            exact().inject("a AND ignoring(pod) b Unless c").unwrap(),
            concat!(
                r#"a{namespace="minio"} AND ignoring(pod) b{namespace="minio"}"#,
                r#" Unless c{namespace="minio"}"#
            )
        );
    }

    #[test]
    fn test_keyword_names_are_metrics_outside_operator_position() {
        for (query, expected) in [
            ("default", r#"default{namespace="minio"}"#),
            ("Default", r#"Default{namespace="minio"}"#),
            ("limit", r#"limit{namespace="minio"}"#),
            ("LIMIT", r#"LIMIT{namespace="minio"}"#),
            ("if", r#"if{namespace="minio"}"#),
            ("ifnot", r#"ifnot{namespace="minio"}"#),
            ("offset", r#"offset{namespace="minio"}"#),
            ("bool", r#"bool{namespace="minio"}"#),
            ("and", r#"and{namespace="minio"}"#),
            ("sum(keep_metric_names)", r#"sum(keep_metric_names{namespace="minio"})"#),
            ("a + default", r#"a{namespace="minio"} + default{namespace="minio"}"#),
            ("rate(limit[5m])", r#"rate(limit{namespace="minio"}[5m])"#),
            ("up by (job)", r#"up{namespace="minio"} by (job)"#),
        ] {
            assert_eq!(exact().inject(query).unwrap(), expected, "{query}");
        }
    }

    #[test]
    fn test_metricsql_operators() {
        assert_eq!(
            exact().inject("a default b").unwrap(),
            r#"a{namespace="minio"} default b{namespace="minio"}"#
        );
        assert_eq!(
            exact().inject("a if b ifnot c").unwrap(),
            r#"a{namespace="minio"} if b{namespace="minio"} ifnot c{namespace="minio"}"#
        );
        assert_eq!(
            exact().inject("sum(x) by (job) limit 5").unwrap(),
            r#"sum(x{namespace="minio"}) by (job) limit 5"#
        );
        assert_eq!(
            exact().inject("rate(x[5m]) keep_metric_names").unwrap(),
            r#"rate(x{namespace="minio"}[5m]) keep_metric_names"#
        );
    }

    #[test]
    fn test_literals_untouched() {
        assert_eq!(exact().inject("1 + Inf - NaN").unwrap(), "1 + Inf - NaN");
        assert_eq!(
            exact()
                .inject(r#"label_replace(up, "dst", "$1", "src", "(.*)")"#)
                .unwrap(),
            r#"label_replace(up{namespace="minio"}, "dst", "$1", "src", "(.*)")"#
        );
    }

    #[test]
    fn test_caller_filter_is_kept() {
        // The result is the intersection, so a forbidden namespace yields nothing
        assert_eq!(
            exact().inject(r#"up{namespace="other"}"#).unwrap(),
            r#"up{namespace="other", namespace="minio"}"#
        );
    }

    #[test]
    fn test_identical_filter_not_duplicated() {
        let query = r#"up{namespace="minio"}"#;
        assert_eq!(exact().inject(query).unwrap(), query);
    }

    #[test]
    fn test_injection_is_stable() {
        let once = exact().inject("sum(rate(x[5m])) / sum(y)").unwrap();
        assert_eq!(exact().inject(&once).unwrap(), once);
    }

    #[test]
    fn test_regex_filter_escaping() {
        let injector = LabelInjector::new(LabelFilter::regex(r"kube\.system|min.*"));
        assert_eq!(
            injector.inject("up").unwrap(),
            r#"up{namespace=~"kube\\.system|min.*"}"#
        );
    }

    #[test]
    fn test_fails_closed() {
        for query in [
            "up{",
            "rate(up[5m]",
            "up)",
            r#"up{job}"#,
            r#"up{job="a" or job="b"}"#,
            r#"up{job=a}"#,
            "with (x = up) x",
            "up foo",
            "a DEFAULT b",
            "sum(x) LIMIT 5",
        ] {
            assert!(exact().inject(query).is_err(), "{query} should be rejected");
        }
    }
}
