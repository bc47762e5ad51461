//! Pattern element parsing
//!
//! Splits raw, comma-separated ACL definitions into normalized elements.

use crate::error::{AclError, AclResult};

/// The element that grants unrestricted access
pub const FULL_ACCESS_ELEMENT: &str = ".*";

/// Characters that turn a single element into a regular expression
const REGEX_METACHARACTERS: &[char] = &[
    '.', '+', '*', '?', '^', '$', '(', ')', '[', ']', '{', '}', '|', '\\',
];

/// Split a raw definition on commas into trimmed, non-empty elements.
///
/// Fails if an element contains whitespace or if nothing usable remains.
pub fn parse_elements(raw: &str) -> AclResult<Vec<String>> {
    let mut elements = Vec::new();

    for piece in raw.split(',') {
        let piece = piece.trim();

        if piece.chars().any(char::is_whitespace) {
            return Err(AclError::malformed(raw));
        }

        if !piece.is_empty() {
            elements.push(piece.to_string());
        }
    }

    if elements.is_empty() {
        return Err(AclError::empty(raw));
    }

    Ok(elements)
}

/// Whether an element has to be treated as a regular expression
pub fn is_regex(element: &str) -> bool {
    element.contains(REGEX_METACHARACTERS)
}

/// Strip leading `^`/`(` and trailing `$`/`)`.
///
/// The query backend anchors regex matchers on its own.
pub fn strip_anchors(element: &str) -> &str {
    element
        .trim_start_matches('^')
        .trim_start_matches('(')
        .trim_end_matches('$')
        .trim_end_matches(')')
}

/// Strip anchors from every element, dropping the ones that end up empty.
///
/// An element without metacharacters has no anchors, so it passes through as is.
pub fn normalize(elements: Vec<String>) -> Vec<String> {
    elements
        .iter()
        .map(|e| strip_anchors(e))
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_elements() {
        assert_eq!(parse_elements("a, b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_elements_dropped() {
        assert_eq!(parse_elements("a, , b").unwrap(), vec!["a", "b"]);
        assert_eq!(parse_elements("a,,b,").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_single_element() {
        assert_eq!(parse_elements("a").unwrap(), vec!["a"]);
        assert_eq!(parse_elements("  a\t").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_inner_space_rejected() {
        assert!(matches!(
            parse_elements("a b"),
            Err(AclError::MalformedPattern { .. })
        ));
        assert!(matches!(
            parse_elements("ok, a\tb"),
            Err(AclError::MalformedPattern { .. })
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            parse_elements(""),
            Err(AclError::EmptyPattern { .. })
        ));
        assert!(matches!(
            parse_elements(" , ,"),
            Err(AclError::EmptyPattern { .. })
        ));
    }

    #[test]
    fn test_is_regex() {
        assert!(is_regex("min.*"));
        assert!(is_regex("a|b"));
        assert!(is_regex(r"a\d"));
        assert!(!is_regex("minio"));
        assert!(!is_regex("kube-system"));
    }

    #[test]
    fn test_strip_anchors() {
        assert_eq!(strip_anchors("^(min.*)$"), "min.*");
        assert_eq!(strip_anchors("^^min.*$$"), "min.*");
        assert_eq!(strip_anchors("min.*"), "min.*");
    }

    #[test]
    fn test_normalize_drops_emptied_elements() {
        let normalized = normalize(vec!["^$".into(), "^a.*$".into(), "b".into()]);
        assert_eq!(normalized, vec!["a.*", "b"]);
    }
}
