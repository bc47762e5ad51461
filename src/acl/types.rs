//! ACL types
//!
//! Compiled ACLs and the label filter they carry.

use crate::acl::patterns::{FULL_ACCESS_ELEMENT, is_regex, normalize, parse_elements};
use crate::error::{AclError, AclResult};
use regex::Regex;
use std::fmt;

/// Label governed by every ACL
pub const NAMESPACE_LABEL: &str = "namespace";

/// A single label matcher injected into queries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelFilter {
    pub label: String,
    pub value: String,
    pub is_regexp: bool,
    pub is_negative: bool,
}

impl LabelFilter {
    /// Exact match on the namespace label
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            label: NAMESPACE_LABEL.to_string(),
            value: value.into(),
            is_regexp: false,
            is_negative: false,
        }
    }

    /// Regex match on the namespace label
    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            is_regexp: true,
            ..Self::exact(value)
        }
    }

    /// Matcher operator as written in PromQL
    pub const fn operator(&self) -> &'static str {
        match (self.is_regexp, self.is_negative) {
            (false, false) => "=",
            (false, true) => "!=",
            (true, false) => "=~",
            (true, true) => "!~",
        }
    }

    /// Value as a double-quoted PromQL string literal
    pub fn quoted_value(&self) -> String {
        let mut quoted = String::with_capacity(self.value.len() + 2);
        quoted.push('"');
        for ch in self.value.chars() {
            match ch {
                '\\' => quoted.push_str(r"\\"),
                '"' => quoted.push_str("\\\""),
                '\n' => quoted.push_str(r"\n"),
                _ => quoted.push(ch),
            }
        }
        quoted.push('"');
        quoted
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.label, self.operator(), self.quoted_value())
    }
}

/// A compiled role definition
///
/// Either full access, or a single label filter built from one or more
/// pattern elements. `raw_acl` holds the normalized elements joined with `", "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    full_access: bool,
    label_filter: LabelFilter,
    raw_acl: String,
}

impl Acl {
    /// The only representation of full access
    pub fn full_access() -> Self {
        Self {
            full_access: true,
            label_filter: LabelFilter::regex(FULL_ACCESS_ELEMENT),
            raw_acl: FULL_ACCESS_ELEMENT.to_string(),
        }
    }

    /// Compile a raw definition such as `"min.*, stolon"`.
    ///
    /// One literal element yields an exact match, anything else a regex
    /// alternation. A `.*` element anywhere makes the whole ACL full access,
    /// without looking at the other elements.
    pub fn compile(raw: &str) -> AclResult<Self> {
        let elements = parse_elements(raw)?;

        if has_full_access_element(&elements) {
            return Ok(Self::full_access());
        }

        let elements = normalize(elements);
        if elements.is_empty() {
            return Err(AclError::empty(raw));
        }

        // Stripping `^(.*)$` leaves the full access element behind
        if has_full_access_element(&elements) {
            return Ok(Self::full_access());
        }

        let label_filter = if elements.len() == 1 && !is_regex(&elements[0]) {
            LabelFilter::exact(elements[0].clone())
        } else {
            // Matchers are fully anchored upstream, so `a|b` means `^(?:a|b)$`
            LabelFilter::regex(elements.join("|"))
        };

        if label_filter.is_regexp {
            Regex::new(&label_filter.value).map_err(|source| AclError::InvalidRegex {
                value: label_filter.value.clone(),
                raw: raw.to_string(),
                source,
            })?;
        }

        Ok(Self {
            full_access: false,
            label_filter,
            raw_acl: elements.join(", "),
        })
    }

    pub fn is_full_access(&self) -> bool {
        self.full_access
    }

    pub fn label_filter(&self) -> &LabelFilter {
        &self.label_filter
    }

    pub fn raw_acl(&self) -> &str {
        &self.raw_acl
    }
}

#[cfg(test)]
impl Acl {
    /// Build an ACL without compiling it, including ones `compile` never yields
    pub(crate) fn from_parts(
        full_access: bool,
        label_filter: LabelFilter,
        raw_acl: impl Into<String>,
    ) -> Self {
        Self {
            full_access,
            label_filter,
            raw_acl: raw_acl.into(),
        }
    }
}

fn has_full_access_element(elements: &[String]) -> bool {
    elements.iter().any(|e| e == FULL_ACCESS_ELEMENT)
}
