//! Error types for lfgw
//!
//! This module defines the error hierarchy used throughout the gateway.
//! We use `thiserror` for library-style errors that are part of the API,
//! and convert to HTTP responses at the request boundary.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Query rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

/// Errors produced while compiling or resolving ACLs
#[derive(Error, Debug)]
pub enum AclError {
    #[error("line should not contain spaces within individual elements ({raw:?})")]
    MalformedPattern { raw: String },

    #[error("line has to contain at least one valid element ({raw:?})")]
    EmptyPattern { raw: String },

    #[error("{source} in {value:?} (converted from {raw:?})")]
    InvalidRegex {
        value: String,
        raw: String,
        #[source]
        source: regex::Error,
    },

    #[error("no matching roles found")]
    NoMatchingRoles,

    #[error("{0}")]
    EmptyComposite(String),
}

impl AclError {
    pub fn malformed(raw: impl Into<String>) -> Self {
        Self::MalformedPattern { raw: raw.into() }
    }

    pub fn empty(raw: impl Into<String>) -> Self {
        Self::EmptyPattern { raw: raw.into() }
    }

    /// The role carries an empty raw ACL, which the registry never produces
    pub fn empty_role(role: impl Into<String>) -> Self {
        Self::EmptyComposite(format!("{} role contains empty rawACL", role.into()))
    }

    /// Joining the role contributions produced nothing
    pub fn empty_composite() -> Self {
        Self::EmptyComposite("constructed empty rawACL".to_string())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid ACL for role '{role}': {source}")]
    AclEntry {
        role: String,
        #[source]
        source: AclError,
    },
}

/// Identity verification errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no bearer token found in the request")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("failed to extract claims: {0}")]
    Claims(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(e.to_string())
    }
}

/// Query rewriting errors
///
/// Any of these means the request must not reach the upstream.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RewriteError {
    #[error("cannot tokenize query at byte {offset}: {reason}")]
    Lex { offset: usize, reason: String },

    #[error("cannot parse query at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },

    #[error("cannot decode request form: {0}")]
    Form(String),
}

impl RewriteError {
    pub fn lex(offset: usize, reason: impl Into<String>) -> Self {
        Self::Lex {
            offset,
            reason: reason.into(),
        }
    }

    pub fn syntax(offset: usize, reason: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            reason: reason.into(),
        }
    }
}

/// Upstream proxy errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for ACL operations
pub type AclResult<T> = std::result::Result<T, AclError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_regex_mentions_value_and_raw() {
        let source = regex::Regex::new("[").unwrap_err();
        let err = AclError::InvalidRegex {
            value: "[".into(),
            raw: " [ ".into(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains(r#"in "[""#));
        assert!(msg.contains(r#"converted from " [ ""#));
    }

    #[test]
    fn test_acl_entry_names_role() {
        let err = ConfigError::AclEntry {
            role: "team-a".into(),
            source: AclError::malformed("a b"),
        };
        assert!(err.to_string().contains("team-a"));
        assert!(err.to_string().contains("spaces"));
    }

    #[test]
    fn test_empty_composite_constructors() {
        assert!(AclError::empty_role("dev").to_string().contains("dev role"));
        assert!(
            AclError::empty_composite()
                .to_string()
                .contains("constructed empty")
        );
    }
}
