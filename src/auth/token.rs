//! Bearer token extraction
//!
//! Pulls the raw access token out of request headers.

use crate::error::AuthError;
use axum::http::{HeaderMap, header};
use std::fmt;

/// Header set by OAuth2 proxies in front of the gateway
pub const FORWARDED_TOKEN_HEADER: &str = "x-forwarded-access-token";

/// A raw access token
///
/// `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token itself, for verification only
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Find the access token of a request.
///
/// `Authorization: Bearer <token>` wins over `X-Forwarded-Access-Token`.
pub fn extract_access_token(headers: &HeaderMap) -> Result<AccessToken, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidToken("authorization header is not ASCII".into()))?;

        return match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
                non_empty(token.trim())
            }
            _ => Err(AuthError::InvalidToken(
                "authorization header must use the Bearer scheme".into(),
            )),
        };
    }

    if let Some(value) = headers.get(FORWARDED_TOKEN_HEADER) {
        let value = value.to_str().map_err(|_| {
            AuthError::InvalidToken("forwarded access token header is not ASCII".into())
        })?;
        return non_empty(value.trim());
    }

    Err(AuthError::MissingToken)
}

fn non_empty(token: &str) -> Result<AccessToken, AuthError> {
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(AccessToken::new(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_bearer_token() {
        let token = extract_access_token(&headers(&[("authorization", "Bearer abc.def")])).unwrap();
        assert_eq!(token.expose_secret(), "abc.def");

        let token = extract_access_token(&headers(&[("authorization", "bearer abc")])).unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }

    #[test]
    fn test_forwarded_token() {
        let token =
            extract_access_token(&headers(&[("x-forwarded-access-token", "xyz")])).unwrap();
        assert_eq!(token.expose_secret(), "xyz");
    }

    #[test]
    fn test_authorization_wins() {
        let token = extract_access_token(&headers(&[
            ("authorization", "Bearer first"),
            ("x-forwarded-access-token", "second"),
        ]))
        .unwrap();
        assert_eq!(token.expose_secret(), "first");
    }

    #[test]
    fn test_missing_token() {
        assert!(matches!(
            extract_access_token(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            extract_access_token(&headers(&[("authorization", "Bearer  ")])),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_basic_auth_rejected() {
        assert!(matches!(
            extract_access_token(&headers(&[("authorization", "Basic dXNlcjpwYXNz")])),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_redacted() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
        assert_eq!(token.to_string(), "[REDACTED]");
    }
}
