//! Request parameter rewriting
//!
//! Applies label injection to the query-language parameters of a
//! URL-encoded query string or form body.

use crate::error::RewriteError;
use crate::query::injector::LabelInjector;
use url::form_urlencoded;

/// Parameters holding a query expression
pub const QUERY_PARAMS: &[&str] = &["query", "match[]"];

/// Parameter holding series selectors
pub const MATCH_PARAM: &str = "match[]";

/// Endpoints that select series through `match[]` and return everything without it
const MATCH_ENDPOINTS: &[&str] = &["/api/v1/series", "/api/v1/labels", "/api/v1/label/"];

/// Whether requests to `path` must carry at least one `match[]` selector
pub fn requires_match(path: &str) -> bool {
    MATCH_ENDPOINTS.iter().any(|p| path.contains(p))
}

/// Rewrite every query parameter of an encoded `a=b&c=d` string.
///
/// With `require_match`, a `match[]` selecting only the permitted series is
/// added when the caller sent none. Other parameters are kept in order.
pub fn rewrite_encoded(
    encoded: &str,
    injector: &LabelInjector,
    require_match: bool,
) -> Result<String, RewriteError> {
    let mut pairs = Vec::new();
    let mut has_match = false;

    for (key, value) in form_urlencoded::parse(encoded.as_bytes()) {
        let value = if QUERY_PARAMS.contains(&&*key) {
            has_match |= key == MATCH_PARAM;
            injector.inject(&value)?
        } else {
            value.into_owned()
        };
        pairs.push((key.into_owned(), value));
    }

    if require_match && !has_match {
        pairs.push((MATCH_PARAM.to_string(), format!("{{{}}}", injector.filter())));
    }

    Ok(form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish())
}

/// Whether an encoded `a=b&c=d` string carries a `match[]` parameter
pub fn has_match_param(encoded: &str) -> bool {
    form_urlencoded::parse(encoded.as_bytes()).any(|(key, _)| key == MATCH_PARAM)
}

/// URL-decoded form of an encoded string, for logging
pub fn unescaped(encoded: &str) -> String {
    let spaced = encoded.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
