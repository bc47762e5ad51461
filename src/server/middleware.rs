//! Request middleware
//!
//! Applied to every proxied request, outermost first:
//! 1. `count_requests` - gateway request counter
//! 2. `canonical_path` - rejects paths the upstream would resolve differently
//! 3. `safe_mode` - method and path restrictions
//! 4. `proxy_headers` - `X-Forwarded-*` headers
//! 5. `authorize` - token verification and ACL resolution
//! 6. `rewrite` - label filter injection into query parameters

use crate::acl::Acl;
use crate::auth::extract_access_token;
use crate::error::{AppError, RewriteError};
use crate::query::{LabelInjector, has_match_param, requires_match, rewrite_encoded, unescaped};
use crate::server::response::error_response;
use crate::server::state::AppState;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::{debug, error, warn};

/// Largest form body accepted for rewriting
const MAX_FORM_BYTES: usize = 10 * 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Path fragments of endpoints that modify or administer the upstream
const UNSAFE_PATH_FRAGMENTS: &[&str] = &[
    "/admin/tsdb",
    "/api/v1/admin",
    "/delete_series",
    "/api/v1/write",
    "/api/v1/import",
    "/write",
    "/snapshot",
    "/internal/resetRollupResultCache",
    "/internal/force_merge",
    "/internal/force_flush",
];

/// Whether a path belongs to the query API, under any prefix
pub fn is_api_request(path: &str) -> bool {
    path.contains("/api/v1/") || path.contains("/federate")
}

/// Whether a path is already in the form the upstream URL will carry.
///
/// Dot segments, empty segments and escapes would be resolved when the
/// upstream URL is built, after the path has been classified.
pub fn is_canonical_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains(['%', '\\']) {
        return false;
    }

    let mut segments = path[1..].split('/').peekable();
    while let Some(segment) = segments.next() {
        if segment == "." || segment == ".." {
            return false;
        }
        // Only a trailing slash may leave an empty segment
        if segment.is_empty() && segments.peek().is_some() {
            return false;
        }
    }
    true
}

/// Whether a path reaches an endpoint blocked in safe mode
pub fn is_unsafe_path(path: &str) -> bool {
    UNSAFE_PATH_FRAGMENTS.iter().any(|f| path.contains(f))
}

pub async fn count_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.record_request();
    next.run(request).await
}

/// Reject paths that are not canonical before anything classifies them
pub async fn canonical_path(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !is_canonical_path(path) {
        state.metrics.record_denied();
        warn!(path = %path, "Rejected a non-canonical path");
        return error_response(StatusCode::BAD_REQUEST, "bad_data");
    }

    next.run(request).await
}

/// Only allow reading methods and endpoints
pub async fn safe_mode(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.proxy.safe_mode {
        return next.run(request).await;
    }

    if request.method() != Method::GET && request.method() != Method::POST {
        state.metrics.record_denied();
        debug!(method = %request.method(), "Blocked a request with an unsafe method");
        let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed");
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
        return response;
    }

    let path = request.uri().path();
    if is_unsafe_path(path) {
        state.metrics.record_denied();
        warn!(path = %path, "Blocked a request to an unsafe path");
        return error_response(StatusCode::FORBIDDEN, "forbidden");
    }

    next.run(request).await
}

pub async fn proxy_headers(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.proxy.set_proxy_headers {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let scheme = request.uri().scheme_str().unwrap_or("http").to_string();
        let headers = request.headers_mut();

        if let Some(value) = peer.and_then(|ip| HeaderValue::from_str(&ip).ok()) {
            headers.insert("x-forwarded-for", value);
        }
        if let Ok(value) = HeaderValue::from_str(&scheme) {
            headers.insert("x-forwarded-proto", value);
        }
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert("x-forwarded-host", host);
        }
    }

    next.run(request).await
}

/// Verify the caller and attach the ACL for their roles to the request
pub async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_acl(&state, request.headers()).await {
        Ok(acl) => {
            state.metrics.record_authorized();
            request.extensions_mut().insert(acl);
            next.run(request).await
        }
        Err(e) => {
            state.metrics.record_denied();
            warn!(error = %e, "Request not authorized");
            e.into_response()
        }
    }
}

async fn resolve_acl(state: &AppState, headers: &HeaderMap) -> Result<Acl, AppError> {
    let token = extract_access_token(headers)?;
    let claims = state.verifier.verify(&token).await?;

    // All roles of the token, not only those that contribute to the ACL
    debug!(
        email = claims.email.as_deref().unwrap_or_default(),
        roles = %claims.roles.join(", "),
        "Verified access token"
    );

    let acl = state.resolver.resolve(&claims.roles)?;
    debug!(label_filter = %acl.label_filter(), full_access = acl.is_full_access(), "Resolved ACL");

    Ok(acl)
}

/// Enforce the request's ACL on its query parameters
pub async fn rewrite(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !is_api_request(request.uri().path()) {
        debug!("Not an API request, request is not modified");
        return next.run(request).await;
    }

    let Some(acl) = request.extensions().get::<Acl>().cloned() else {
        error!(path = %request.uri().path(), "ACL is not set on the request");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal");
    };

    if acl.is_full_access() {
        state.metrics.record_full_access();
        debug!("User has full access, request is not modified");
        return next.run(request).await;
    }

    match rewrite_request(request, &acl, state.debug).await {
        Ok(request) => {
            state.metrics.record_rewritten();
            next.run(request).await
        }
        Err(e) => {
            state.metrics.record_rewrite_failure();
            warn!(error = %e, "Failed to rewrite request");
            AppError::from(e).into_response()
        }
    }
}

/// Rewrite the query string and, for POST, the form body
async fn rewrite_request(
    request: Request,
    acl: &Acl,
    debug: bool,
) -> Result<Request, RewriteError> {
    let injector = LabelInjector::new(acl.label_filter().clone());
    let (mut parts, body) = request.into_parts();

    let path = parts.uri.path().to_string();
    let is_post = parts.method == Method::POST;
    let is_form = is_post && has_form_content_type(&parts.headers);

    let (form, body) = if is_form {
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|e| RewriteError::Form(e.to_string()))?;
        let form =
            String::from_utf8(bytes.to_vec()).map_err(|e| RewriteError::Form(e.to_string()))?;
        (Some(form), Body::empty())
    } else {
        (None, body)
    };

    let query = parts.uri.query().unwrap_or_default();
    let query_has_match = has_match_param(query);

    // A missing match[] goes into the form body when there is one
    let require_match = requires_match(&path);
    let new_query = rewrite_encoded(query, &injector, require_match && !is_form)?;
    if debug {
        debug!(new_get_params = %unescaped(&new_query), "Rewrote query string");
    }
    parts.uri = with_query(&path, &new_query)?;

    let body = match form {
        Some(form) => {
            let new_form =
                rewrite_encoded(&form, &injector, require_match && !query_has_match)?;
            if debug {
                debug!(new_post_params = %unescaped(&new_form), "Rewrote form body");
            }
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(new_form.len()));
            Body::from(new_form)
        }
        // Parameters are only read from form bodies, so nothing else reaches the upstream
        None if is_post => {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            Body::empty()
        }
        None => body,
    };

    Ok(Request::from_parts(parts, body))
}

fn has_form_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with(FORM_CONTENT_TYPE))
}

fn with_query(path: &str, query: &str) -> Result<Uri, RewriteError> {
    let path_and_query = if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    };

    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| RewriteError::Form(e.to_string()))
}
