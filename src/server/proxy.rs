//! Upstream forwarding
//!
//! Sends the (possibly rewritten) request to the upstream and streams the
//! response back.

use crate::error::ProxyError;
use crate::server::response::error_response;
use crate::server::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{trace, warn};
use url::Url;

/// Headers that only apply to a single connection
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler forwarding everything to the upstream
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    match send_upstream(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            state.metrics.record_upstream_error();
            warn!(error = %e, "Upstream request failed");
            error_response(StatusCode::BAD_GATEWAY, "unavailable")
        }
    }
}

async fn send_upstream(state: &AppState, request: Request) -> Result<Response, ProxyError> {
    let (mut parts, body) = request.into_parts();
    let url = upstream_url(&state.upstream, &parts.uri);

    strip_hop_by_hop(&mut parts.headers);
    // Set by the client from the upstream URL
    parts.headers.remove(header::HOST);

    trace!(method = %parts.method, url = %url, "Forwarding request");

    let upstream_response = state
        .http
        .request(parts.method, url)
        .headers(parts.headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let stream = upstream_response
        .bytes_stream()
        .inspect_err(|e| warn!(error = %e, "Upstream response body failed"));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(response)
}

/// Upstream URL for a request, keeping any base path of the upstream
pub fn upstream_url(base: &Url, uri: &Uri) -> Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), uri.path());
    url.set_path(&path);
    url.set_query(uri.query());
    url
}

/// Remove hop-by-hop headers, including those named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}
