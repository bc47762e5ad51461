//! Gateway HTTP server
//!
//! Serves `/healthz` and `/metrics` directly and forwards everything else to
//! the upstream through the middleware chain in [`middleware`].

pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod response;
pub mod state;

pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use state::AppState;

use crate::config::ServerConfig;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, info, info_span, warn};

/// Header carrying the request ID, kept when the caller already set one
pub const REQUEST_ID_HEADER: &str = "request-id";

/// Build the gateway router
pub fn build_router(state: AppState) -> Router {
    // Layers run outermost last-added first
    let gateway = Router::new()
        .fallback(proxy::forward)
        .layer(from_fn_with_state(state.clone(), middleware::rewrite))
        .layer(from_fn_with_state(state.clone(), middleware::authorize))
        .layer(from_fn_with_state(state.clone(), middleware::proxy_headers))
        .layer(from_fn_with_state(state.clone(), middleware::safe_mode))
        .layer(from_fn_with_state(state.clone(), middleware::canonical_path))
        .layer(from_fn_with_state(state.clone(), middleware::count_requests))
        .with_state(state.clone());

    let log_requests = state.log_requests;
    let request_timeout = state.request_timeout;

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .with_state(state)
        .merge(gateway)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )));

    if log_requests {
        app = app.layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );
    }

    app.layer(SetRequestIdLayer::new(
        HeaderName::from_static(REQUEST_ID_HEADER),
        MakeRequestUuid,
    ))
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        req_id = request_id,
    )
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

/// Bind the configured address and serve until Ctrl+C or SIGTERM
pub async fn run_server(config: &ServerConfig, state: AppState) -> io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal.cancel();
    });

    serve(
        listener,
        state,
        shutdown,
        Duration::from_secs(config.graceful_shutdown_timeout_secs),
    )
    .await
}

/// Serve on an existing listener until `shutdown` is cancelled.
///
/// In-flight requests get `grace` to complete before the server returns.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
    grace: Duration,
) -> io::Result<()> {
    let app = build_router(state);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => return joined.map_err(io::Error::other)?,
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined.map_err(io::Error::other)?,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
