//! Shared state for request handlers

use crate::acl::RoleResolver;
use crate::auth::SharedVerifier;
use crate::config::{AppConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::server::metrics::GatewayMetrics;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// State cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub resolver: RoleResolver,
    pub verifier: SharedVerifier,
    /// Base URL requests are forwarded to
    pub upstream: Url,
    /// Client used for upstream requests
    pub http: Client,
    pub proxy: ProxyConfig,
    /// Log rewritten parameters at debug level
    pub debug: bool,
    /// Emit access logs
    pub log_requests: bool,
    /// Upper bound for handling one request
    pub request_timeout: Duration,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        resolver: RoleResolver,
        verifier: SharedVerifier,
    ) -> Result<Self, ProxyError> {
        let upstream = Url::parse(&config.upstream.url)
            .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", config.upstream.url, e)))?;

        if upstream.cannot_be_a_base() {
            return Err(ProxyError::InvalidUrl(config.upstream.url.clone()));
        }

        // Redirects are passed back to the caller rather than followed
        let http = Client::builder()
            .timeout(Duration::from_secs(config.upstream.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            resolver,
            verifier,
            upstream,
            http,
            proxy: config.proxy.clone(),
            debug: config.logging.debug,
            log_requests: config.logging.log_requests || config.logging.debug,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            metrics: Arc::new(GatewayMetrics::new()),
        })
    }
}
