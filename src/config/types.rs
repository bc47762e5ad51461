//! Configuration types for lfgw
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Metrics backend the gateway forwards to
    pub upstream: UpstreamConfig,

    /// Identity provider
    pub oidc: OidcConfig,

    /// ACL definitions and resolution policy
    pub acl: AclConfig,

    /// Request filtering in front of the upstream
    pub proxy: ProxyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Time a request may take before it is answered with 408
    pub request_timeout_secs: u64,

    /// Time given to in-flight requests on shutdown
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            graceful_shutdown_timeout_secs: 20,
        }
    }
}

/// Upstream (Prometheus / VictoriaMetrics) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream, e.g. `http://victoria-metrics:8428`
    pub url: String,

    /// Timeout for a whole upstream request
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
        }
    }
}

/// OIDC provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Realm URL, used as the expected issuer (e.g. `https://sso/realms/monitoring`)
    pub realm_url: String,

    /// Expected token audience
    pub client_id: String,

    /// Timeout for discovery and JWKS requests
    pub discovery_timeout_secs: u64,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            realm_url: String::new(),
            client_id: String::new(),
            discovery_timeout_secs: 10,
        }
    }
}

/// ACL configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// YAML file with `role: pattern` definitions
    pub path: String,

    /// Treat unknown role names as namespace patterns
    pub assumed_roles: bool,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            path: "./acl.yaml".to_string(),
            assumed_roles: false,
        }
    }
}

/// Proxy behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Only allow GET/POST and block administrative endpoints
    pub safe_mode: bool,

    /// Set X-Forwarded-For/Proto/Host on upstream requests
    pub set_proxy_headers: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            set_proxy_headers: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,

    /// Log every proxied request
    pub log_requests: bool,

    /// Debug mode: implies `log_requests` and logs request parameters
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_requests: false,
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Effective log level, debug mode forcing `debug`
    pub fn effective_level(&self) -> &str {
        if self.debug { "debug" } else { &self.level }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
