//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Well-known bare environment variables (UPSTREAM_URL, OIDC_REALM_URL, ...)
//! 2. Environment variables (LFGW_*)
//! 3. Configuration file (TOML)
//! 4. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "lfgw.toml",
    ".lfgw.toml",
    "~/.config/lfgw/config.toml",
    "/etc/lfgw/config.toml",
];

/// Bare environment variables and the keys they override
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("UPSTREAM_URL", "upstream.url"),
    ("OIDC_REALM_URL", "oidc.realm_url"),
    ("OIDC_CLIENT_ID", "oidc.client_id"),
    ("ACL_PATH", "acl.path"),
    ("ASSUMED_ROLES", "acl.assumed_roles"),
    ("SAFE_MODE", "proxy.safe_mode"),
    ("SET_PROXY_HEADERS", "proxy.set_proxy_headers"),
    ("DEBUG", "logging.debug"),
    ("LOG_REQUESTS", "logging.log_requests"),
    ("PORT", "server.port"),
];

/// Load configuration from a TOML string (useful for testing)
///
/// Environment variables are not consulted.
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. Start with defaults (handled by serde defaults on AppConfig)

    // 2. Add configuration file
    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // 3. Add environment variables with LFGW_ prefix
    // e.g., LFGW_UPSTREAM__URL, LFGW_SERVER__PORT
    // Double underscore (__) maps to nested keys (upstream.url)
    builder = builder.add_source(
        Environment::with_prefix("LFGW")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. Bare variables kept for compatibility with existing deployments
    builder = apply_env_overrides(builder)?;

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn apply_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (env_var, key) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(env_var)
            && !value.is_empty()
        {
            builder = builder
                .set_override(*key, value)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
        }
    }
    Ok(builder)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_url(&config.upstream.url, "upstream.url")?;
    validate_url(&config.oidc.realm_url, "oidc.realm_url")?;

    if config.oidc.client_id.is_empty() {
        return Err(ConfigError::Missing {
            field: "oidc.client_id".to_string(),
        });
    }

    if config.acl.path.is_empty() {
        return Err(ConfigError::Missing {
            field: "acl.path".to_string(),
        });
    }

    if config.upstream.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "upstream.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.oidc.discovery_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "oidc.discovery_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.server.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "server.request_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::Missing {
            field: field.to_string(),
        });
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!("{} must start with http:// or https://, got: {}", field, url),
        });
    }

    url::Url::parse(url).map_err(|e| ConfigError::Invalid {
        message: format!("{} is not a valid URL: {}", field, e),
    })?;

    Ok(())
}
