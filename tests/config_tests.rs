//! Configuration loading tests

use lfgw::config::{LogFormat, load_config, load_config_from_str};
use lfgw::error::ConfigError;
use serial_test::serial;
use std::io::Write;

const MINIMAL_CONFIG: &str = r#"
[upstream]
url = "http://victoria-metrics:8428"

[oidc]
realm_url = "https://sso.example.com/realms/monitoring"
client_id = "grafana"
"#;

const FULL_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 9000
graceful_shutdown_timeout_secs = 5

[upstream]
url = "http://vmselect:8481/select/0/prometheus"
timeout_secs = 30

[oidc]
realm_url = "https://sso.example.com/realms/monitoring"
client_id = "grafana"
discovery_timeout_secs = 3

[acl]
path = "/etc/lfgw/acl.yaml"
assumed_roles = true

[proxy]
safe_mode = false
set_proxy_headers = true

[logging]
level = "warn"
format = "json"
log_requests = true
"#;

/// Variables read by `load_config`, cleared around each env test
const ENV_VARS: &[&str] = &[
    "UPSTREAM_URL",
    "OIDC_REALM_URL",
    "OIDC_CLIENT_ID",
    "ACL_PATH",
    "ASSUMED_ROLES",
    "SAFE_MODE",
    "SET_PROXY_HEADERS",
    "DEBUG",
    "LOG_REQUESTS",
    "PORT",
    "LFGW_SERVER__PORT",
    "LFGW_ACL__PATH",
];

fn clear_env() {
    for var in ENV_VARS {
        // SAFETY: env tests are serialized
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(var: &str, value: &str) {
    // SAFETY: env tests are serialized
    unsafe { std::env::set_var(var, value) };
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_minimal_config() {
    let config = load_config_from_str(MINIMAL_CONFIG).unwrap();

    assert_eq!(config.upstream.url, "http://victoria-metrics:8428");
    assert_eq!(config.oidc.client_id, "grafana");

    // Defaults
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.acl.path, "./acl.yaml");
    assert!(!config.acl.assumed_roles);
    assert!(config.proxy.safe_mode);
    assert!(!config.proxy.set_proxy_headers);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_full_config() {
    let config = load_config_from_str(FULL_CONFIG).unwrap();

    // Server
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.graceful_shutdown_timeout_secs, 5);

    // Upstream
    assert_eq!(config.upstream.url, "http://vmselect:8481/select/0/prometheus");
    assert_eq!(config.upstream.timeout_secs, 30);

    // OIDC
    assert_eq!(config.oidc.discovery_timeout_secs, 3);

    // ACL
    assert_eq!(config.acl.path, "/etc/lfgw/acl.yaml");
    assert!(config.acl.assumed_roles);

    // Proxy
    assert!(!config.proxy.safe_mode);
    assert!(config.proxy.set_proxy_headers);

    // Logging
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.logging.log_requests);
    assert_eq!(config.logging.effective_level(), "warn");
}

#[test]
fn test_debug_forces_debug_level() {
    let toml = format!("{MINIMAL_CONFIG}\n[logging]\nlevel = \"warn\"\ndebug = true\n");
    let config = load_config_from_str(&toml).unwrap();
    assert_eq!(config.logging.effective_level(), "debug");
}

#[test]
fn test_invalid_realm_url() {
    let toml = MINIMAL_CONFIG.replace("https://sso.example.com", "sso.example.com");
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_invalid_toml() {
    assert!(matches!(
        load_config_from_str("[upstream\nurl = "),
        Err(ConfigError::Load(_))
    ));
}

#[test]
#[serial]
fn test_load_config_from_file() {
    clear_env();
    let file = config_file(FULL_CONFIG);

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.server.port, 9000);
    assert!(config.acl.assumed_roles);
}

#[test]
#[serial]
fn test_explicit_path_must_exist() {
    clear_env();
    assert!(matches!(
        load_config(Some("/nonexistent/lfgw.toml")),
        Err(ConfigError::Load(_))
    ));
}

#[test]
#[serial]
fn test_prefixed_env_overrides_file() {
    clear_env();
    let file = config_file(FULL_CONFIG);
    set_env("LFGW_SERVER__PORT", "9100");
    set_env("LFGW_ACL__PATH", "/tmp/acl.yaml");

    let config = load_config(file.path().to_str());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.acl.path, "/tmp/acl.yaml");
}

#[test]
#[serial]
fn test_bare_env_vars() {
    clear_env();
    let file = config_file(MINIMAL_CONFIG);
    set_env("UPSTREAM_URL", "http://prometheus:9090");
    set_env("OIDC_CLIENT_ID", "lfgw");
    set_env("ACL_PATH", "/srv/acl.yaml");
    set_env("ASSUMED_ROLES", "true");
    set_env("SAFE_MODE", "false");
    set_env("SET_PROXY_HEADERS", "true");
    set_env("LOG_REQUESTS", "true");
    set_env("PORT", "9091");

    let config = load_config(file.path().to_str());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.upstream.url, "http://prometheus:9090");
    assert_eq!(config.oidc.client_id, "lfgw");
    assert_eq!(config.acl.path, "/srv/acl.yaml");
    assert!(config.acl.assumed_roles);
    assert!(!config.proxy.safe_mode);
    assert!(config.proxy.set_proxy_headers);
    assert!(config.logging.log_requests);
    assert_eq!(config.server.port, 9091);
}

#[test]
#[serial]
fn test_bare_env_vars_win_over_prefixed() {
    clear_env();
    let file = config_file(MINIMAL_CONFIG);
    set_env("LFGW_SERVER__PORT", "9100");
    set_env("PORT", "9200");

    let config = load_config(file.path().to_str());
    clear_env();

    assert_eq!(config.unwrap().server.port, 9200);
}

#[test]
#[serial]
fn test_env_only_config() {
    clear_env();
    let file = config_file("");
    set_env("UPSTREAM_URL", "http://victoria-metrics:8428");
    set_env("OIDC_REALM_URL", "https://sso.example.com/realms/monitoring");
    set_env("OIDC_CLIENT_ID", "grafana");

    let config = load_config(file.path().to_str());
    clear_env();

    assert_eq!(config.unwrap().oidc.client_id, "grafana");
}

#[test]
#[serial]
fn test_missing_required_values() {
    clear_env();
    let file = config_file("");

    assert!(matches!(
        load_config(file.path().to_str()),
        Err(ConfigError::Missing { .. })
    ));
}
