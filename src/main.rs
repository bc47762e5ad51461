//! Label Filter Gateway
//!
//! Enforces namespace ACLs on PromQL/MetricsQL queries in front of a metrics backend.

use clap::Parser;
use lfgw::{
    acl::{AclRegistry, RoleResolver},
    auth::create_verifier,
    config::{AppConfig, LogFormat, load_config},
    server::{AppState, run_server},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Label Filter Gateway - namespace ACLs for Prometheus-compatible APIs
#[derive(Parser, Debug)]
#[command(name = "lfgw")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LFGW_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LFGW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Path to the ACL definitions
    #[arg(long)]
    acl_path: Option<String>,
}

fn init_logging(config: &AppConfig, log_level: Option<&str>) {
    let level = log_level.unwrap_or_else(|| config.logging.effective_level());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging, which it configures
    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.acl_path {
        config.acl.path = path;
    }

    init_logging(&config, args.log_level.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream.url,
        safe_mode = config.proxy.safe_mode,
        assumed_roles = config.acl.assumed_roles,
        "Starting label filter gateway"
    );

    // Load ACL definitions
    let registry = Arc::new(
        AclRegistry::load(&config.acl.path)
            .inspect_err(|e| error!(error = %e, path = %config.acl.path, "Failed to load ACL"))?,
    );
    let resolver = RoleResolver::new(registry, config.acl.assumed_roles);

    // Create identity verifier
    let verifier = create_verifier(&config.oidc)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to initialize OIDC verifier"))?;
    info!(verifier = verifier.verifier_type(), "Identity verifier ready");

    let state = AppState::new(&config, resolver, verifier)
        .inspect_err(|e| error!(error = %e, "Failed to create upstream client"))?;

    run_server(&config.server, state)
        .await
        .inspect_err(|e| error!(error = %e, "Server error"))?;

    info!("Gateway stopped");
    Ok(())
}
