//! Label Filter Gateway
//!
//! An OIDC-aware reverse proxy for Prometheus-compatible metrics backends
//! (VictoriaMetrics, Prometheus). Each caller's token roles are resolved to
//! an ACL, and the ACL's namespace filter is injected into every PromQL /
//! MetricsQL query before it is forwarded.
//!
//! ## Access Control Model
//!
//! ```text
//! token roles → ACL registry → resolved ACL → namespace label filter
//! ```
//!
//! - A role mapped to `.*` grants full access; queries pass unmodified
//! - Other roles contribute namespaces (exact or regex), combined by union
//! - With assumed roles enabled, unknown role names are used as namespaces
//!
//! ## Example ACL file
//!
//! ```yaml
//! admin: ".*"
//! team-storage: "minio, stolon"
//! team-kube: "kube.*"
//! ```
//!
//! ## Example Configuration
//!
//! ```toml
//! [upstream]
//! url = "http://victoria-metrics:8428"
//!
//! [oidc]
//! realm_url = "https://sso.example.com/realms/monitoring"
//! client_id = "grafana"
//!
//! [acl]
//! path = "/etc/lfgw/acl.yaml"
//! assumed_roles = false
//! ```

pub mod acl;
pub mod auth;
pub mod config;
pub mod error;
pub mod query;
pub mod server;

// Re-export main types
pub use acl::{Acl, AclRegistry, LabelFilter, RoleResolver};
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use server::{AppState, GatewayMetrics, build_router, run_server};
