//! Query rewriting
//!
//! Enforces an ACL on PromQL/MetricsQL requests by adding its label filter to
//! every series selector:
//!
//! ```text
//! rate(http_requests_total{code="500"}[5m])
//!   => rate(http_requests_total{code="500", namespace=~"min.*|stolon"}[5m])
//! ```
//!
//! Queries that cannot be parsed are rejected rather than forwarded.

pub mod injector;
pub mod lexer;
pub mod params;

pub use injector::{LabelInjector, inject};
pub use params::{QUERY_PARAMS, has_match_param, requires_match, rewrite_encoded, unescaped};
