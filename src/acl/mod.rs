//! Access control lists
//!
//! Converts declarative role definitions and the roles found in a verified
//! identity claim into one authorization decision: full access, or a label
//! filter restricting the `namespace` label.
//!
//! ## Definitions
//!
//! ```yaml
//! admin: .*                  # full access
//! team-a: foo.*, bar         # namespace=~"foo.*|bar"
//! team-b: default            # namespace="default"
//! ```
//!
//! - Elements are comma-separated; whitespace inside an element is an error
//! - `.*` anywhere makes the whole definition full access
//! - Anchors (`^`, `(`, `$`, `)`) are stripped, the backend anchors matchers itself
//!
//! ## Resolution
//!
//! A request carrying several roles gets the union of their definitions. With
//! assumed roles enabled, role names missing from the definitions are used as
//! patterns of their own.

pub mod patterns;
pub mod registry;
pub mod resolver;
pub mod types;

pub use patterns::{FULL_ACCESS_ELEMENT, parse_elements};
pub use registry::AclRegistry;
pub use resolver::{RoleResolver, resolve};
pub use types::{Acl, LabelFilter, NAMESPACE_LABEL};
