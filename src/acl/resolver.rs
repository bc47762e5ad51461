//! Role resolution
//!
//! Turns the roles found in an identity claim into a single ACL:
//! 1. The first known role with full access wins outright
//! 2. Unknown roles are dropped, or used as literal patterns when assumed
//!    roles are enabled
//! 3. A single known role returns its precompiled ACL
//! 4. Anything else is joined into one definition and compiled again

use crate::acl::registry::AclRegistry;
use crate::acl::types::Acl;
use crate::error::{AclError, AclResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// A role contributing to a composite ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contribution<'a> {
    /// Present in the registry
    Known { role: &'a str, acl: &'a Acl },
    /// Unknown role name used as a pattern
    Assumed(&'a str),
}

impl<'a> Contribution<'a> {
    fn raw_acl(&self) -> AclResult<&'a str> {
        match *self {
            Contribution::Known { role, acl } => {
                if acl.raw_acl().is_empty() {
                    return Err(AclError::empty_role(role));
                }
                Ok(acl.raw_acl())
            }
            // Role names are not linted, so they may hold any regex, `.*` included
            Contribution::Assumed(role) => Ok(role),
        }
    }
}

/// Resolve claim roles against the registry.
///
/// Duplicate roles are ignored after their first occurrence.
pub fn resolve(roles: &[String], assumed_roles: bool, registry: &AclRegistry) -> AclResult<Acl> {
    let mut seen = HashSet::with_capacity(roles.len());
    let mut known = Vec::new();
    let mut assumed = Vec::new();

    for role in roles {
        if !seen.insert(role.as_str()) {
            continue;
        }

        match registry.get(role) {
            Some(acl) if acl.is_full_access() => {
                trace!(role = %role, "Role grants full access");
                return Ok(acl.clone());
            }
            Some(acl) => known.push(Contribution::Known { role, acl }),
            None => assumed.push(Contribution::Assumed(role)),
        }
    }

    if assumed_roles {
        known.extend(assumed);
    } else if !assumed.is_empty() {
        debug!(ignored = assumed.len(), "Ignoring roles missing from the ACL definitions");
    }
    let contributions = known;

    match contributions.as_slice() {
        [] => Err(AclError::NoMatchingRoles),
        [Contribution::Known { acl, .. }] => Ok((*acl).clone()),
        _ => {
            let raw = composite_raw_acl(&contributions)?;
            debug!(raw_acl = %raw, "Compiling composite ACL");
            Acl::compile(&raw)
        }
    }
}

/// Join the raw ACLs of all contributions as if they came from one definition
fn composite_raw_acl(contributions: &[Contribution<'_>]) -> AclResult<String> {
    let parts = contributions
        .iter()
        .map(Contribution::raw_acl)
        .collect::<AclResult<Vec<_>>>()?;

    let raw = parts.join(", ");
    if raw.is_empty() {
        return Err(AclError::empty_composite());
    }

    Ok(raw)
}

/// Resolver bound to the process-wide registry and assumed-roles policy
#[derive(Debug, Clone)]
pub struct RoleResolver {
    registry: Arc<AclRegistry>,
    assumed_roles: bool,
}

impl RoleResolver {
    pub fn new(registry: Arc<AclRegistry>, assumed_roles: bool) -> Self {
        Self {
            registry,
            assumed_roles,
        }
    }

    /// Resolve the roles of one request
    pub fn resolve(&self, roles: &[String]) -> AclResult<Acl> {
        resolve(roles, self.assumed_roles, &self.registry)
    }

    pub fn registry(&self) -> &AclRegistry {
        &self.registry
    }

    pub fn assumed_roles(&self) -> bool {
        self.assumed_roles
    }
}
