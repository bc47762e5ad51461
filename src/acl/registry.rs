//! ACL registry
//!
//! Maps role names to compiled ACLs. Built once at startup and read-only
//! afterwards.

use crate::acl::types::Acl;
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Role name to ACL mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclRegistry {
    acls: HashMap<String, Acl>,
}

impl AclRegistry {
    /// Compile every `role -> raw pattern` definition.
    ///
    /// Fails on the first definition that does not compile; no partial
    /// registry is ever returned.
    pub fn from_definitions<I, K, V>(definitions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut acls = HashMap::new();

        for (role, raw) in definitions {
            let role = role.into();
            let acl = Acl::compile(raw.as_ref()).map_err(|source| ConfigError::AclEntry {
                role: role.clone(),
                source,
            })?;
            debug!(
                role = %role,
                raw_acl = acl.raw_acl(),
                full_access = acl.is_full_access(),
                "Compiled ACL"
            );
            acls.insert(role, acl);
        }

        Ok(Self { acls })
    }

    /// Parse a YAML document with a flat `role: pattern` mapping
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // Sorted so that the reported error does not depend on hash order
        let definitions: BTreeMap<String, String> =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::from_definitions(definitions)
    }

    /// Load the registry from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("cannot read ACL file {}: {}", path.display(), e))
        })?;

        let registry = Self::from_yaml_str(&yaml)?;
        info!(path = %path.display(), roles = registry.len(), "Loaded ACL definitions");

        Ok(registry)
    }

    pub fn get(&self, role: &str) -> Option<&Acl> {
        self.acls.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.acls.contains_key(role)
    }

    pub fn len(&self) -> usize {
        self.acls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acls.is_empty()
    }

    /// Known role names, sorted
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.acls.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }
}

#[cfg(test)]
impl AclRegistry {
    /// Registry with prebuilt ACLs, bypassing compilation
    pub(crate) fn from_acls(acls: impl IntoIterator<Item = (String, Acl)>) -> Self {
        Self {
            acls: acls.into_iter().collect(),
        }
    }
}
