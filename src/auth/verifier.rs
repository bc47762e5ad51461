//! Identity verifier trait
//!
//! Verification of access tokens is pluggable so the HTTP layer can be
//! exercised without an identity provider.

use crate::auth::token::AccessToken;
use crate::error::AuthError;
// async_trait required for dyn-compatibility with Arc<dyn IdentityVerifier>
use async_trait::async_trait;
use serde::Deserialize;

/// Claims the gateway cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Role names, matched against the ACL definitions
    #[serde(default)]
    pub roles: Vec<String>,

    /// Caller email, for logging
    #[serde(default)]
    pub email: Option<String>,
}

/// Verifies access tokens and returns their claims
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Check signature, issuer, audience and expiry, then extract the claims
    async fn verify(&self, token: &AccessToken) -> Result<Claims, AuthError>;

    /// Short description of the verifier (for logging)
    fn verifier_type(&self) -> &'static str;
}

/// Shared verifier handle
pub type SharedVerifier = std::sync::Arc<dyn IdentityVerifier>;
