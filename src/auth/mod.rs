//! Authentication module
//!
//! Verifies the caller's access token and extracts the roles used for ACL
//! resolution. Tokens are OIDC JWTs; the verifier sits behind a trait so
//! other verification schemes can be plugged in.

pub mod jwt;
pub mod token;
pub mod verifier;

pub use jwt::{JwtVerifier, VerificationKey};
pub use token::{AccessToken, extract_access_token};
pub use verifier::{Claims, IdentityVerifier, SharedVerifier};

use crate::config::OidcConfig;
use crate::error::AuthError;
use std::sync::Arc;
use std::time::Duration;

/// Create a verifier for the configured OIDC realm
pub async fn create_verifier(config: &OidcConfig) -> Result<SharedVerifier, AuthError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.discovery_timeout_secs))
        .user_agent(format!("lfgw/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuthError::Discovery(e.to_string()))?;

    let verifier = JwtVerifier::discover(&config.realm_url, &config.client_id, &http).await?;
    Ok(Arc::new(verifier))
}
