//! JWT verification against an OIDC provider
//!
//! Keys are taken from the provider's JWKS, located through OIDC discovery.
//! Tokens must be signed by one of them, issued by the realm and addressed to
//! the configured client.

use crate::auth::token::AccessToken;
use crate::auth::verifier::{Claims, IdentityVerifier};
use crate::error::AuthError;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Path of the discovery document, relative to the realm URL
const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The parts of the discovery document we use
#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    jwks_uri: String,
}

/// A key the provider signs with
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
}

impl VerificationKey {
    pub fn new(kid: Option<String>, key: DecodingKey) -> Self {
        Self { kid, key }
    }
}

/// Verifies JWT access tokens
pub struct JwtVerifier {
    issuer: String,
    client_id: String,
    keys: Vec<VerificationKey>,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl JwtVerifier {
    /// Create a verifier from known keys
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        keys: Vec<VerificationKey>,
    ) -> Result<Self, AuthError> {
        if keys.is_empty() {
            return Err(AuthError::Discovery("no usable verification keys".into()));
        }

        Ok(Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            keys,
        })
    }

    /// Create a verifier from a JWK set, skipping keys that cannot verify signatures
    pub fn from_jwks(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        jwks: &JwkSet,
    ) -> Result<Self, AuthError> {
        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some(VerificationKey::new(jwk.common.key_id.clone(), key)),
                Err(e) => {
                    warn!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                    None
                }
            })
            .collect();

        Self::new(issuer, client_id, keys)
    }

    /// Locate the realm's JWKS through OIDC discovery and build a verifier
    #[instrument(skip(http))]
    pub async fn discover(
        realm_url: &str,
        client_id: &str,
        http: &Client,
    ) -> Result<Self, AuthError> {
        let realm_url = realm_url.trim_end_matches('/');
        let discovery_url = format!("{}{}", realm_url, DISCOVERY_PATH);

        let metadata: ProviderMetadata = fetch_json(http, &discovery_url).await?;
        if metadata.issuer.trim_end_matches('/') != realm_url {
            return Err(AuthError::Discovery(format!(
                "issuer did not match the realm URL, expected {:?} got {:?}",
                realm_url, metadata.issuer
            )));
        }

        let jwks: JwkSet = fetch_json(http, &metadata.jwks_uri).await?;
        info!(
            issuer = %metadata.issuer,
            keys = jwks.keys.len(),
            "Fetched OIDC signing keys"
        );

        Self::from_jwks(metadata.issuer, client_id, &jwks)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Keys that may have signed a token with the given key id
    fn candidate_keys<'a>(
        &'a self,
        kid: Option<&'a str>,
    ) -> impl Iterator<Item = &'a VerificationKey> + 'a {
        self.keys
            .iter()
            .filter(move |k| kid.is_none() || k.kid.is_none() || k.kid.as_deref() == kid)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &AccessToken) -> Result<Claims, AuthError> {
        let raw = token.expose_secret();
        let header = decode_header(raw)?;

        // The key family has to match the algorithm, so a symmetric `alg`
        // cannot be used against a public key.
        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);

        let mut last_error = None;
        for candidate in self.candidate_keys(header.kid.as_deref()) {
            match decode::<Claims>(raw, &candidate.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    debug!(kid = ?candidate.kid, error = %e, "Key did not verify token");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map_or_else(
            || AuthError::InvalidToken(format!("no key matches kid {:?}", header.kid)),
            AuthError::from,
        ))
    }

    fn verifier_type(&self) -> &'static str {
        "OIDC JWT"
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &Client,
    url: &str,
) -> Result<T, AuthError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| AuthError::Discovery(format!("GET {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Discovery(format!("GET {}: HTTP {}", url, status)));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("GET {}: {}", url, e)))
}
