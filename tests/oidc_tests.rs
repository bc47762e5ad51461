//! OIDC discovery and token verification tests
//!
//! wiremock serves the discovery document and JWKS of a test realm signing
//! with a symmetric key.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use lfgw::auth::{AccessToken, IdentityVerifier, JwtVerifier, create_verifier};
use lfgw::config::OidcConfig;
use lfgw::error::AuthError;
use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &[u8] = b"lfgw-test-secret-0123456789abcdef";
/// `SECRET`, base64url encoded
const SECRET_B64: &str = "bGZndy10ZXN0LXNlY3JldC0wMTIzNDU2Nzg5YWJjZGVm";
const REALM_PATH: &str = "/realms/monitoring";
const CLIENT_ID: &str = "grafana";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Start a provider whose discovery document reports `issuer`
async fn provider(issuer: Option<&str>) -> MockServer {
    let server = MockServer::start().await;
    let realm = format!("{}{}", server.uri(), REALM_PATH);

    Mock::given(method("GET"))
        .and(path(format!("{REALM_PATH}/.well-known/openid-configuration")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer.unwrap_or(&realm),
            "jwks_uri": format!("{realm}/protocol/openid-connect/certs"),
            "authorization_endpoint": format!("{realm}/protocol/openid-connect/auth"),
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{REALM_PATH}/protocol/openid-connect/certs")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "oct",
                "kid": "test-key",
                "alg": "HS256",
                "use": "sig",
                "k": SECRET_B64,
            }]
        })))
        .mount(&server)
        .await;

    server
}

fn realm_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), REALM_PATH)
}

fn mint(claims: Value) -> AccessToken {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test-key".into());
    AccessToken::new(encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap())
}

fn claims_for(issuer: &str) -> Value {
    json!({
        "iss": issuer,
        "aud": CLIENT_ID,
        "exp": now() + 300,
        "email": "ops@example.com",
        "roles": ["team-storage", "offline_access"],
    })
}

#[tokio::test]
async fn test_discovered_verifier_accepts_realm_tokens() {
    let server = provider(None).await;
    let realm = realm_url(&server);

    let verifier = JwtVerifier::discover(&realm, CLIENT_ID, &reqwest::Client::new())
        .await
        .unwrap();
    assert_eq!(verifier.issuer(), realm);

    let claims = verifier.verify(&mint(claims_for(&realm))).await.unwrap();
    assert_eq!(claims.roles, vec!["team-storage", "offline_access"]);
    assert_eq!(claims.email.as_deref(), Some("ops@example.com"));
}

#[tokio::test]
async fn test_create_verifier_from_config() {
    let server = provider(None).await;
    let config = OidcConfig {
        realm_url: format!("{}/", realm_url(&server)),
        client_id: CLIENT_ID.to_string(),
        discovery_timeout_secs: 5,
    };

    let verifier = create_verifier(&config).await.unwrap();
    assert_eq!(verifier.verifier_type(), "OIDC JWT");

    let realm = realm_url(&server);
    assert!(verifier.verify(&mint(claims_for(&realm))).await.is_ok());

    let mut foreign = claims_for(&realm);
    foreign["aud"] = json!("another-client");
    assert!(matches!(
        verifier.verify(&mint(foreign)).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_issuer_mismatch_rejected() {
    let server = provider(Some("https://elsewhere.example.com/realms/monitoring")).await;

    let result =
        JwtVerifier::discover(&realm_url(&server), CLIENT_ID, &reqwest::Client::new()).await;
    assert!(matches!(result, Err(AuthError::Discovery(_))));
}

#[tokio::test]
async fn test_missing_discovery_document() {
    let server = MockServer::start().await;

    let result =
        JwtVerifier::discover(&realm_url(&server), CLIENT_ID, &reqwest::Client::new()).await;
    assert!(matches!(result, Err(AuthError::Discovery(_))));
}
