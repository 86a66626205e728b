//! Data models of the provider: token claims, wire requests and responses,
//! and the records storage keeps for clients, authorization requests, and
//! issued tokens.

use crate::config::OpConfig;
use crate::endpoints::EndpointSet;
use crate::headers::presets;
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Signature algorithms the provider advertises for ID tokens.
pub const SUPPORTED_SIGNING_ALGS: [&str; 1] = ["RS256"];

/// Grant type URN of the JWT bearer profile (RFC 7523).
pub const GRANT_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Generate a random identifier with a readable prefix
pub(crate) fn random_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}

/// Split a space-separated scope string into a list
pub(crate) fn parse_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Join scopes back into the wire form, `None` when the list is empty
pub(crate) fn join_scopes(scopes: &[String]) -> Option<String> {
    if scopes.is_empty() {
        None
    } else {
        Some(scopes.join(" "))
    }
}

/// JWT audience claim, a single value or a list on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }

    /// The first audience value, if any
    pub fn primary(&self) -> Option<&str> {
        match self {
            Audience::Single(aud) => Some(aud),
            Audience::Many(auds) => auds.first().map(String::as_str),
        }
    }
}

impl From<Vec<String>> for Audience {
    fn from(auds: Vec<String>) -> Self {
        Audience::Many(auds)
    }
}

impl From<&str> for Audience {
    fn from(aud: &str) -> Self {
        Audience::Single(aud.to_string())
    }
}

/// Claims carried by a JWT bearer assertion (RFC 7523).
///
/// `aud`, `iat`, and `exp` are optional at the serde layer so the verifier
/// can report their absence precisely instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Claims stamped into JWT-form access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    /// Identifier of the stored token record
    pub jti: String,
    /// Granted scopes, space separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Claims carried by ID tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Left half of the access-token hash, binding the two tokens together
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
}

/// Normalized grant request handed to storage for token allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRequest {
    /// Subject the token is issued for
    pub subject: String,
    /// Issuer of the assertion, or the client id for client-bound grants
    pub issuer: String,
    /// Audiences the token is addressed to
    pub audience: Vec<String>,
    /// Scopes granted by storage
    pub scopes: Vec<String>,
}

/// How access tokens issued to a client are represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenFormat {
    /// Sealed reference into storage, introspectable only by the provider
    Opaque,
    /// Self-contained signed JWT
    Jwt,
}

/// A registered relying party.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    /// Secret for confidential clients; public clients carry none
    pub secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    /// Wire form of access tokens issued to this client
    pub access_token_format: AccessTokenFormat,
    /// Where the authorization endpoint sends the user to authenticate
    pub login_url: String,
    /// ID token lifetime in seconds
    pub id_token_ttl: u64,
}

impl Client {
    pub fn is_public(&self) -> bool {
        self.secret.is_none()
    }
}

/// PKCE method bound to an authorization request (RFC 7636).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    Plain,
    S256,
}

/// PKCE challenge recorded at authorization time and checked at exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl CodeChallenge {
    /// Check a verifier presented at the token endpoint against the
    /// recorded challenge.
    pub fn verify(&self, verifier: &str) -> bool {
        match self.method {
            CodeChallengeMethod::Plain => self.challenge == verifier,
            CodeChallengeMethod::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                self.challenge == URL_SAFE_NO_PAD.encode(digest)
            }
        }
    }
}

/// A pending authorization-code-flow request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
    /// Subject, set once the external login completed
    pub subject: Option<String>,
    /// Whether authentication finished and the request may be redeemed
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// Access-token record as persisted by storage.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub id: String,
    pub subject: String,
    pub client_id: Option<String>,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Query or form parameters of an authorization request (RFC 6749 §4.1.1).
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizationParams {
    /// Requested response type; only `code` is supported
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Form body of a token request (RFC 6749 §4.1.3, RFC 7523 §2.1).
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    /// Authorization code being redeemed
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// PKCE verifier matching the challenge recorded at authorization
    pub code_verifier: Option<String>,
    /// Signed JWT assertion for the jwt-bearer grant
    pub assertion: Option<String>,
    pub scope: Option<String>,
}

/// Successful token response (RFC 6749 §5.1).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Remaining lifetime in whole seconds
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl IntoResponse for AccessTokenResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = Json(self).into_response();
        presets::no_store().apply(&mut response);
        response
    }
}

/// Form body of an introspection request (RFC 7662 §2.1).
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectionParams {
    pub token: Option<String>,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Introspection response (RFC 7662 §2.2). Unknown, expired, or malformed
/// tokens all collapse into `{"active": false}` with no further detail.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl IntrospectionResponse {
    /// The fixed body for tokens that cannot be resolved
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl IntoResponse for IntrospectionResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = Json(self).into_response();
        presets::no_store().apply(&mut response);
        response
    }
}

/// End-session request parameters (OIDC RP-Initiated Logout 1.0).
#[derive(Debug, Deserialize, ToSchema)]
pub struct EndSessionParams {
    pub id_token_hint: Option<String>,
    pub client_id: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// Claims returned from the userinfo endpoint, shaped by the token scopes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserinfoClaims {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl IntoResponse for UserinfoClaims {
    fn into_response(self) -> axum::response::Response {
        let mut response = Json(self).into_response();
        presets::no_store().apply(&mut response);
        response
    }
}

/// OpenID Provider metadata served from the discovery endpoint
/// (OIDC Discovery 1.0 §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub introspection_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ui_locales_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Assemble the metadata once at provider construction, from the final
    /// endpoint registry rather than raw configuration.
    pub fn build(config: &OpConfig, issuer: &str, endpoints: &EndpointSet) -> Self {
        let mut grant_types = vec![
            "authorization_code".to_string(),
            GRANT_TYPE_JWT_BEARER.to_string(),
        ];
        if config.grant_refresh_token {
            grant_types.push("refresh_token".to_string());
        }

        let mut auth_methods = vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
        ];
        if config.auth_method_private_key_jwt {
            auth_methods.push("private_key_jwt".to_string());
        }

        let code_challenge_methods = if config.code_challenge_s256 {
            vec!["S256".to_string()]
        } else {
            Vec::new()
        };

        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: endpoints.authorization.absolute_url(issuer),
            token_endpoint: endpoints.token.absolute_url(issuer),
            introspection_endpoint: endpoints.introspection.absolute_url(issuer),
            userinfo_endpoint: endpoints.userinfo.absolute_url(issuer),
            end_session_endpoint: endpoints.end_session.absolute_url(issuer),
            jwks_uri: endpoints.keys.absolute_url(issuer),
            scopes_supported: to_strings(&["openid", "profile", "email"]),
            response_types_supported: to_strings(&["code"]),
            grant_types_supported: grant_types,
            subject_types_supported: to_strings(&["public"]),
            id_token_signing_alg_values_supported: to_strings(&SUPPORTED_SIGNING_ALGS),
            code_challenge_methods_supported: code_challenge_methods,
            token_endpoint_auth_methods_supported: auth_methods,
            ui_locales_supported: config.get_ui_locales(),
            claims_supported: to_strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "name",
                "email",
                "email_verified",
                "locale",
            ]),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
