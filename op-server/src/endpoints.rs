//! Registry of the relative paths the provider serves its operations under.
//!
//! Six endpoints are configurable through the provider builder; discovery and
//! the health probes are fixed by convention. Paths are validated once at
//! construction and never consulted again at request time.

use std::sync::LazyLock;
use thiserror::Error;

pub const DEFAULT_AUTHORIZATION_PATH: &str = "/authorize";
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
pub const DEFAULT_INTROSPECTION_PATH: &str = "/oauth/introspect";
pub const DEFAULT_USERINFO_PATH: &str = "/userinfo";
pub const DEFAULT_END_SESSION_PATH: &str = "/end_session";
pub const DEFAULT_KEYS_PATH: &str = "/keys";

/// Fixed discovery path (OIDC Discovery 1.0 §4).
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The authorization callback lives directly under the authorization path.
pub const CALLBACK_SUFFIX: &str = "/callback";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint path must not be empty")]
    Empty,
    #[error("endpoint path must be relative and start with '/'")]
    NotRelative,
    #[error("endpoint path must not carry a query or fragment")]
    QueryOrFragment,
    #[error("endpoint path must not contain whitespace")]
    Whitespace,
}

/// A validated relative path an operation is mounted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: String,
}

impl Endpoint {
    pub fn new(path: &str) -> Result<Self, EndpointError> {
        if path.is_empty() {
            return Err(EndpointError::Empty);
        }
        if !path.starts_with('/') || path.contains("://") {
            return Err(EndpointError::NotRelative);
        }
        if path.contains('?') || path.contains('#') {
            return Err(EndpointError::QueryOrFragment);
        }
        if path.chars().any(char::is_whitespace) {
            return Err(EndpointError::Whitespace);
        }
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute URL of this endpoint under the given issuer.
    pub fn absolute_url(&self, issuer: &str) -> String {
        format!("{}{}", issuer.trim_end_matches('/'), self.path)
    }
}

/// The configurable endpoints of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    pub authorization: Endpoint,
    pub token: Endpoint,
    pub introspection: Endpoint,
    pub userinfo: Endpoint,
    pub end_session: Endpoint,
    pub keys: Endpoint,
}

impl EndpointSet {
    /// Path of the authorization callback, derived from the authorization
    /// path so overriding one moves the other.
    pub fn callback_path(&self) -> String {
        format!("{}{}", self.authorization.path(), CALLBACK_SUFFIX)
    }
}

pub static DEFAULT_ENDPOINTS: LazyLock<EndpointSet> = LazyLock::new(|| EndpointSet {
    authorization: Endpoint::new(DEFAULT_AUTHORIZATION_PATH).expect("default authorization path"),
    token: Endpoint::new(DEFAULT_TOKEN_PATH).expect("default token path"),
    introspection: Endpoint::new(DEFAULT_INTROSPECTION_PATH).expect("default introspection path"),
    userinfo: Endpoint::new(DEFAULT_USERINFO_PATH).expect("default userinfo path"),
    end_session: Endpoint::new(DEFAULT_END_SESSION_PATH).expect("default end_session path"),
    keys: Endpoint::new(DEFAULT_KEYS_PATH).expect("default keys path"),
});

impl Default for EndpointSet {
    fn default() -> Self {
        DEFAULT_ENDPOINTS.clone()
    }
}
