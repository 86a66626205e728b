//! Server configuration, loaded from `OP_*` environment variables.

use confique::Config;

/// Top-level provider configuration.
///
/// Every field can be set through an environment variable and falls back to
/// the documented default, so the server starts with no configuration at all.
#[derive(Debug, Config, Clone)]
pub struct OpConfig {
    /// Issuer URL advertised in the discovery document and stamped as the
    /// `iss` claim into every issued token
    #[config(env = "OP_ISSUER", default = "http://localhost:9998")]
    pub issuer: String,

    /// Port the HTTP server binds to
    #[config(env = "OP_PORT", default = 9998)]
    pub port: u16,

    /// Lifetime of issued access tokens in seconds
    #[config(env = "OP_ACCESS_TOKEN_TTL", default = 3600)]
    pub access_token_ttl: u64,

    /// Lifetime of issued ID tokens in seconds, used when a client does not
    /// carry its own
    #[config(env = "OP_ID_TOKEN_TTL", default = 3600)]
    pub id_token_ttl: u64,

    /// Base64url-encoded 32-byte key sealing opaque tokens and authorization
    /// codes; a process-local random key is generated when unset
    #[config(env = "OP_CRYPTO_KEY")]
    pub crypto_key: Option<String>,

    /// Where to send the user agent after logout when the client supplies no
    /// registered post-logout redirect
    #[config(env = "OP_DEFAULT_POST_LOGOUT_REDIRECT")]
    pub default_post_logout_redirect: Option<String>,

    /// Advertise and accept the S256 PKCE code-challenge method
    #[config(env = "OP_CODE_CHALLENGE_S256", default = true)]
    pub code_challenge_s256: bool,

    /// Advertise the private_key_jwt client authentication method
    #[config(env = "OP_AUTH_METHOD_PRIVATE_KEY_JWT", default = false)]
    pub auth_method_private_key_jwt: bool,

    /// Advertise the refresh_token grant in the discovery document
    #[config(env = "OP_GRANT_REFRESH_TOKEN", default = false)]
    pub grant_refresh_token: bool,

    /// UI locales advertised in the discovery document, comma separated
    #[config(env = "OP_UI_LOCALES", default = "en")]
    pub ui_locales: String,

    /// Timeout for the storage readiness probe in seconds
    #[config(env = "OP_HEALTHCHECK_TIMEOUT", default = 1.0)]
    pub healthcheck_timeout: f64,
}

impl OpConfig {
    /// Load the configuration from the environment
    pub fn load() -> Result<Self, confique::Error> {
        Self::builder().env().load()
    }

    /// UI locales as a list, with surrounding whitespace stripped
    pub fn get_ui_locales(&self) -> Vec<String> {
        self.ui_locales
            .split(',')
            .map(|locale| locale.trim().to_string())
            .filter(|locale| !locale.is_empty())
            .collect()
    }
}

impl Default for OpConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:9998".to_string(),
            port: 9998,
            access_token_ttl: 3600,
            id_token_ttl: 3600,
            crypto_key: None,
            default_post_logout_redirect: None,
            code_challenge_s256: true,
            auth_method_private_key_jwt: false,
            grant_refresh_token: false,
            ui_locales: "en".to_string(),
            healthcheck_timeout: 1.0,
        }
    }
}
