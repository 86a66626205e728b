//! Shared helpers for tests: a seeded end-to-end fixture driving the router
//! through `oneshot`, a stub storage with failure knobs, and small JWT
//! builders.

use crate::config::OpConfig;
use crate::models::{
    AccessTokenFormat, AuthRequest, Client, StoredToken, TokenRequest, UserinfoClaims,
};
use crate::provider::{Provider, ProviderBuilder};
use crate::signer::SigningKey;
use crate::storage::memory::{dev_encoding_key, dev_jwk, InMemoryStorage};
use crate::storage::{Storage, StorageError};
use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;
use url::Url;

pub(crate) const TEST_ISSUER: &str = "http://localhost:9998";
pub(crate) const TEST_CLIENT_ID: &str = "web";
pub(crate) const TEST_CLIENT_SECRET: &str = "web-secret";
pub(crate) const TEST_JWT_CLIENT_ID: &str = "jwt-web";
pub(crate) const TEST_JWT_CLIENT_SECRET: &str = "jwt-secret";
pub(crate) const TEST_PUBLIC_CLIENT_ID: &str = "native-app";
pub(crate) const TEST_REDIRECT_URI: &str = "http://client.example/auth/callback";
pub(crate) const TEST_POST_LOGOUT_URI: &str = "http://client.example/signed-out";
pub(crate) const TEST_LOGIN_URL: &str = "http://login.example/login";
pub(crate) const TEST_SERVICE_ISSUER: &str = "https://service.example.com";
pub(crate) const TEST_SERVICE_KID: &str = "svc-key";
pub(crate) const TEST_SUBJECT: &str = "user-1";

/// Set up logging for tests, respecting the given level
pub(crate) fn setup_logger(level: LevelFilter) {
    let _ = env_logger::builder()
        .filter_level(level)
        .is_test(true)
        .try_init();
}

/// An oct JWK carrying an HMAC secret, as JSON.
pub(crate) fn hs256_jwk(kid: &str, secret: &[u8]) -> Value {
    json!({
        "kty": "oct",
        "use": "sig",
        "kid": kid,
        "alg": "HS256",
        "k": URL_SAFE_NO_PAD.encode(secret),
    })
}

/// Sign arbitrary claims with an HMAC secret under the given kid.
pub(crate) fn sign_hs256(kid: &str, secret: &[u8], claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).expect("test token")
}

/// Sign a jwt-bearer assertion with the seeded service-account key.
///
/// `iat_offset` shifts the issued-at relative to now; the expiry stays five
/// minutes in the future so tests exercise the issued-at rule in isolation.
pub(crate) fn sign_service_assertion(
    issuer: &str,
    subject: &str,
    audience: &str,
    iat_offset: i64,
) -> String {
    let now = jsonwebtoken::get_current_timestamp() as i64;
    let claims = json!({
        "iss": issuer,
        "sub": subject,
        "aud": audience,
        "iat": now + iat_offset,
        "exp": now + 300,
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_SERVICE_KID.to_string());
    encode(&header, &claims, &dev_encoding_key()).expect("test assertion")
}

/// Storage registered with the fixture's standard cast: a confidential
/// client, a JWT-token client, a public client, a service account signing
/// with the development key, and one user profile.
pub(crate) async fn seeded_storage() -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .register_client(Client {
            id: TEST_CLIENT_ID.to_string(),
            secret: Some(TEST_CLIENT_SECRET.to_string()),
            redirect_uris: vec![TEST_REDIRECT_URI.to_string()],
            post_logout_redirect_uris: vec![TEST_POST_LOGOUT_URI.to_string()],
            access_token_format: AccessTokenFormat::Opaque,
            login_url: TEST_LOGIN_URL.to_string(),
            id_token_ttl: 300,
        })
        .await;
    storage
        .register_client(Client {
            id: TEST_JWT_CLIENT_ID.to_string(),
            secret: Some(TEST_JWT_CLIENT_SECRET.to_string()),
            redirect_uris: vec![TEST_REDIRECT_URI.to_string()],
            post_logout_redirect_uris: vec![],
            access_token_format: AccessTokenFormat::Jwt,
            login_url: TEST_LOGIN_URL.to_string(),
            id_token_ttl: 300,
        })
        .await;
    storage
        .register_client(Client {
            id: TEST_PUBLIC_CLIENT_ID.to_string(),
            secret: None,
            redirect_uris: vec![TEST_REDIRECT_URI.to_string()],
            post_logout_redirect_uris: vec![],
            access_token_format: AccessTokenFormat::Opaque,
            login_url: TEST_LOGIN_URL.to_string(),
            id_token_ttl: 300,
        })
        .await;
    storage
        .register_service_account(
            TEST_SERVICE_ISSUER,
            &["read", "write"],
            dev_jwk(TEST_SERVICE_KID),
        )
        .await;
    storage
        .register_user(
            TEST_SUBJECT,
            UserinfoClaims {
                sub: TEST_SUBJECT.to_string(),
                name: Some("Alice Example".to_string()),
                email: Some("alice@example.com".to_string()),
                email_verified: Some(true),
                locale: Some("en".to_string()),
            },
        )
        .await;
    storage
}

fn encode_form(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// End-to-end test fixture over the full router and a seeded in-memory
/// storage.
///
/// # Example
///
/// ```
/// let fixture = TestFixture::new().await;
/// let response = fixture.get("/.well-known/openid-configuration").await;
/// response.assert_ok();
/// ```
pub(crate) struct TestFixture {
    pub app: Router,
    pub provider: Provider,
    pub storage: Arc<InMemoryStorage>,
}

impl TestFixture {
    /// Fixture with default configuration and endpoints. Waits for the
    /// first signing key so requests never hit an unready signer.
    pub async fn new() -> Self {
        Self::with_builder(|builder| builder).await
    }

    /// Fixture with builder customizations applied before `build`, for
    /// exercising endpoint overrides and interceptors.
    pub async fn with_builder(
        customize: impl FnOnce(ProviderBuilder) -> ProviderBuilder,
    ) -> Self {
        Self::with_config(OpConfig::default(), customize).await
    }

    /// Fixture over non-default configuration.
    pub async fn with_config(
        config: OpConfig,
        customize: impl FnOnce(ProviderBuilder) -> ProviderBuilder,
    ) -> Self {
        let storage = seeded_storage().await;
        let builder = Provider::builder(config, storage.clone() as Arc<dyn Storage>);
        let provider = customize(builder).build().expect("test provider");
        provider
            .signer()
            .wait_for_key(Duration::from_secs(1))
            .await
            .expect("signing key delivery");
        let app = crate::create_app(provider.clone()).await;
        Self {
            app,
            provider,
            storage,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn post_form(&self, uri: &str, params: &[(&str, &str)]) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(params)))
            .expect("request");
        self.send(request).await
    }

    /// POST a form with HTTP Basic client authentication (RFC 6749 §2.3.1).
    pub async fn post_form_with_basic_auth(
        &self,
        uri: &str,
        params: &[(&str, &str)],
        client_id: &str,
        client_secret: &str,
    ) -> TestResponse {
        let credentials = STANDARD.encode(format!("{client_id}:{client_secret}"));
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(params)))
            .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("request should succeed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
        TestResponse {
            status,
            headers,
            json,
        }
    }

    /// Drive the front half of the authorization-code flow: authorize,
    /// complete the external login, resume at the callback. Returns the
    /// code and state delivered to the client redirect URI.
    pub async fn obtain_auth_code(
        &self,
        client_id: &str,
        scope: &str,
        extra: &[(&str, &str)],
    ) -> (String, Option<String>) {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", TEST_REDIRECT_URI),
            ("scope", scope),
        ];
        params.extend_from_slice(extra);

        let authorize_path = self.provider.endpoints().authorization.path().to_string();
        let response = self
            .get(&format!("{}?{}", authorize_path, encode_form(&params)))
            .await;
        assert_eq!(
            response.status,
            StatusCode::SEE_OTHER,
            "authorize should redirect to the login service, got {:?}",
            response.json
        );
        let login_redirect =
            Url::parse(response.header(LOCATION.as_str()).expect("login redirect")).unwrap();
        let auth_request_id = login_redirect
            .query_pairs()
            .find(|(name, _)| name == "authRequestID")
            .map(|(_, value)| value.to_string())
            .expect("authRequestID parameter");

        // The external login service authenticates the user out of band
        self.storage
            .complete_auth_request(&auth_request_id, TEST_SUBJECT)
            .await
            .unwrap();

        let callback_path = self.provider.endpoints().callback_path();
        let response = self
            .get(&format!("{callback_path}?id={auth_request_id}"))
            .await;
        assert_eq!(
            response.status,
            StatusCode::SEE_OTHER,
            "callback should redirect back to the client, got {:?}",
            response.json
        );
        let client_redirect =
            Url::parse(response.header(LOCATION.as_str()).expect("client redirect")).unwrap();
        let code = client_redirect
            .query_pairs()
            .find(|(name, _)| name == "code")
            .map(|(_, value)| value.to_string())
            .expect("code parameter");
        let state = client_redirect
            .query_pairs()
            .find(|(name, _)| name == "state")
            .map(|(_, value)| value.to_string());
        (code, state)
    }
}

/// A parsed response: status, headers, and body JSON (or `{}` for bodies
/// that are not JSON).
pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {expected}, got {} with body: {}",
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("failed to deserialize response body")
    }
}

/// Storage stub with induced-failure knobs, for tests that need precise
/// control over the key set or delivery behavior.
pub(crate) struct StubStorage {
    key_set: JwkSet,
    deliver: Vec<SigningKey>,
    fail_key_set: bool,
    fail_health: bool,
}

impl StubStorage {
    /// Stub publishing the given JWKs (as JSON values) and delivering no
    /// signing keys.
    pub fn with_keys(keys: Vec<Value>) -> Self {
        let key_set: JwkSet =
            serde_json::from_value(json!({ "keys": keys })).expect("test jwk set");
        Self {
            key_set,
            deliver: Vec::new(),
            fail_key_set: false,
            fail_health: false,
        }
    }

    pub fn delivering(mut self, keys: Vec<SigningKey>) -> Self {
        self.deliver = keys;
        self
    }

    pub fn failing_key_set(mut self) -> Self {
        self.fail_key_set = true;
        self
    }

    pub fn failing_health(mut self) -> Self {
        self.fail_health = true;
        self
    }

    fn unsupported<T>(&self) -> Result<T, StorageError> {
        Err(StorageError::Unavailable(
            "not supported by the stub".to_string(),
        ))
    }
}

#[async_trait]
impl Storage for StubStorage {
    async fn deliver_signing_keys(&self, sender: mpsc::Sender<SigningKey>) {
        for key in self.deliver.clone() {
            let _ = sender.send(key).await;
        }
    }

    async fn key_set(&self) -> Result<JwkSet, StorageError> {
        if self.fail_key_set {
            return Err(StorageError::Unavailable(
                "induced key set failure".to_string(),
            ));
        }
        Ok(self.key_set.clone())
    }

    async fn create_access_token(
        &self,
        _request: &TokenRequest,
    ) -> Result<(String, DateTime<Utc>), StorageError> {
        self.unsupported()
    }

    async fn validate_jwt_profile_scopes(
        &self,
        _issuer: &str,
        _scopes: Vec<String>,
    ) -> Result<Vec<String>, StorageError> {
        self.unsupported()
    }

    async fn client_by_id(&self, _client_id: &str) -> Result<Client, StorageError> {
        Err(StorageError::NotFound("client"))
    }

    async fn authenticate_client(
        &self,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<Client, StorageError> {
        Err(StorageError::BadCredentials)
    }

    async fn save_auth_request(&self, _request: AuthRequest) -> Result<(), StorageError> {
        self.unsupported()
    }

    async fn auth_request_by_id(&self, _id: &str) -> Result<AuthRequest, StorageError> {
        Err(StorageError::NotFound("authorization request"))
    }

    async fn save_auth_code(&self, _code: &str, _request_id: &str) -> Result<(), StorageError> {
        self.unsupported()
    }

    async fn auth_request_by_code(&self, _code: &str) -> Result<AuthRequest, StorageError> {
        Err(StorageError::NotFound("authorization code"))
    }

    async fn delete_auth_request(&self, _id: &str) -> Result<(), StorageError> {
        self.unsupported()
    }

    async fn token_by_id(&self, _id: &str) -> Result<StoredToken, StorageError> {
        Err(StorageError::NotFound("token"))
    }

    async fn userinfo(
        &self,
        _subject: &str,
        _scopes: &[String],
    ) -> Result<UserinfoClaims, StorageError> {
        self.unsupported()
    }

    async fn terminate_session(&self, _subject: &str) -> Result<(), StorageError> {
        self.unsupported()
    }

    async fn health(&self) -> Result<(), StorageError> {
        if self.fail_health {
            return Err(StorageError::Unavailable(
                "induced health failure".to_string(),
            ));
        }
        Ok(())
    }
}
