//! Provider construction and its capability surface.
//!
//! A [`Provider`] is assembled once at startup by [`ProviderBuilder`]:
//! validate the issuer, apply the recorded options in registration order,
//! seal the endpoint registry, and start the key-acquisition task. After
//! `build` returns, nothing about the provider changes except the signing
//! key storage hot-swaps underneath it.

use crate::config::OpConfig;
use crate::crypto::{CryptoError, OpaqueCipher};
use crate::endpoints::{Endpoint, EndpointError, EndpointSet};
use crate::keyset::KeySetAdapter;
use crate::models::ProviderMetadata;
use crate::signer::Signer;
use crate::storage::{Storage, StorageError};
use crate::verifier::{AccessTokenVerifier, IdTokenHintVerifier, JwtProfileVerifier};
use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use log::info;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Capacity of the key-delivery channel; rotations are rare.
const KEY_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssuerError {
    #[error("issuer must not be empty")]
    Empty,
    #[error("issuer must be an absolute URL: {0}")]
    NotAbsolute(String),
    #[error("issuer must use the http or https scheme")]
    Scheme,
    #[error("issuer must have a host")]
    MissingHost,
    #[error("issuer must not carry a query")]
    Query,
    #[error("issuer must not carry a fragment")]
    Fragment,
}

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("issuer is not valid: {0}")]
    Issuer(#[from] IssuerError),
    #[error("{operation} endpoint override is not valid: {source}")]
    Endpoint {
        operation: &'static str,
        source: EndpointError,
    },
    #[error("crypto key is not usable: {0}")]
    Crypto(#[from] CryptoError),
}

/// Validate the configured issuer URL.
pub(crate) fn validate_issuer(issuer: &str) -> Result<Url, IssuerError> {
    if issuer.trim().is_empty() {
        return Err(IssuerError::Empty);
    }
    let url = Url::parse(issuer).map_err(|e| IssuerError::NotAbsolute(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(IssuerError::Scheme);
    }
    if url.host_str().is_none() {
        return Err(IssuerError::MissingHost);
    }
    if url.query().is_some() {
        return Err(IssuerError::Query);
    }
    if url.fragment().is_some() {
        return Err(IssuerError::Fragment);
    }
    Ok(url)
}

/// A middleware wrapper around the interactive protocol endpoints.
///
/// Interceptors run in registration order: the first registered sees the
/// request first and the response last.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, request: Request, next: Next) -> Response;
}

/// Batch endpoint override; `None` leaves an endpoint untouched.
#[derive(Debug, Clone, Default)]
pub struct EndpointOverrides {
    pub authorization: Option<String>,
    pub token: Option<String>,
    pub introspection: Option<String>,
    pub userinfo: Option<String>,
    pub end_session: Option<String>,
    pub keys: Option<String>,
}

/// A recorded builder option, validated and applied at `build`.
enum ProviderOption {
    AuthorizationEndpoint(String),
    TokenEndpoint(String),
    IntrospectionEndpoint(String),
    UserinfoEndpoint(String),
    EndSessionEndpoint(String),
    KeysEndpoint(String),
    Endpoints(EndpointOverrides),
    Interceptor(Arc<dyn Interceptor>),
}

/// Assembles a [`Provider`] from configuration, storage, and options.
pub struct ProviderBuilder {
    config: OpConfig,
    storage: Arc<dyn Storage>,
    options: Vec<ProviderOption>,
}

impl ProviderBuilder {
    pub fn new(config: OpConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            options: Vec::new(),
        }
    }

    pub fn with_authorization_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::AuthorizationEndpoint(path.to_string()));
        self
    }

    pub fn with_token_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::TokenEndpoint(path.to_string()));
        self
    }

    pub fn with_introspection_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::IntrospectionEndpoint(path.to_string()));
        self
    }

    pub fn with_userinfo_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::UserinfoEndpoint(path.to_string()));
        self
    }

    pub fn with_end_session_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::EndSessionEndpoint(path.to_string()));
        self
    }

    pub fn with_keys_endpoint(mut self, path: &str) -> Self {
        self.options
            .push(ProviderOption::KeysEndpoint(path.to_string()));
        self
    }

    pub fn with_endpoints(mut self, overrides: EndpointOverrides) -> Self {
        self.options.push(ProviderOption::Endpoints(overrides));
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.options.push(ProviderOption::Interceptor(interceptor));
        self
    }

    /// Validate the issuer, apply the recorded options in order aborting on
    /// the first failure, and start the key-acquisition task.
    pub fn build(self) -> Result<Provider, BuilderError> {
        // The issuer gates everything else; nothing is applied before it
        // passes.
        validate_issuer(&self.config.issuer)?;
        let issuer = self.config.issuer.trim_end_matches('/').to_string();

        let mut endpoints = EndpointSet::default();
        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        for option in self.options {
            apply_option(&mut endpoints, &mut interceptors, option)?;
        }

        let cipher = match &self.config.crypto_key {
            Some(encoded) => OpaqueCipher::from_base64(encoded)?,
            None => OpaqueCipher::generate()?,
        };

        let (sender, receiver) = mpsc::channel(KEY_CHANNEL_CAPACITY);
        let signer = Signer::start(receiver);
        {
            let storage = self.storage.clone();
            tokio::spawn(async move {
                storage.deliver_signing_keys(sender).await;
            });
        }

        let metadata = ProviderMetadata::build(&self.config, &issuer, &endpoints);
        info!(
            "Provider for issuer {} constructed; token endpoint at {}",
            issuer,
            endpoints.token.path()
        );

        Ok(Provider {
            inner: Arc::new(ProviderInner {
                config: self.config,
                issuer,
                endpoints,
                metadata,
                interceptors,
                storage: self.storage,
                cipher,
                signer,
                hint_verifier: OnceLock::new(),
                access_verifier: OnceLock::new(),
                jwt_profile_verifier: OnceLock::new(),
            }),
        })
    }
}

fn apply_option(
    endpoints: &mut EndpointSet,
    interceptors: &mut Vec<Arc<dyn Interceptor>>,
    option: ProviderOption,
) -> Result<(), BuilderError> {
    match option {
        ProviderOption::AuthorizationEndpoint(path) => {
            endpoints.authorization = parse_endpoint("authorization", &path)?;
        }
        ProviderOption::TokenEndpoint(path) => {
            endpoints.token = parse_endpoint("token", &path)?;
        }
        ProviderOption::IntrospectionEndpoint(path) => {
            endpoints.introspection = parse_endpoint("introspection", &path)?;
        }
        ProviderOption::UserinfoEndpoint(path) => {
            endpoints.userinfo = parse_endpoint("userinfo", &path)?;
        }
        ProviderOption::EndSessionEndpoint(path) => {
            endpoints.end_session = parse_endpoint("end_session", &path)?;
        }
        ProviderOption::KeysEndpoint(path) => {
            endpoints.keys = parse_endpoint("keys", &path)?;
        }
        ProviderOption::Endpoints(overrides) => {
            if let Some(path) = overrides.authorization {
                endpoints.authorization = parse_endpoint("authorization", &path)?;
            }
            if let Some(path) = overrides.token {
                endpoints.token = parse_endpoint("token", &path)?;
            }
            if let Some(path) = overrides.introspection {
                endpoints.introspection = parse_endpoint("introspection", &path)?;
            }
            if let Some(path) = overrides.userinfo {
                endpoints.userinfo = parse_endpoint("userinfo", &path)?;
            }
            if let Some(path) = overrides.end_session {
                endpoints.end_session = parse_endpoint("end_session", &path)?;
            }
            if let Some(path) = overrides.keys {
                endpoints.keys = parse_endpoint("keys", &path)?;
            }
        }
        ProviderOption::Interceptor(interceptor) => interceptors.push(interceptor),
    }
    Ok(())
}

fn parse_endpoint(operation: &'static str, path: &str) -> Result<Endpoint, BuilderError> {
    Endpoint::new(path).map_err(|source| BuilderError::Endpoint { operation, source })
}

struct ProviderInner {
    config: OpConfig,
    /// Canonical issuer, without a trailing slash
    issuer: String,
    endpoints: EndpointSet,
    metadata: ProviderMetadata,
    interceptors: Vec<Arc<dyn Interceptor>>,
    storage: Arc<dyn Storage>,
    cipher: OpaqueCipher,
    signer: Signer,
    hint_verifier: OnceLock<Arc<IdTokenHintVerifier>>,
    access_verifier: OnceLock<Arc<AccessTokenVerifier>>,
    jwt_profile_verifier: OnceLock<Arc<JwtProfileVerifier>>,
}

/// The assembled provider, shared as axum state across all handlers.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("issuer", &self.inner.issuer)
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn builder(config: OpConfig, storage: Arc<dyn Storage>) -> ProviderBuilder {
        ProviderBuilder::new(config, storage)
    }

    pub fn config(&self) -> &OpConfig {
        &self.inner.config
    }

    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.inner.endpoints
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.inner.metadata
    }

    pub(crate) fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.interceptors
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn cipher(&self) -> &OpaqueCipher {
        &self.inner.cipher
    }

    pub fn signer(&self) -> &Signer {
        &self.inner.signer
    }

    /// Whether the signer can already serve, i.e. a key has been delivered.
    pub fn signer_ready(&self) -> bool {
        self.inner.signer.has_key()
    }

    /// Reachability of the storage collaborator.
    pub async fn storage_ready(&self) -> Result<(), StorageError> {
        self.inner.storage.health().await
    }

    /// Verifier for ID token hints presented at logout. Built on first use
    /// and shared afterwards.
    pub fn id_token_hint_verifier(&self) -> Arc<IdTokenHintVerifier> {
        self.inner
            .hint_verifier
            .get_or_init(|| {
                Arc::new(IdTokenHintVerifier::new(
                    KeySetAdapter::new(self.inner.storage.clone()),
                    self.inner.issuer.clone(),
                ))
            })
            .clone()
    }

    /// Verifier for JWT-form access tokens presented to introspection and
    /// userinfo.
    pub fn access_token_verifier(&self) -> Arc<AccessTokenVerifier> {
        self.inner
            .access_verifier
            .get_or_init(|| {
                Arc::new(AccessTokenVerifier::new(
                    KeySetAdapter::new(self.inner.storage.clone()),
                    self.inner.issuer.clone(),
                ))
            })
            .clone()
    }

    /// Verifier for client assertions of the jwt-bearer grant.
    pub fn jwt_profile_verifier(&self) -> Arc<JwtProfileVerifier> {
        self.inner
            .jwt_profile_verifier
            .get_or_init(|| {
                Arc::new(JwtProfileVerifier::new(
                    KeySetAdapter::new(self.inner.storage.clone()),
                    self.inner.issuer.clone(),
                ))
            })
            .clone()
    }
}
