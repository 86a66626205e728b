//! The persistence boundary of the provider.
//!
//! Everything durable lives behind the [`Storage`] trait: registered clients,
//! pending authorization requests, issued tokens, and the key material the
//! provider signs and verifies with. The bundled [`memory::InMemoryStorage`]
//! implements it for demos and tests.

use crate::models::{AuthRequest, Client, StoredToken, TokenRequest, UserinfoClaims};
use crate::signer::SigningKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} was not found")]
    NotFound(&'static str),
    #[error("client credentials are not valid")]
    BadCredentials,
    #[error("requested scopes were refused: {0}")]
    ScopesRefused(String),
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// Storage collaborator the provider is constructed over.
///
/// Implementations are internally synchronized; one instance is shared across
/// all request handlers and the key-acquisition task.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Push signing keys through `sender`: once when the channel opens and
    /// again on every rotation. The receiving side keeps only the latest
    /// delivery.
    async fn deliver_signing_keys(&self, sender: mpsc::Sender<SigningKey>);

    /// Public keys token verification may resolve against.
    async fn key_set(&self) -> Result<JwkSet, StorageError>;

    /// Allocate an access-token record, returning its id and expiry.
    async fn create_access_token(
        &self,
        request: &TokenRequest,
    ) -> Result<(String, DateTime<Utc>), StorageError>;

    /// Decide which of the requested scopes the assertion issuer may hold.
    /// An empty request asks for everything the issuer is entitled to.
    async fn validate_jwt_profile_scopes(
        &self,
        issuer: &str,
        scopes: Vec<String>,
    ) -> Result<Vec<String>, StorageError>;

    async fn client_by_id(&self, client_id: &str) -> Result<Client, StorageError>;

    /// Authenticate a confidential client by id and secret.
    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Client, StorageError>;

    async fn save_auth_request(&self, request: AuthRequest) -> Result<(), StorageError>;

    async fn auth_request_by_id(&self, id: &str) -> Result<AuthRequest, StorageError>;

    /// Bind an issued authorization code to its request.
    async fn save_auth_code(&self, code: &str, request_id: &str) -> Result<(), StorageError>;

    async fn auth_request_by_code(&self, code: &str) -> Result<AuthRequest, StorageError>;

    /// Drop an authorization request and any code bound to it. Codes are
    /// single-use; redemption ends with this call.
    async fn delete_auth_request(&self, id: &str) -> Result<(), StorageError>;

    async fn token_by_id(&self, id: &str) -> Result<StoredToken, StorageError>;

    /// Claims for the subject, filtered down to what `scopes` reveal.
    async fn userinfo(
        &self,
        subject: &str,
        scopes: &[String],
    ) -> Result<UserinfoClaims, StorageError>;

    /// Invalidate everything issued to the subject.
    async fn terminate_session(&self, subject: &str) -> Result<(), StorageError>;

    /// Cheap reachability probe for the readiness endpoint.
    async fn health(&self) -> Result<(), StorageError>;
}
