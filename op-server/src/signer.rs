//! The signing half of the key lifecycle.
//!
//! Storage pushes [`SigningKey`] values through a channel; the signer keeps
//! whichever arrived last and stamps its id and algorithm into every token
//! header. Until the first delivery the signer fails fast instead of
//! blocking a request.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use keywatch::KeyWatch;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;

/// Key material storage delivers for signing.
#[derive(Clone)]
pub struct SigningKey {
    id: String,
    algorithm: Algorithm,
    key: EncodingKey,
}

impl SigningKey {
    pub fn new(id: impl Into<String>, algorithm: Algorithm, key: EncodingKey) -> Self {
        Self {
            id: id.into(),
            algorithm,
            key,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("no signing key has been delivered yet")]
    NoKeyAvailable,
    #[error("signing failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Signs tokens with whichever key storage delivered last.
pub struct Signer {
    keys: KeyWatch<SigningKey>,
}

impl Signer {
    /// Consume key deliveries from `receiver`. The first delivery makes the
    /// signer ready; later ones replace the key atomically, so a token is
    /// signed entirely under one key or entirely under its successor.
    pub fn start(receiver: mpsc::Receiver<SigningKey>) -> Self {
        Self {
            keys: KeyWatch::start(receiver),
        }
    }

    /// Sign `claims` into a compact JWT.
    pub async fn sign<C: Serialize>(&self, claims: &C) -> Result<String, SignerError> {
        let Some(key) = self.keys.current().await else {
            return Err(SignerError::NoKeyAvailable);
        };
        let mut header = Header::new(key.algorithm());
        header.kid = Some(key.id().to_string());
        Ok(encode(&header, claims, &key.key)?)
    }

    /// Whether at least one key has arrived.
    pub fn has_key(&self) -> bool {
        self.keys.is_ready()
    }

    /// Wait for the first key, for startup orchestration and tests.
    pub async fn wait_for_key(&self, wait_timeout: Duration) -> Result<(), Elapsed> {
        self.keys.wait_for_value(wait_timeout).await
    }
}
