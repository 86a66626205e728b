//! Verification policies layered over the key set.
//!
//! All three verifiers delegate signature checking to [`KeySetAdapter`] and
//! then apply their own claim policy. They share an issuer but deliberately
//! nothing else: what counts as a valid ID token hint is not what counts as
//! a valid client assertion.

use crate::keyset::KeySetAdapter;
use crate::models::{AccessTokenClaims, AssertionClaims, IdTokenClaims};
use crate::storage::StorageError;
use chrono::Utc;
use thiserror::Error;

/// Maximum accepted age of a JWT-bearer assertion, measured from `iat`.
const MAX_ASSERTION_AGE_SECS: i64 = 3600;

/// Tolerated clock drift between the assertion issuer and this process.
const CLOCK_SKEW_SECS: i64 = 1;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("could not fetch the verification keys: {0}")]
    KeyFetch(#[from] StorageError),
    #[error("no key matches the token header")]
    UnknownKey,
    #[error("more than one key matches the token header")]
    AmbiguousKey,
    #[error("key is not usable for verification: {0}")]
    UnusableKey(String),
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("signature does not verify: {0}")]
    Signature(String),
    #[error("token issuer {actual:?} is not {expected:?}")]
    IssuerMismatch { expected: String, actual: String },
    #[error("assertion audience does not include this provider")]
    AudienceMismatch,
    #[error("assertion carries no issued-at claim")]
    MissingIssuedAt,
    #[error("assertion is issued in the future")]
    IssuedInFuture,
    #[error("assertion has expired")]
    Expired,
}

/// Accepts ID tokens this provider issued, for use as logout hints.
pub struct IdTokenHintVerifier {
    keys: KeySetAdapter,
    issuer: String,
}

impl IdTokenHintVerifier {
    pub(crate) fn new(keys: KeySetAdapter, issuer: String) -> Self {
        Self { keys, issuer }
    }

    /// The token has to be ours and intact; expiry is not checked, a user
    /// may log out with a hint that has already lapsed.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, VerifyError> {
        let claims: IdTokenClaims = self.keys.verify_signature(token).await?;
        if claims.iss != self.issuer {
            return Err(VerifyError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: claims.iss,
            });
        }
        Ok(claims)
    }
}

/// Accepts JWT-form access tokens this provider issued.
pub struct AccessTokenVerifier {
    keys: KeySetAdapter,
    issuer: String,
}

impl AccessTokenVerifier {
    pub(crate) fn new(keys: KeySetAdapter, issuer: String) -> Self {
        Self { keys, issuer }
    }

    pub async fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerifyError> {
        let claims: AccessTokenClaims = self.keys.verify_signature(token).await?;
        if claims.iss != self.issuer {
            return Err(VerifyError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: claims.iss,
            });
        }
        if claims.exp < Utc::now().timestamp() - CLOCK_SKEW_SECS {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }
}

/// Accepts client assertions for the JWT bearer grant (RFC 7523 §3).
pub struct JwtProfileVerifier {
    keys: KeySetAdapter,
    issuer: String,
}

impl JwtProfileVerifier {
    pub(crate) fn new(keys: KeySetAdapter, issuer: String) -> Self {
        Self { keys, issuer }
    }

    /// Signature, addressing, and freshness: the assertion must be aimed at
    /// this provider, carry an issued-at, and be at most an hour old.
    pub async fn verify(&self, assertion: &str) -> Result<AssertionClaims, VerifyError> {
        let claims: AssertionClaims = self.keys.verify_signature(assertion).await?;

        let addressed_to_us = claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.issuer));
        if !addressed_to_us {
            return Err(VerifyError::AudienceMismatch);
        }

        let now = Utc::now().timestamp();
        let Some(iat) = claims.iat else {
            return Err(VerifyError::MissingIssuedAt);
        };
        if iat > now + CLOCK_SKEW_SECS {
            return Err(VerifyError::IssuedInFuture);
        }
        if iat + MAX_ASSERTION_AGE_SECS < now - CLOCK_SKEW_SECS {
            return Err(VerifyError::Expired);
        }
        if let Some(exp) = claims.exp {
            if exp < now - CLOCK_SKEW_SECS {
                return Err(VerifyError::Expired);
            }
        }
        Ok(claims)
    }
}
