//! Bridges the keys storage publishes into signature verification.
//!
//! Resolution is strict: a token header must select exactly one usable key.
//! Zero candidates and several candidates both fail verification, so a
//! sloppily assembled key set can never make acceptance ambiguous.

use crate::storage::Storage;
use crate::verifier::VerifyError;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::sync::Arc;

/// Looks up verification keys in storage and checks compact JWT signatures.
pub struct KeySetAdapter {
    storage: Arc<dyn Storage>,
}

impl KeySetAdapter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Check the signature of `token` against the published key set and
    /// deserialize its claims. Time and audience checks stay with the
    /// calling verifier policy.
    pub async fn verify_signature<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, VerifyError> {
        let key_set = self
            .storage
            .key_set()
            .await
            .map_err(VerifyError::KeyFetch)?;
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let jwk = resolve_key(&key_set, header.kid.as_deref(), header.alg)?;
        let decoding_key =
            DecodingKey::from_jwk(jwk).map_err(|e| VerifyError::UnusableKey(e.to_string()))?;

        // The adapter only answers "was this signed by a published key";
        // exp/aud policy differs per verifier and is applied there.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<T>(token, &decoding_key, &validation)
            .map_err(|e| VerifyError::Signature(e.to_string()))?;
        Ok(data.claims)
    }
}

/// Resolve exactly one signature key for the header's (kid, alg) pair.
fn resolve_key<'a>(
    key_set: &'a JwkSet,
    kid: Option<&str>,
    alg: Algorithm,
) -> Result<&'a Jwk, VerifyError> {
    let mut candidates = key_set
        .keys
        .iter()
        .filter(|key| is_signature_key(key) && algorithm_matches(key, alg) && kid_matches(key, kid));

    let Some(first) = candidates.next() else {
        return Err(VerifyError::UnknownKey);
    };
    if candidates.next().is_some() {
        return Err(VerifyError::AmbiguousKey);
    }
    Ok(first)
}

fn is_signature_key(key: &Jwk) -> bool {
    // Keys without a declared use are still signature candidates
    match &key.common.public_key_use {
        Some(PublicKeyUse::Signature) | None => true,
        Some(_) => false,
    }
}

fn algorithm_matches(key: &Jwk, alg: Algorithm) -> bool {
    match key.common.key_algorithm {
        Some(key_alg) => Algorithm::from_str(&key_alg.to_string())
            .map_or(false, |parsed| parsed == alg),
        None => true,
    }
}

fn kid_matches(key: &Jwk, kid: Option<&str>) -> bool {
    match kid {
        Some(kid) => key.common.key_id.as_deref() == Some(kid),
        None => true,
    }
}
