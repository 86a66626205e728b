//! AEAD sealing for opaque protocol values.
//!
//! Authorization codes and opaque access tokens are AES-256-GCM ciphertexts:
//! a random 96-bit nonce followed by the sealed payload and tag, base64url
//! encoded without padding. Decryption failures carry no detail so a caller
//! cannot distinguish a forged token from a corrupted one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Byte length of the symmetric key material.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("cipher key must be {KEY_LEN} bytes")]
    KeyLength,
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is not valid")]
    Decrypt,
}

/// Seals and opens the opaque strings the provider hands out.
pub struct OpaqueCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl OpaqueCipher {
    /// Build a cipher over the given 32-byte key.
    pub fn new(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, key_bytes).map_err(|_| CryptoError::KeyLength)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build a cipher over a base64url-encoded key, as carried in
    /// configuration.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::KeyLength)?;
        Self::new(&key_bytes)
    }

    /// Build a cipher over a freshly generated random key. Tokens sealed by
    /// it do not survive a process restart.
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let mut key_bytes = [0u8; KEY_LEN];
        rng.fill(&mut key_bytes).map_err(|_| CryptoError::Encrypt)?;
        Self::new(&key_bytes)
    }

    /// Seal a plaintext into an opaque URL-safe token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Encrypt)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut wire = Vec::with_capacity(NONCE_LEN + sealed.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.append(&mut sealed);
        Ok(URL_SAFE_NO_PAD.encode(wire))
    }

    /// Open an opaque token back into its plaintext.
    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let wire = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CryptoError::Decrypt)?;
        if wire.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, sealed) = wire.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CryptoError::Decrypt)?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::Decrypt)
    }
}
