//! Symmetric sealing for values stored on behalf of users.
//!
//! Sealed values are `hex(nonce):hex(ciphertext)` produced by AES-256-GCM
//! with a key derived as sha256 of a secret string. The same format is used
//! for protected document fields, per-field secret keys, project connection
//! strings and the owner token embedded in public endpoint URLs.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption key is not configured")]
    MissingKey,

    #[error("Sealed value is malformed")]
    Malformed,

    #[error("Sealed value failed authentication")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,
}

/// AES-256-GCM sealer keyed from an arbitrary secret string
#[derive(Clone)]
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Sealer using the server-wide `ENCRYPTION_KEY`
    pub fn server() -> Result<Self, CryptoError> {
        Self::new(&config::config().security.encryption_key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption)?;
        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let (nonce_hex, body_hex) = sealed.split_once(':').ok_or(CryptoError::Malformed)?;
        let nonce_bytes = hex::decode(nonce_hex).map_err(|_| CryptoError::Malformed)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let body = hex::decode(body_hex).map_err(|_| CryptoError::Malformed)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), body.as_ref())
            .map_err(|_| CryptoError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed)
    }
}

/// Token identifying the owner of a dynamic endpoint
pub fn issue_access_token(owner_id: Uuid) -> Result<String, CryptoError> {
    Sealer::server()?.seal(&owner_id.to_string())
}

pub fn resolve_access_token(token: &str) -> Result<Uuid, CryptoError> {
    let plaintext = Sealer::server()?.open(token)?;
    Uuid::parse_str(&plaintext).map_err(|_| CryptoError::Malformed)
}
