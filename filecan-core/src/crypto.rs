//! Password-based payload encryption
//!
//! ## Ciphertext layout
//!
//! ```text
//! +-----------+------------+---------------------------+
//! | salt (16) | nonce (12) | ciphertext || GCM tag (16) |
//! +-----------+------------+---------------------------+
//! ```
//!
//! The key is derived per object from the password and a random salt with
//! PBKDF2-HMAC-SHA256, so equal payloads never produce equal ciphertexts.

use crate::{FileCanError, Result};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use std::num::NonZeroU32;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const AAD: &[u8] = b"filecan-object-v1";

/// Encrypts and decrypts payload bytes given a password
pub trait CipherProvider: Send + Sync {
    /// Encrypt `plaintext` with `password`
    fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<Vec<u8>>;

    /// Decrypt bytes produced by `encrypt`.
    ///
    /// A wrong password or tampered input fails with `DecryptionFailed`.
    fn decrypt(&self, ciphertext: &[u8], password: &str) -> Result<Vec<u8>>;
}

/// AES-256-GCM with PBKDF2 key derivation (ring)
#[derive(Debug, Clone)]
pub struct AesGcmCipher {
    iterations: NonZeroU32,
}

impl AesGcmCipher {
    /// Create a cipher deriving keys with `iterations` PBKDF2 rounds
    pub fn new(iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| FileCanError::Config("KDF iterations must be positive".into()))?;
        Ok(Self { iterations })
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<LessSafeKey> {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            password.as_bytes(),
            &mut key,
        );
        let unbound = UnboundKey::new(&AES_256_GCM, &key)
            .map_err(|_| FileCanError::Internal("failed to build AES-256-GCM key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl Default for AesGcmCipher {
    fn default() -> Self {
        Self {
            iterations: NonZeroU32::new(crate::config::KDF_ITERATIONS)
                .unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl CipherProvider for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
        if password.is_empty() {
            return Err(FileCanError::InvalidArgument(
                "cannot encrypt with an empty password".into(),
            ));
        }

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(password, &salt)?;
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(AAD),
            &mut in_out,
        )
        .map_err(|_| FileCanError::Internal("AES-256-GCM seal failed".into()))?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + in_out.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], password: &str) -> Result<Vec<u8>> {
        if password.is_empty() {
            return Err(FileCanError::DecryptionFailed(
                "object is encrypted but no password was supplied".into(),
            ));
        }
        if ciphertext.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(FileCanError::DecryptionFailed("ciphertext too short".into()));
        }

        let (salt, rest) = ciphertext.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| FileCanError::DecryptionFailed("bad nonce".into()))?;

        let key = self.derive_key(password, salt)?;
        let mut in_out = sealed.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(AAD), &mut in_out)
            .map_err(|_| {
                FileCanError::DecryptionFailed("wrong password or tampered data".into())
            })?;
        Ok(plaintext.to_vec())
    }
}
