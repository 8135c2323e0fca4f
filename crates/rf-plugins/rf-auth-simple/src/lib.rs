//! # rf-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Handles password hashing, bearer-token issue and the peppered token digest
//! that sessions are stored under.

use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::Engine;
use rf_core::traits::AuthProvider;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;

pub struct SimpleAuthProvider {
    /// Server-side secret mixed into every token digest, so a leaked
    /// sessions table cannot be replayed against another deployment.
    pepper: String,
}

impl SimpleAuthProvider {
    /// Accepts a pepper string (e.g., from an environment variable)
    pub fn new(pepper: &str) -> Self {
        Self { pepper: pepper.to_string() }
    }
}

fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("system randomness unavailable: {e}"))?;
    Ok(buf)
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    /// Result format is the PHC string, e.g. `$argon2id$v=19$...`.
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::encode_b64(&random_bytes::<SALT_BYTES>()?)
            .map_err(|e| anyhow!("failed to encode salt: {e}"))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_token(&self) -> anyhow::Result<String> {
        let bytes = random_bytes::<TOKEN_BYTES>()?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn token_digest(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pepper.as_bytes());
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}
