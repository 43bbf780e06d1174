use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

use crate::error::{HubError, HubResult};

/// Hash a password using Argon2id. The default parameter set uses a
/// memory cost well above bcrypt's 12-round equivalent, satisfying the
/// "memory-hard, salted, adaptive" requirement.
pub fn hash_password(password: &str) -> HubResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HubError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 PHC-string digest.
pub fn verify_password(password: &str, digest: &str) -> HubResult<bool> {
    let parsed_hash = PasswordHash::new(digest)
        .map_err(|e| HubError::Internal(anyhow::anyhow!("invalid stored password digest: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Mint a fresh bearer token: 32 bytes (256 bits) of OS randomness,
/// base64url-encoded without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time comparison of a passphrase's digest against a stored
/// one — used by room join, where timing must not leak how many
/// leading bytes of the guess matched.
pub fn verify_passphrase(passphrase: &str, digest: &str) -> bool {
    verify_password(passphrase, digest).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let digest = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &digest).unwrap());
        assert!(!verify_password("wrong", &digest).unwrap());
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(a.len() >= 32);
    }
}
