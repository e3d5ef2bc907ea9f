//! Password hashing and random credential generation

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::{Rng, distributions::Alphanumeric};
use std::sync::LazyLock;

/// Length of the opaque session token
pub const SESSION_TOKEN_LENGTH: usize = 64;
/// Length of an API key
pub const API_KEY_LENGTH: usize = 48;

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password. A malformed stored hash is a mismatch, never a panic.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash of a random password nobody knows, built with the same parameters as
/// real hashes
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password(&random_token(32)).ok());

/// Run a full verification against [`DUMMY_HASH`]; always a mismatch
///
/// Used when the identifier matched no user, so the response takes as long
/// as a wrong password for a real account.
pub fn verify_dummy_password(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Random alphanumeric string from the thread-local CSPRNG
pub fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn new_session_token() -> String {
    random_token(SESSION_TOKEN_LENGTH)
}

pub fn new_api_key() -> String {
    random_token(API_KEY_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn dummy_verification_never_matches() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(PasswordHash::new(hash).is_ok());
        assert!(!verify_dummy_password(""));
        assert!(!verify_dummy_password("secret1"));
    }

    #[test]
    fn tokens_have_expected_shape() {
        let token = new_session_token();
        assert_eq!(token.len(), SESSION_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, new_session_token());
        assert_eq!(new_api_key().len(), API_KEY_LENGTH);
    }
}
