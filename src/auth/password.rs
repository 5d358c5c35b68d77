use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::auth::error::{AuthError, AuthResult};

/// Minimum plaintext length, checked before hashing.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a plaintext password with a fresh random salt.
///
/// Hashing happens exactly once, at account creation. A value that already
/// parses as a PHC digest is returned unchanged so an update path that did
/// not touch the password can never hash the hash.
pub fn hash_password(plain: &str) -> AuthResult<String> {
    if PasswordHash::new(plain).is_ok() {
        return Ok(plain.to_string());
    }
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AuthError::Hash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        AuthError::Hash(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let first = hash_password("abcdef").unwrap();
        let second = hash_password("abcdef").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn an_existing_digest_is_not_rehashed() {
        let hash = hash_password("abcdef").unwrap();
        let again = hash_password(&hash).unwrap();
        assert_eq!(hash, again);
        assert!(verify_password("abcdef", &again).unwrap());
    }
}
