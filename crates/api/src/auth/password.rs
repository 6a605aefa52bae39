//! Password hashing with Argon2

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Generate a cryptographically random "impossible" password hash
///
/// Used for OIDC-provisioned users who have no local password. The hash is
/// valid Argon2 format but the password is unknowable, so the local login
/// path can never succeed against it.
pub fn generate_impossible_hash() -> Result<String, PasswordError> {
    use argon2::password_hash::rand_core::RngCore;

    let mut random_bytes = [0u8; 64];
    OsRng.fill_bytes(&mut random_bytes);

    let random_password = hex::encode(random_bytes);
    hash_password(&random_password)
}

/// Verify a password against a hash
///
/// A wrong password is `Ok(false)`; a corrupt or unsupported stored hash is
/// an error. The route boundary collapses both into the same client-facing
/// "invalid credentials" response.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Validate password length bounds
pub fn validate_password(password: &str) -> Result<(), PasswordValidationError> {
    if password.len() < 8 {
        return Err(PasswordValidationError::TooShort);
    }
    if password.len() > 128 {
        return Err(PasswordValidationError::TooLong);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Password must be at least 8 characters")]
    TooShort,
    #[error("Password must be at most 128 characters")]
    TooLong,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "open-sesame-99";
        let hash = hash_password(password).expect("Failed to hash password");

        assert!(verify_password(password, &hash).expect("Verification failed"));
        assert!(!verify_password("open-sesame-99x", &hash).expect("Verification failed"));
    }

    #[test]
    fn test_hashing_is_salted() {
        let password = "open-sesame-99";
        let hash_a = hash_password(password).unwrap();
        let hash_b = hash_password(password).unwrap();

        // Fresh salt per call, but both verify
        assert_ne!(hash_a, hash_b);
        assert!(verify_password(password, &hash_a).unwrap());
        assert!(verify_password(password, &hash_b).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("whatever", "not-an-argon2-hash").is_err());
        assert!(verify_password("whatever", "").is_err());
    }

    #[test]
    fn test_impossible_hash_never_verifies_common_input() {
        let hash = generate_impossible_hash().unwrap();
        assert!(!verify_password("", &hash).unwrap());
        assert!(!verify_password("password", &hash).unwrap());
        // Two impossible hashes never collide
        assert_ne!(hash, generate_impossible_hash().unwrap());
    }

    #[test]
    fn test_password_validation_bounds() {
        assert!(matches!(
            validate_password("short1!"),
            Err(PasswordValidationError::TooShort)
        ));
        assert!(validate_password("12345678").is_ok());

        let long_password = "a".repeat(129);
        assert!(matches!(
            validate_password(&long_password),
            Err(PasswordValidationError::TooLong)
        ));
    }
}
