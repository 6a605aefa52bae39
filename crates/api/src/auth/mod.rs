//! Authentication core for Repforge

pub mod challenge;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod totp;

pub use challenge::{ChallengeError, ChallengeStore};
pub use jwt::{Claims, JwtError, JwtManager, TokenType};
pub use middleware::{
    extract_bearer, require_auth, require_mfa_confirmed_action, require_superuser,
    resolve_api_token, AuthUser,
};
pub use password::{
    generate_impossible_hash, hash_password, validate_password, verify_password, PasswordError,
};
pub use totp::TotpError;
