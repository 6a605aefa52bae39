//! JWT access and refresh token management

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Distinguishes access tokens from refresh tokens so one can never be
/// presented where the other is expected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims
///
/// `iat`/`exp` are unix epoch seconds, always. Mixing temporal
/// representations between encode and decode silently disables expiry
/// checking, so the codec owns the conversion in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the token holder
    pub sub: String,
    /// Issued at (unix timestamp)
    pub iat: i64,
    /// Expiry (unix timestamp)
    pub exp: i64,
    /// Token type
    pub token_type: TokenType,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Signs and validates the service's own tokens (HS256 only; OIDC ID-token
/// verification lives in the oidc module)
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, access_ttl_minutes: i64, refresh_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl: Duration::minutes(access_ttl_minutes),
            refresh_token_ttl: Duration::minutes(refresh_ttl_minutes),
        }
    }

    /// Generate a short-lived access token
    pub fn generate_access_token(&self, username: &str) -> Result<String, JwtError> {
        self.generate_token(username, TokenType::Access, self.access_token_ttl)
    }

    /// Generate a long-lived refresh token
    pub fn generate_refresh_token(&self, username: &str) -> Result<String, JwtError> {
        self.generate_token(username, TokenType::Refresh, self.refresh_token_ttl)
    }

    /// Generate both tokens for a fresh login
    pub fn generate_token_pair(&self, username: &str) -> Result<(String, String), JwtError> {
        Ok((
            self.generate_access_token(username)?,
            self.generate_refresh_token(username)?,
        ))
    }

    fn generate_token(
        &self,
        username: &str,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: username.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate a token and return its claims
    ///
    /// Fails with `Expired` for any token whose expiry has passed,
    /// `WrongTokenType` when an access token is presented as a refresh
    /// token or vice versa, and `Invalid` for everything else.
    pub fn validate_token(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: a token minted with a zero TTL must already be expired
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            }
        })?;

        // The library treats exp == now as still valid; we do not
        if data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(JwtError::Expired);
        }

        if data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        if data.claims.sub.is_empty() {
            return Err(JwtError::Invalid);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret-key-at-least-32-characters", 30, 1440)
    }

    #[test]
    fn test_access_token_roundtrip() {
        let jwt = manager();
        let token = jwt.generate_access_token("alice").unwrap();
        let claims = jwt.validate_token(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_roundtrip() {
        let jwt = manager();
        let token = jwt.generate_refresh_token("alice").unwrap();
        let claims = jwt.validate_token(&token, TokenType::Refresh).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let jwt = manager();
        let refresh = jwt.generate_refresh_token("alice").unwrap();
        assert!(matches!(
            jwt.validate_token(&refresh, TokenType::Access),
            Err(JwtError::WrongTokenType)
        ));

        let access = jwt.generate_access_token("alice").unwrap();
        assert!(matches!(
            jwt.validate_token(&access, TokenType::Refresh),
            Err(JwtError::WrongTokenType)
        ));
    }

    #[test]
    fn test_zero_ttl_token_is_already_expired() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-characters", 0, 0);
        let token = jwt.generate_access_token("alice").unwrap();
        assert!(matches!(
            jwt.validate_token(&token, TokenType::Access),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let jwt = manager();
        assert!(matches!(
            jwt.validate_token("not.a.token", TokenType::Access),
            Err(JwtError::Invalid)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let jwt = manager();
        let other = JwtManager::new("another-secret-key-also-32-characters!", 30, 1440);
        let token = jwt.generate_access_token("alice").unwrap();
        assert!(matches!(
            other.validate_token(&token, TokenType::Access),
            Err(JwtError::Invalid)
        ));
    }

    #[test]
    fn test_refresh_mints_repeatedly_until_expiry() {
        let jwt = manager();
        let refresh = jwt.generate_refresh_token("alice").unwrap();
        // The refresh token stays valid across repeated access-token mints
        for _ in 0..3 {
            let claims = jwt.validate_token(&refresh, TokenType::Refresh).unwrap();
            let access = jwt.generate_access_token(&claims.sub).unwrap();
            assert!(jwt.validate_token(&access, TokenType::Access).is_ok());
        }
    }
}
