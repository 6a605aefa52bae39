//! Application configuration

use std::env;

/// Selects which login flow the service exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Local,
    Oidc,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Oidc => write!(f, "oidc"),
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "oidc" => Ok(Self::Oidc),
            _ => Err(ConfigError::Invalid("AUTH_METHOD must be 'local' or 'oidc'")),
        }
    }
}

/// OIDC provider settings, required only when AUTH_METHOD=oidc
#[derive(Debug, Clone)]
pub struct OidcSettings {
    /// Issuer base URL; discovery is fetched from
    /// {issuer}/.well-known/openid-configuration
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Authentication
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_minutes: i64,
    pub auth_method: AuthMethod,
    pub registration_enabled: bool,

    // OIDC federation
    pub oidc: Option<OidcSettings>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_method: AuthMethod = env::var("AUTH_METHOD")
            .unwrap_or_else(|_| "local".to_string())
            .parse()?;

        let oidc = match (
            env::var("OIDC_ISSUER"),
            env::var("OIDC_CLIENT_ID"),
            env::var("OIDC_CLIENT_SECRET"),
            env::var("OIDC_REDIRECT_URI"),
        ) {
            (Ok(issuer), Ok(client_id), Ok(client_secret), Ok(redirect_uri)) => {
                Some(OidcSettings {
                    issuer: issuer.trim_end_matches('/').to_string(),
                    client_id,
                    client_secret,
                    redirect_uri,
                })
            }
            _ => None,
        };

        if auth_method == AuthMethod::Oidc && oidc.is_none() {
            return Err(ConfigError::Invalid(
                "AUTH_METHOD=oidc requires OIDC_ISSUER, OIDC_CLIENT_ID, OIDC_CLIENT_SECRET and OIDC_REDIRECT_URI",
            ));
        }

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            jwt_secret: {
                let secret =
                    env::var("SECRET_KEY").map_err(|_| ConfigError::Missing("SECRET_KEY"))?;
                // Tokens are HMAC-signed; a short key makes them forgeable
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SECRET_KEY must be at least 32 characters",
                    ));
                }
                secret
            },
            access_token_expire_minutes: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            refresh_token_expire_minutes: env::var("REFRESH_TOKEN_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "1440".to_string())
                .parse()
                .unwrap_or(1440),
            auth_method,
            registration_enabled: env::var("REGISTRATION_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            oidc,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "SECRET_KEY",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        env::remove_var("AUTH_METHOD");
        env::remove_var("OIDC_ISSUER");
        env::remove_var("OIDC_CLIENT_ID");
        env::remove_var("OIDC_CLIENT_SECRET");
        env::remove_var("OIDC_REDIRECT_URI");
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("SECRET_KEY");
        env::remove_var("AUTH_METHOD");
        env::remove_var("ACCESS_TOKEN_EXPIRE_MINUTES");
        env::remove_var("REFRESH_TOKEN_EXPIRE_MINUTES");
        env::remove_var("REGISTRATION_ENABLED");
        env::remove_var("OIDC_ISSUER");
        env::remove_var("OIDC_CLIENT_ID");
        env::remove_var("OIDC_CLIENT_SECRET");
        env::remove_var("OIDC_REDIRECT_URI");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.auth_method, AuthMethod::Local);
        assert_eq!(config.access_token_expire_minutes, 30);
        assert_eq!(config.refresh_token_expire_minutes, 1440);
        assert!(config.registration_enabled);
        assert!(config.oidc.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_secret_key() {
        setup_minimal_config();
        env::remove_var("SECRET_KEY");

        match Config::from_env() {
            Err(ConfigError::Missing("SECRET_KEY")) => {}
            other => panic!("Expected Missing error for SECRET_KEY, got: {:?}", other),
        }

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_secret_rejected() {
        setup_minimal_config();
        env::set_var("SECRET_KEY", "short");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_oidc_method_requires_provider_settings() {
        setup_minimal_config();
        env::set_var("AUTH_METHOD", "oidc");

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        env::set_var("OIDC_ISSUER", "https://idp.example.com/realms/fit/");
        env::set_var("OIDC_CLIENT_ID", "repforge");
        env::set_var("OIDC_CLIENT_SECRET", "s3cret");
        env::set_var("OIDC_REDIRECT_URI", "https://fit.example.com/oidc");

        let config = Config::from_env().unwrap();
        assert_eq!(config.auth_method, AuthMethod::Oidc);
        let oidc = config.oidc.unwrap();
        // Trailing slash is stripped so discovery URLs join cleanly
        assert_eq!(oidc.issuer, "https://idp.example.com/realms/fit");

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_auth_method() {
        setup_minimal_config();
        env::set_var("AUTH_METHOD", "ldap");

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
