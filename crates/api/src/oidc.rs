//! OIDC federation client
//!
//! Exchanges an authorization code with an external identity provider and
//! verifies the returned ID token, yielding the federated username. The
//! caller (the auth router) maps that username onto a local user record
//! and mints ordinary local tokens; no federation state survives login.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::OidcSettings;

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    /// Identity provider unreachable or returned a server error
    #[error("Identity provider error: {0}")]
    Upstream(String),
    /// The provider rejected the authorization code or the token failed
    /// signature/audience/expiry verification
    #[error("Identity provider rejected the login")]
    Unauthorized,
    /// The token or key material is unusable (unknown algorithm, missing
    /// key id, missing username claim)
    #[error("Bad OIDC response: {0}")]
    BadRequest(String),
}

/// OIDC discovery document (the fields this client needs)
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

/// A single JSON Web Key as served by the provider's JWKS endpoint
#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    preferred_username: Option<String>,
}

/// How the ID token signature is checked, resolved once per login from
/// the token header's algorithm
enum Verifier {
    /// HMAC-signed: the shared client secret is the key
    Symmetric,
    /// RSA-signed: the key is looked up by `kid` in the provider's JWKS
    Asymmetric { kid: String },
}

#[derive(Clone)]
pub struct OidcClient {
    http: reqwest::Client,
    settings: OidcSettings,
}

impl OidcClient {
    pub fn new(settings: OidcSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Run the full code-for-identity exchange, returning the federated
    /// username
    ///
    /// Any step failing is terminal; there is no partial login.
    pub async fn authenticate(&self, code: &str) -> Result<String, OidcError> {
        let discovery = self.discover().await?;
        let id_token = self.exchange_code(&discovery.token_endpoint, code).await?;
        self.verify_id_token(&id_token, &discovery.jwks_uri).await
    }

    /// Fetch {issuer}/.well-known/openid-configuration
    async fn discover(&self) -> Result<DiscoveryDocument, OidcError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            self.settings.issuer
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OidcError::Upstream(format!("discovery request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Upstream(format!(
                "discovery returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OidcError::Upstream(format!("invalid discovery document: {e}")))
    }

    /// Exchange the authorization code for tokens at the discovered
    /// token endpoint
    async fn exchange_code(&self, token_endpoint: &str, code: &str) -> Result<String, OidcError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| OidcError::Upstream(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "OIDC code exchange rejected");
            return Err(OidcError::Unauthorized);
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| OidcError::BadRequest(format!("invalid token response: {e}")))?;

        Ok(tokens.id_token)
    }

    /// Verify the ID token and extract the username claim
    async fn verify_id_token(&self, id_token: &str, jwks_uri: &str) -> Result<String, OidcError> {
        let header = decode_header(id_token)
            .map_err(|e| OidcError::BadRequest(format!("malformed ID token header: {e}")))?;

        let verifier = match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Verifier::Symmetric,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => Verifier::Asymmetric {
                kid: header
                    .kid
                    .clone()
                    .ok_or_else(|| OidcError::BadRequest("ID token has no key id".to_string()))?,
            },
            other => {
                return Err(OidcError::BadRequest(format!(
                    "unsupported ID token algorithm: {other:?}"
                )))
            }
        };

        let decoding_key = match verifier {
            Verifier::Symmetric => {
                DecodingKey::from_secret(self.settings.client_secret.as_bytes())
            }
            Verifier::Asymmetric { kid } => {
                let jwks = self.fetch_jwks(jwks_uri).await?;
                let jwk = jwks
                    .keys
                    .iter()
                    .find(|k| k.kid.as_deref() == Some(kid.as_str()))
                    .ok_or_else(|| {
                        OidcError::BadRequest(format!("no JWKS key matches kid {kid}"))
                    })?;
                let (n, e) = match (&jwk.n, &jwk.e) {
                    (Some(n), Some(e)) => (n, e),
                    _ => {
                        return Err(OidcError::BadRequest(
                            "JWKS key is missing RSA components".to_string(),
                        ))
                    }
                };
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| OidcError::BadRequest(format!("unusable JWKS key: {e}")))?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.settings.client_id.as_str()]);

        let data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation).map_err(|e| {
            tracing::warn!(error = %e, "ID token verification failed");
            OidcError::Unauthorized
        })?;

        data.claims
            .preferred_username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                OidcError::BadRequest("ID token has no preferred_username claim".to_string())
            })
    }

    /// Fetch the provider's JWKS document
    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<Jwks, OidcError> {
        let response = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::BadRequest(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::BadRequest(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OidcError::BadRequest(format!("invalid JWKS document: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use time::OffsetDateTime;

    const CLIENT_ID: &str = "repforge";
    const CLIENT_SECRET: &str = "shared-client-secret-for-hs256-tests";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        aud: String,
        exp: i64,
        iat: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        preferred_username: Option<String>,
    }

    fn settings(issuer: &str) -> OidcSettings {
        OidcSettings {
            issuer: issuer.trim_end_matches('/').to_string(),
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            redirect_uri: "http://localhost/oidc".to_string(),
        }
    }

    fn hs256_id_token(username: Option<&str>, aud: &str, secret: &str) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = TestClaims {
            sub: "user-1234".to_string(),
            aud: aud.to_string(),
            exp: now + 300,
            iat: now,
            preferred_username: username.map(|u| u.to_string()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn mock_discovery(server: &mut mockito::ServerGuard) -> mockito::Mock {
        let url = server.url();
        server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"token_endpoint":"{url}/token","jwks_uri":"{url}/jwks"}}"#
            ))
            .create_async()
            .await
    }

    fn token_body(id_token: &str) -> String {
        format!(r#"{{"access_token":"at","token_type":"Bearer","id_token":"{id_token}"}}"#)
    }

    #[tokio::test]
    async fn test_hs256_login_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;
        let id_token = hs256_id_token(Some("alice"), CLIENT_ID, CLIENT_SECRET);
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(&id_token))
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        let username = client.authenticate("auth-code").await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn test_discovery_failure_is_upstream() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(503)
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        assert!(matches!(
            client.authenticate("auth-code").await,
            Err(OidcError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_code_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        assert!(matches!(
            client.authenticate("stale-code").await,
            Err(OidcError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_wrong_signature_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;
        let id_token = hs256_id_token(Some("alice"), CLIENT_ID, "a-different-secret-entirely");
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(&id_token))
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        assert!(matches!(
            client.authenticate("auth-code").await,
            Err(OidcError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_wrong_audience_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;
        let id_token = hs256_id_token(Some("alice"), "some-other-client", CLIENT_SECRET);
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(&id_token))
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        assert!(matches!(
            client.authenticate("auth-code").await,
            Err(OidcError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_missing_username_claim_is_bad_request() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;
        let id_token = hs256_id_token(None, CLIENT_ID, CLIENT_SECRET);
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(&id_token))
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        assert!(matches!(
            client.authenticate("auth-code").await,
            Err(OidcError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_rs256_missing_kid_in_jwks_is_bad_request() {
        let mut server = mockito::Server::new_async().await;
        let _discovery = mock_discovery(&mut server).await;

        // An RS256 token we only need to carry a header for; the JWKS
        // lookup fails before any signature check
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"unknown-key"}"#;
        use base64::Engine;
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let id_token = format!(
            "{}.{}.{}",
            b64.encode(header),
            b64.encode(r#"{"sub":"x"}"#),
            b64.encode("sig")
        );

        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(&id_token))
            .create_async()
            .await;
        let _jwks = server
            .mock("GET", "/jwks")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"keys":[{"kty":"RSA","kid":"other-key","n":"AQAB","e":"AQAB"}]}"#)
            .create_async()
            .await;

        let client = OidcClient::new(settings(&server.url()));
        match client.authenticate("auth-code").await {
            Err(OidcError::BadRequest(detail)) => assert!(detail.contains("unknown-key")),
            other => panic!("Expected BadRequest, got {other:?}"),
        }
    }
}
