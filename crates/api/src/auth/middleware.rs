//! Request authentication middleware and authorization helpers

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;

use crate::{
    auth::{jwt::TokenType, totp},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Authenticated caller, inserted as a request extension by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub is_su: bool,
    pub mfa_enabled: bool,
}

#[derive(sqlx::FromRow)]
struct UserAuthRow {
    username: String,
    is_su: bool,
    mfa_enabled: bool,
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// Authentication middleware for protected routes
///
/// Decodes the access token, loads the user row, and inserts `AuthUser`.
/// `is_active` is deliberately not rechecked here: active status is
/// enforced at login, and deactivation takes effect at token expiry.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = extract_bearer(req.headers())?;
    let claims = state.jwt.validate_token(token, TokenType::Access)?;

    let user: UserAuthRow = sqlx::query_as(
        "SELECT username, is_su, mfa_enabled FROM users WHERE username = $1",
    )
    .bind(&claims.sub)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(AuthUser {
        username: user.username,
        is_su: user.is_su,
        mfa_enabled: user.mfa_enabled,
    });

    Ok(next.run(req).await)
}

/// Superuser gate for the admin namespace
pub fn require_superuser(auth_user: &AuthUser) -> ApiResult<()> {
    if auth_user.is_su {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Double gate for admin mutations on user accounts: superuser role AND a
/// live TOTP code from an enrolled authenticator
pub async fn require_mfa_confirmed_action(
    pool: &PgPool,
    auth_user: &AuthUser,
    code: &str,
) -> ApiResult<()> {
    require_superuser(auth_user)?;

    let secret: Option<String> =
        sqlx::query_scalar("SELECT mfa_secret FROM users WHERE username = $1 AND mfa_enabled")
            .bind(&auth_user.username)
            .fetch_optional(pool)
            .await?
            .flatten();

    // Admin mutations are refused outright until the superuser enrolls MFA
    let secret = secret.ok_or(ApiError::Forbidden)?;

    if !totp::verify_code(&secret, code, &auth_user.username)? {
        return Err(ApiError::InvalidMfaCode);
    }
    Ok(())
}

/// Alternate identity path for machine clients, used only by stash
/// ingestion: resolve a user from their opaque API token
pub async fn resolve_api_token(pool: &PgPool, token: &str) -> ApiResult<String> {
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    sqlx::query_scalar("SELECT username FROM users WHERE api_token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::Unauthorized)
}
