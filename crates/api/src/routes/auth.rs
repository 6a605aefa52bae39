//! Authentication routes: register, login, MFA login, refresh,
//! password change, OIDC login

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{
    auth::{
        generate_impossible_hash, hash_password, validate_password, verify_password, AuthUser,
    },
    config::AuthMethod,
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::{validate_username, DEFAULT_CATEGORIES};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginMfaRequest {
    pub username: String,
    /// Opaque code handed out by the password step of an MFA login
    pub pending_code: String,
    /// 6-digit TOTP code
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current: String,
    pub new: String,
}

#[derive(Debug, Deserialize)]
pub struct OidcLoginRequest {
    /// Authorization code from the provider redirect
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Response when login must continue with an MFA code
#[derive(Debug, Serialize)]
pub struct MfaRequiredResponse {
    pub username: String,
    /// Must be echoed back to /auth/login_mfa within five minutes
    pub pending_code: String,
}

/// Unified login response: tokens, or a pending MFA challenge
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Success(AuthResponse),
    MfaRequired(MfaRequiredResponse),
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct LoginRow {
    username: String,
    password: String,
    is_active: bool,
    mfa_enabled: bool,
}

#[derive(Debug, FromRow)]
struct MfaLoginRow {
    mfa_secret: Option<String>,
    mfa_enabled: bool,
    is_active: bool,
}

// =============================================================================
// Handlers
// =============================================================================

fn auth_response(state: &AppState, username: &str) -> ApiResult<AuthResponse> {
    let (access_token, refresh_token) = state.jwt.generate_token_pair(username)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
    })
}

/// Seed the default bloc categories for a freshly created user
pub(crate) async fn init_user_data(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    username: &str,
) -> Result<(), sqlx::Error> {
    for (name, color, weight) in DEFAULT_CATEGORIES {
        sqlx::query(
            "INSERT INTO bloc_categories (owner, name, color, weight) VALUES ($1, $2, $3, $4)",
        )
        .bind(username)
        .bind(name)
        .bind(color)
        .bind(weight)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Register a new local user
///
/// The very first account in an empty database becomes the superuser.
/// Registration returns tokens immediately; there is no verification step.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if !state.config.registration_enabled {
        return Err(ApiError::BadRequest("Registration is disabled".to_string()));
    }
    if state.config.auth_method == AuthMethod::Oidc {
        return Err(ApiError::BadRequest(
            "Local registration is disabled when OIDC is the auth method".to_string(),
        ));
    }

    if !validate_username(&req.username) {
        return Err(ApiError::Validation(
            "Username must be 1-19 characters: letters, digits, '_' or '-'".to_string(),
        ));
    }
    validate_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let password_hash = hash_password(&req.password)?;

    let mut tx = state.pool.begin().await?;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let is_su = user_count == 0;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (username, password, is_active, is_su)
        VALUES ($1, $2, TRUE, $3)
        ON CONFLICT (username) DO NOTHING
        "#,
    )
    .bind(&req.username)
    .bind(&password_hash)
    .bind(is_su)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    init_user_data(&mut tx, &req.username).await?;
    tx.commit().await?;

    tracing::info!(username = %req.username, is_su, "User registered");

    Ok(Json(auth_response(&state, &req.username)?))
}

/// Log in with username and password
///
/// Unknown users, inactive users and wrong passwords all produce the
/// same response. MFA-enabled users receive a pending challenge instead
/// of tokens.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    // Pad every outcome to the same minimum duration so response timing
    // does not reveal whether the username exists
    const MIN_RESPONSE_TIME: std::time::Duration = std::time::Duration::from_millis(500);

    let start = std::time::Instant::now();
    let result = login_inner(&state, req).await;

    let elapsed = start.elapsed();
    if elapsed < MIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_RESPONSE_TIME - elapsed).await;
    }

    result
}

async fn login_inner(state: &AppState, req: LoginRequest) -> ApiResult<Json<LoginResponse>> {
    let user: LoginRow = sqlx::query_as(
        "SELECT username, password, is_active, mfa_enabled FROM users WHERE username = $1",
    )
    .bind(&req.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    if !user.is_active {
        tracing::warn!(username = %user.username, "Login attempt for inactive user");
        return Err(ApiError::InvalidCredentials);
    }

    if !verify_password(&req.password, &user.password)? {
        return Err(ApiError::InvalidCredentials);
    }

    sqlx::query("UPDATE users SET last_connect = $1 WHERE username = $2")
        .bind(OffsetDateTime::now_utc())
        .bind(&user.username)
        .execute(&state.pool)
        .await?;

    if user.mfa_enabled {
        // Serialize with concurrent logins for the same username; the
        // guard is not held across any database call
        let _guard = state.challenges.user_lock(&user.username).await;
        let pending_code = state.challenges.issue(&user.username).await;
        return Ok(Json(LoginResponse::MfaRequired(MfaRequiredResponse {
            username: user.username,
            pending_code,
        })));
    }

    let tokens = auth_response(state, &user.username)?;
    Ok(Json(LoginResponse::Success(tokens)))
}

/// Complete an MFA login with the pending code and a TOTP code
///
/// The pending challenge is consumed whatever the outcome; a failed
/// attempt forces a fresh password login.
pub async fn login_mfa(
    State(state): State<AppState>,
    Json(req): Json<LoginMfaRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user: Option<MfaLoginRow> = sqlx::query_as(
        "SELECT mfa_secret, mfa_enabled, is_active FROM users WHERE username = $1",
    )
    .bind(&req.username)
    .fetch_optional(&state.pool)
    .await?;

    {
        let _guard = state.challenges.user_lock(&req.username).await;
        state
            .challenges
            .consume(&req.username, &req.pending_code)
            .await
            .map_err(|e| {
                tracing::warn!(username = %req.username, error = %e, "MFA challenge rejected");
                ApiError::Unauthorized
            })?;
    }

    let user = user.ok_or(ApiError::Unauthorized)?;
    if !user.is_active || !user.mfa_enabled {
        return Err(ApiError::Unauthorized);
    }
    let secret = user.mfa_secret.ok_or(ApiError::Unauthorized)?;

    if !crate::auth::totp::verify_code(&secret, &req.code, &req.username)? {
        return Err(ApiError::InvalidMfaCode);
    }

    Ok(Json(auth_response(&state, &req.username)?))
}

/// Mint a fresh access token from a refresh token
///
/// Never re-checks password or MFA, and never rotates the refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AccessTokenResponse>> {
    let claims = state
        .jwt
        .validate_token(&req.refresh_token, crate::auth::TokenType::Refresh)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(&claims.sub)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::Unauthorized);
    }

    let access_token = state.jwt.generate_access_token(&claims.sub)?;
    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Change the caller's password (requires the current one)
pub async fn update_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdatePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let current_hash: String = sqlx::query_scalar("SELECT password FROM users WHERE username = $1")
        .bind(&auth_user.username)
        .fetch_one(&state.pool)
        .await?;

    if !verify_password(&req.current, &current_hash)? {
        return Err(ApiError::Forbidden);
    }

    validate_password(&req.new).map_err(|e| ApiError::Validation(e.to_string()))?;
    let new_hash = hash_password(&req.new)?;

    sqlx::query("UPDATE users SET password = $1 WHERE username = $2")
        .bind(&new_hash)
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    tracing::info!(username = %auth_user.username, "Password changed");
    Ok(Json(serde_json::json!({})))
}

/// Log in through the configured OIDC provider
///
/// The federated identity is exchanged once for the same local token
/// format used everywhere else. First-time users are auto-provisioned
/// with an unusable password and are never superusers.
pub async fn oidc_login(
    State(state): State<AppState>,
    Json(req): Json<OidcLoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if state.config.auth_method != AuthMethod::Oidc {
        return Err(ApiError::BadRequest(
            "OIDC login is disabled when the auth method is local".to_string(),
        ));
    }
    let client = state.oidc.as_ref().ok_or(ApiError::Internal)?;

    let username = client.authenticate(&req.code).await?;

    if !validate_username(&username) {
        return Err(ApiError::BadRequest(format!(
            "Federated username '{username}' is not usable locally"
        )));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(&username)
        .fetch_one(&state.pool)
        .await?;

    if !exists {
        let password_hash = generate_impossible_hash()?;
        let mut tx = state.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO users (username, password, is_active, is_su)
            VALUES ($1, $2, TRUE, FALSE)
            "#,
        )
        .bind(&username)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;
        init_user_data(&mut tx, &username).await?;
        tx.commit().await?;
        tracing::info!(username = %username, "Auto-provisioned OIDC user");
    }

    sqlx::query("UPDATE users SET last_connect = $1 WHERE username = $2")
        .bind(OffsetDateTime::now_utc())
        .bind(&username)
        .execute(&state.pool)
        .await?;

    Ok(Json(auth_response(&state, &username)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_success_shape() {
        let response = LoginResponse::Success(AuthResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["access_token"], "a");
        assert!(json.get("pending_code").is_none());
    }

    #[test]
    fn test_login_response_mfa_shape() {
        let response = LoginResponse::MfaRequired(MfaRequiredResponse {
            username: "alice".to_string(),
            pending_code: "abc123".to_string(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["pending_code"], "abc123");
        assert!(json.get("access_token").is_none());
    }
}
