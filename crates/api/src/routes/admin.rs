//! Admin user management
//!
//! Every mutation in this namespace requires the superuser role plus a
//! live TOTP code from the admin's own enrolled authenticator. Superuser
//! accounts themselves are never valid targets.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{
    auth::{
        hash_password, require_mfa_confirmed_action, require_superuser, validate_password, AuthUser,
    },
    error::{ApiError, ApiResult},
    routes::auth::init_user_data,
    state::AppState,
};
use repforge_shared::validate_username;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize, FromRow)]
pub struct AdminUserView {
    pub username: String,
    pub is_active: bool,
    pub is_su: bool,
    pub mfa_enabled: bool,
    pub last_connect: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    /// Admin's own TOTP code
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub code: String,
}

#[derive(FromRow)]
struct TargetRow {
    is_su: bool,
}

/// Load the target account, refusing superusers as targets
async fn load_target(state: &AppState, username: &str) -> ApiResult<()> {
    let target: TargetRow = sqlx::query_as("SELECT is_su FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

    if target.is_su {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// List every account (read-only, no MFA code needed)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<AdminUserView>>> {
    require_superuser(&auth_user)?;

    let users: Vec<AdminUserView> = sqlx::query_as(
        "SELECT username, is_active, is_su, mfa_enabled, last_connect FROM users ORDER BY username",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users))
}

/// Create an account on behalf of a user
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<AdminUserView>> {
    require_mfa_confirmed_action(&state.pool, &auth_user, &req.code).await?;

    if !validate_username(&req.username) {
        return Err(ApiError::Validation(
            "Username must be 1-19 characters: letters, digits, '_' or '-'".to_string(),
        ));
    }
    validate_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let password_hash = hash_password(&req.password)?;

    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO users (username, password, is_active, is_su)
        VALUES ($1, $2, TRUE, FALSE)
        ON CONFLICT (username) DO NOTHING
        "#,
    )
    .bind(&req.username)
    .bind(&password_hash)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    init_user_data(&mut tx, &req.username).await?;
    tx.commit().await?;

    tracing::info!(admin = %auth_user.username, username = %req.username, "Admin created user");

    Ok(Json(AdminUserView {
        username: req.username,
        is_active: true,
        is_su: false,
        mfa_enabled: false,
        last_connect: None,
    }))
}

/// Set a new password for the target account
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(username): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_mfa_confirmed_action(&state.pool, &auth_user, &req.code).await?;
    load_target(&state, &username).await?;

    validate_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;
    let password_hash = hash_password(&req.password)?;

    sqlx::query("UPDATE users SET password = $1 WHERE username = $2")
        .bind(&password_hash)
        .bind(&username)
        .execute(&state.pool)
        .await?;

    tracing::info!(admin = %auth_user.username, username = %username, "Admin reset password");
    Ok(Json(serde_json::json!({})))
}

/// Clear the target's MFA enrollment so they can log in with password
/// alone and re-enroll
pub async fn reset_mfa(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(username): Path<String>,
    Json(req): Json<AdminActionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_mfa_confirmed_action(&state.pool, &auth_user, &req.code).await?;
    load_target(&state, &username).await?;

    sqlx::query("UPDATE users SET mfa_enabled = FALSE, mfa_secret = NULL WHERE username = $1")
        .bind(&username)
        .execute(&state.pool)
        .await?;

    state.challenges.remove(&username).await;

    tracing::info!(admin = %auth_user.username, username = %username, "Admin reset MFA");
    Ok(Json(serde_json::json!({})))
}

/// Flip the target's active flag
///
/// Deactivation blocks new logins; tokens already issued remain valid
/// until they expire.
pub async fn toggle_active(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(username): Path<String>,
    Json(req): Json<AdminActionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_mfa_confirmed_action(&state.pool, &auth_user, &req.code).await?;
    load_target(&state, &username).await?;

    let is_active: bool = sqlx::query_scalar(
        "UPDATE users SET is_active = NOT is_active WHERE username = $1 RETURNING is_active",
    )
    .bind(&username)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(admin = %auth_user.username, username = %username, is_active, "Admin toggled active");
    Ok(Json(serde_json::json!({ "is_active": is_active })))
}

/// Delete the target account and, via cascade, everything it owns
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(username): Path<String>,
    Json(req): Json<AdminActionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_mfa_confirmed_action(&state.pool, &auth_user, &req.code).await?;
    load_target(&state, &username).await?;

    sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(&username)
        .execute(&state.pool)
        .await?;

    tracing::warn!(admin = %auth_user.username, username = %username, "Admin deleted user");
    Ok(Json(serde_json::json!({})))
}
