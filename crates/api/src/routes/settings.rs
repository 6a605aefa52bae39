//! Account settings: MFA enrollment lifecycle, API token, data export

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{totp, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::{
    Bloc, BlocCategory, HealthWatchData, Pr, PrValue, Program, ProgramStep, ProgramStepBloc,
    StashItem,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MfaEnrollResponse {
    /// Base32 secret for manual authenticator entry
    pub secret: String,
    pub uri: String,
    /// PNG data URL for in-browser display
    pub qr: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ApiTokenResponse {
    pub api_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// TOTP code, required once MFA is enabled
    pub code: Option<String>,
}

#[derive(sqlx::FromRow)]
struct MfaStatusRow {
    mfa_enabled: bool,
    mfa_secret: Option<String>,
}

async fn mfa_status(state: &AppState, username: &str) -> ApiResult<MfaStatusRow> {
    let row = sqlx::query_as("SELECT mfa_enabled, mfa_secret FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(&state.pool)
        .await?;
    Ok(row)
}

// =============================================================================
// MFA Enrollment
// =============================================================================

/// Begin MFA enrollment: store an unconfirmed secret and return it with
/// the otpauth URI and a QR code
///
/// The secret only takes effect once a code is confirmed via
/// `mfa_verify`. Re-enrolling before confirmation replaces the secret.
pub async fn mfa_enable(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MfaEnrollResponse>> {
    let status = mfa_status(&state, &auth_user.username).await?;
    if status.mfa_enabled {
        return Err(ApiError::BadRequest("MFA is already enabled".to_string()));
    }

    let secret = totp::generate_secret();
    let uri = totp::get_otpauth_uri(&secret, &auth_user.username)?;
    let qr = totp::generate_qr_code(&secret, &auth_user.username)?;

    sqlx::query("UPDATE users SET mfa_secret = $1, mfa_enabled = FALSE WHERE username = $2")
        .bind(&secret)
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    Ok(Json(MfaEnrollResponse { secret, uri, qr }))
}

/// Confirm MFA enrollment with a code from the authenticator
///
/// A wrong code discards the pending secret entirely, forcing the user
/// to restart enrollment with a fresh one.
pub async fn mfa_verify(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<MfaCodeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = mfa_status(&state, &auth_user.username).await?;
    if status.mfa_enabled {
        return Err(ApiError::BadRequest("MFA is already enabled".to_string()));
    }
    let secret = status
        .mfa_secret
        .ok_or_else(|| ApiError::BadRequest("MFA enrollment has not been started".to_string()))?;

    if !totp::verify_code(&secret, &req.code, &auth_user.username)? {
        sqlx::query("UPDATE users SET mfa_secret = NULL WHERE username = $1")
            .bind(&auth_user.username)
            .execute(&state.pool)
            .await?;
        return Err(ApiError::InvalidMfaCode);
    }

    sqlx::query("UPDATE users SET mfa_enabled = TRUE WHERE username = $1")
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    tracing::info!(username = %auth_user.username, "MFA enabled");
    Ok(Json(serde_json::json!({})))
}

/// Disable MFA; requires a valid current code
pub async fn mfa_disable(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<MfaCodeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = mfa_status(&state, &auth_user.username).await?;
    if !status.mfa_enabled {
        return Err(ApiError::BadRequest("MFA is not enabled".to_string()));
    }
    let secret = status.mfa_secret.ok_or(ApiError::Internal)?;

    if !totp::verify_code(&secret, &req.code, &auth_user.username)? {
        return Err(ApiError::InvalidMfaCode);
    }

    sqlx::query("UPDATE users SET mfa_enabled = FALSE, mfa_secret = NULL WHERE username = $1")
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    // A half-finished MFA login for this user is no longer completable
    state.challenges.remove(&auth_user.username).await;

    tracing::info!(username = %auth_user.username, "MFA disabled");
    Ok(Json(serde_json::json!({})))
}

// =============================================================================
// API Token
// =============================================================================

/// Issue (or rotate) the caller's API token for machine clients
pub async fn create_api_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ApiTokenResponse>> {
    let token = Uuid::new_v4().to_string();

    sqlx::query("UPDATE users SET api_token = $1 WHERE username = $2")
        .bind(&token)
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    Ok(Json(ApiTokenResponse { api_token: token }))
}

/// Revoke the caller's API token
pub async fn delete_api_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    sqlx::query("UPDATE users SET api_token = NULL WHERE username = $1")
        .bind(&auth_user.username)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

// =============================================================================
// Data Export
// =============================================================================

/// Export everything the caller owns as a single JSON document
///
/// Once MFA is enabled, a live code is required so a hijacked browser
/// session cannot exfiltrate the full account.
pub async fn export_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    if auth_user.mfa_enabled {
        let status = mfa_status(&state, &auth_user.username).await?;
        let secret = status.mfa_secret.ok_or(ApiError::Internal)?;
        let code = query.code.as_deref().ok_or(ApiError::InvalidMfaCode)?;
        if !totp::verify_code(&secret, code, &auth_user.username)? {
            return Err(ApiError::InvalidMfaCode);
        }
    }

    let categories: Vec<BlocCategory> =
        sqlx::query_as("SELECT * FROM bloc_categories WHERE owner = $1 ORDER BY weight")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    let blocs: Vec<Bloc> = sqlx::query_as("SELECT * FROM blocs WHERE owner = $1 ORDER BY cdate")
        .bind(&auth_user.username)
        .fetch_all(&state.pool)
        .await?;

    let prs: Vec<Pr> = sqlx::query_as("SELECT * FROM prs WHERE owner = $1 ORDER BY name")
        .bind(&auth_user.username)
        .fetch_all(&state.pool)
        .await?;

    let pr_values: Vec<PrValue> = sqlx::query_as(
        r#"
        SELECT v.* FROM pr_values v
        JOIN prs p ON p.id = v.pr_id
        WHERE p.owner = $1
        ORDER BY v.cdate
        "#,
    )
    .bind(&auth_user.username)
    .fetch_all(&state.pool)
    .await?;

    let programs: Vec<Program> = sqlx::query_as("SELECT * FROM programs WHERE owner = $1")
        .bind(&auth_user.username)
        .fetch_all(&state.pool)
        .await?;

    let program_steps: Vec<ProgramStep> = sqlx::query_as(
        r#"
        SELECT s.* FROM program_steps s
        JOIN programs p ON p.id = s.program_id
        WHERE p.owner = $1
        "#,
    )
    .bind(&auth_user.username)
    .fetch_all(&state.pool)
    .await?;

    let program_step_blocs: Vec<ProgramStepBloc> = sqlx::query_as(
        r#"
        SELECT b.* FROM program_step_blocs b
        JOIN program_steps s ON s.id = b.step_id
        JOIN programs p ON p.id = s.program_id
        WHERE p.owner = $1
        "#,
    )
    .bind(&auth_user.username)
    .fetch_all(&state.pool)
    .await?;

    let stash: Vec<StashItem> = sqlx::query_as("SELECT * FROM stash WHERE owner = $1")
        .bind(&auth_user.username)
        .fetch_all(&state.pool)
        .await?;

    let health_watch_data: Vec<HealthWatchData> =
        sqlx::query_as("SELECT * FROM health_watch_data WHERE owner = $1 ORDER BY cdate")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(serde_json::json!({
        "username": auth_user.username,
        "exported_at": time::OffsetDateTime::now_utc().unix_timestamp(),
        "categories": categories,
        "blocs": blocs,
        "prs": prs,
        "pr_values": pr_values,
        "programs": programs,
        "program_steps": program_steps,
        "program_step_blocs": program_step_blocs,
        "stash": stash,
        "health_watch_data": health_watch_data,
    })))
}
