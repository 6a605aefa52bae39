//! Personal record tracking

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Deserialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::{value_matches_key, Pr, PrValue, RecordKey};

#[derive(Debug, Deserialize)]
pub struct PrRequest {
    pub name: String,
    pub key: RecordKey,
}

#[derive(Debug, Deserialize)]
pub struct PrValueRequest {
    pub value: String,
    pub cdate: Date,
}

#[derive(FromRow)]
struct PrOwnerRow {
    owner: String,
    key: RecordKey,
}

/// Distinguish a missing PR (404) from someone else's (403); returns the
/// PR's record key for value validation
async fn check_pr_owner(state: &AppState, id: Uuid, username: &str) -> ApiResult<RecordKey> {
    let row: PrOwnerRow = sqlx::query_as("SELECT owner, key FROM prs WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.owner != username {
        return Err(ApiError::Forbidden);
    }
    Ok(row.key)
}

pub async fn list_prs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Pr>>> {
    let prs: Vec<Pr> = sqlx::query_as("SELECT * FROM prs WHERE owner = $1 ORDER BY name")
        .bind(&auth_user.username)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(prs))
}

pub async fn create_pr(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PrRequest>,
) -> ApiResult<Json<Pr>> {
    if req.name.trim().is_empty() || req.name.len() > 128 {
        return Err(ApiError::Validation(
            "PR name must be 1-128 characters".to_string(),
        ));
    }

    let pr: Pr = sqlx::query_as(
        "INSERT INTO prs (owner, name, key) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&auth_user.username)
    .bind(&req.name)
    .bind(req.key)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(pr))
}

/// Rename a PR, or change its record key while it has no values yet
pub async fn update_pr(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<PrRequest>,
) -> ApiResult<Json<Pr>> {
    let current_key = check_pr_owner(&state, id, &auth_user.username).await?;

    if req.name.trim().is_empty() || req.name.len() > 128 {
        return Err(ApiError::Validation(
            "PR name must be 1-128 characters".to_string(),
        ));
    }

    if req.key != current_key {
        let has_values: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pr_values WHERE pr_id = $1)")
                .bind(id)
                .fetch_one(&state.pool)
                .await?;
        if has_values {
            return Err(ApiError::Validation(
                "Cannot change the record key of a PR with recorded values".to_string(),
            ));
        }
    }

    let pr: Pr = sqlx::query_as("UPDATE prs SET name = $1, key = $2 WHERE id = $3 RETURNING *")
        .bind(&req.name)
        .bind(req.key)
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(pr))
}

/// Delete a PR and its whole value history
pub async fn delete_pr(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    check_pr_owner(&state, id, &auth_user.username).await?;

    sqlx::query("DELETE FROM prs WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

pub async fn list_pr_values(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PrValue>>> {
    check_pr_owner(&state, id, &auth_user.username).await?;

    let values: Vec<PrValue> =
        sqlx::query_as("SELECT * FROM pr_values WHERE pr_id = $1 ORDER BY cdate")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(values))
}

/// Record a value for a PR
///
/// The value must match the PR's record key, must not be dated in the
/// future, and only one value is allowed per day (409 on conflict).
pub async fn create_pr_value(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<PrValueRequest>,
) -> ApiResult<Json<PrValue>> {
    let key = check_pr_owner(&state, id, &auth_user.username).await?;

    if !value_matches_key(key, &req.value) {
        return Err(ApiError::Validation(format!(
            "'{}' is not a valid {key} value",
            req.value
        )));
    }
    if req.cdate > OffsetDateTime::now_utc().date() {
        return Err(ApiError::Validation(
            "PR values cannot be dated in the future".to_string(),
        ));
    }

    let value: PrValue = sqlx::query_as(
        "INSERT INTO pr_values (pr_id, value, cdate) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(id)
    .bind(&req.value)
    .bind(req.cdate)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(value))
}

pub async fn delete_pr_value(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((id, value_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    check_pr_owner(&state, id, &auth_user.username).await?;

    let deleted = sqlx::query("DELETE FROM pr_values WHERE id = $1 AND pr_id = $2")
        .bind(value_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(Json(serde_json::json!({})))
}
