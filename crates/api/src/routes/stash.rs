//! Stash: quick notes, plus a machine-client drop endpoint

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    auth::{extract_bearer, resolve_api_token, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::StashItem;

#[derive(Debug, Deserialize)]
pub struct StashRequest {
    pub content: String,
}

fn validate_content(content: &str) -> ApiResult<()> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("Content must not be empty".to_string()));
    }
    if content.len() > 4096 {
        return Err(ApiError::Validation(
            "Content must be at most 4096 characters".to_string(),
        ));
    }
    Ok(())
}

async fn insert_item(state: &AppState, owner: &str, content: &str) -> ApiResult<StashItem> {
    let item: StashItem =
        sqlx::query_as("INSERT INTO stash (owner, content) VALUES ($1, $2) RETURNING *")
            .bind(owner)
            .bind(content)
            .fetch_one(&state.pool)
            .await?;
    Ok(item)
}

pub async fn list_stash(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<StashItem>>> {
    let items: Vec<StashItem> =
        sqlx::query_as("SELECT * FROM stash WHERE owner = $1 ORDER BY cdate DESC, id")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(items))
}

pub async fn create_stash_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<StashRequest>,
) -> ApiResult<Json<StashItem>> {
    validate_content(&req.content)?;
    Ok(Json(insert_item(&state, &auth_user.username, &req.content).await?))
}

/// Machine-client drop endpoint
///
/// Authenticates with the opaque per-user API token instead of a JWT,
/// so scripts and shortcuts can push notes without a login flow.
pub async fn create_stash_item_by_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StashRequest>,
) -> ApiResult<Json<StashItem>> {
    let token = extract_bearer(&headers)?;
    let username = resolve_api_token(&state.pool, token).await?;

    validate_content(&req.content)?;
    Ok(Json(insert_item(&state, &username, &req.content).await?))
}

#[derive(FromRow)]
struct OwnerRow {
    owner: String,
}

pub async fn delete_stash_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let row: OwnerRow = sqlx::query_as("SELECT owner FROM stash WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;
    if row.owner != auth_user.username {
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM stash WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}
