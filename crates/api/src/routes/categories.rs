//! Bloc category management

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::BlocCategory;

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub color: String,
    pub weight: i32,
}

fn validate_category(req: &CategoryRequest) -> ApiResult<()> {
    if req.name.trim().is_empty() || req.name.len() > 64 {
        return Err(ApiError::Validation(
            "Category name must be 1-64 characters".to_string(),
        ));
    }
    let is_hex_color = req.color.len() == 7
        && req.color.starts_with('#')
        && req.color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !is_hex_color {
        return Err(ApiError::Validation(
            "Color must be a #rrggbb hex value".to_string(),
        ));
    }
    if req.weight < 1 {
        return Err(ApiError::Validation(
            "Weight must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

#[derive(FromRow)]
struct OwnerRow {
    owner: String,
}

/// Distinguish a missing category (404) from someone else's (403)
pub(crate) async fn check_category_owner(
    state: &AppState,
    id: Uuid,
    username: &str,
) -> ApiResult<()> {
    let row: OwnerRow = sqlx::query_as("SELECT owner FROM bloc_categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.owner != username {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<BlocCategory>>> {
    let categories: Vec<BlocCategory> =
        sqlx::query_as("SELECT * FROM bloc_categories WHERE owner = $1 ORDER BY weight, name")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CategoryRequest>,
) -> ApiResult<Json<BlocCategory>> {
    validate_category(&req)?;

    let category: BlocCategory = sqlx::query_as(
        r#"
        INSERT INTO bloc_categories (owner, name, color, weight)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&auth_user.username)
    .bind(&req.name)
    .bind(&req.color)
    .bind(req.weight)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<CategoryRequest>,
) -> ApiResult<Json<BlocCategory>> {
    check_category_owner(&state, id, &auth_user.username).await?;
    validate_category(&req)?;

    let category: BlocCategory = sqlx::query_as(
        r#"
        UPDATE bloc_categories
        SET name = $1, color = $2, weight = $3
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&req.name)
    .bind(&req.color)
    .bind(req.weight)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(category))
}

/// Delete a category; blocs tagged with it are removed by cascade
pub async fn delete_category(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    check_category_owner(&state, id, &auth_user.username).await?;

    sqlx::query("DELETE FROM bloc_categories WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn req(name: &str, color: &str, weight: i32) -> CategoryRequest {
        CategoryRequest {
            name: name.to_string(),
            color: color.to_string(),
            weight,
        }
    }

    #[test]
    fn test_validate_category_accepts_good_input() {
        assert!(validate_category(&req("metcon", "#3c74c4", 5)).is_ok());
    }

    #[test]
    fn test_validate_category_rejects_bad_color() {
        assert!(validate_category(&req("metcon", "3c74c4", 5)).is_err());
        assert!(validate_category(&req("metcon", "#3c74c", 5)).is_err());
        assert!(validate_category(&req("metcon", "#3c74cg", 5)).is_err());
    }

    #[test]
    fn test_validate_category_rejects_bad_name_and_weight() {
        assert!(validate_category(&req("", "#3c74c4", 5)).is_err());
        assert!(validate_category(&req("  ", "#3c74c4", 5)).is_err());
        assert!(validate_category(&req("metcon", "#3c74c4", 0)).is_err());
        assert!(validate_category(&req("metcon", "#3c74c4", -1)).is_err());
    }
}
