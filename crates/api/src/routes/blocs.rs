//! Workout bloc CRUD

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use sqlx::FromRow;
use time::Date;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::categories::check_category_owner,
    state::AppState,
};
use repforge_shared::{value_matches_key, Bloc, RecordKey};

#[derive(Debug, Deserialize)]
pub struct BlocRequest {
    pub category_id: Uuid,
    pub content: String,
    /// Duration in minutes
    pub duration: Option<i32>,
    pub cdate: Date,
    pub result_key: Option<RecordKey>,
    pub result_value: Option<String>,
    pub result_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlocListQuery {
    pub start: Option<Date>,
    pub end: Option<Date>,
}

fn validate_bloc(req: &BlocRequest) -> ApiResult<()> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Content must not be empty".to_string()));
    }
    if let Some(duration) = req.duration {
        if duration < 0 {
            return Err(ApiError::Validation(
                "Duration must not be negative".to_string(),
            ));
        }
    }
    match (req.result_key, req.result_value.as_deref()) {
        (None, None) => {}
        (None, Some(_)) => {
            return Err(ApiError::Validation(
                "A result value requires a result key".to_string(),
            ));
        }
        (Some(_), None) => {
            return Err(ApiError::Validation(
                "A result key requires a result value".to_string(),
            ));
        }
        (Some(key), Some(value)) => {
            if !value_matches_key(key, value) {
                return Err(ApiError::Validation(format!(
                    "'{value}' is not a valid {key} value"
                )));
            }
        }
    }
    Ok(())
}

#[derive(FromRow)]
struct OwnerRow {
    owner: String,
}

async fn check_bloc_owner(state: &AppState, id: Uuid, username: &str) -> ApiResult<()> {
    let row: OwnerRow = sqlx::query_as("SELECT owner FROM blocs WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.owner != username {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// List blocs, optionally restricted to a date range
pub async fn list_blocs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<BlocListQuery>,
) -> ApiResult<Json<Vec<Bloc>>> {
    let blocs: Vec<Bloc> = sqlx::query_as(
        r#"
        SELECT * FROM blocs
        WHERE owner = $1
          AND ($2::DATE IS NULL OR cdate >= $2)
          AND ($3::DATE IS NULL OR cdate <= $3)
        ORDER BY cdate, id
        "#,
    )
    .bind(&auth_user.username)
    .bind(query.start)
    .bind(query.end)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(blocs))
}

pub async fn create_bloc(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<BlocRequest>,
) -> ApiResult<Json<Bloc>> {
    validate_bloc(&req)?;
    check_category_owner(&state, req.category_id, &auth_user.username).await?;

    let bloc: Bloc = sqlx::query_as(
        r#"
        INSERT INTO blocs (owner, category_id, content, duration, cdate,
                           result_key, result_value, result_comment)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&auth_user.username)
    .bind(req.category_id)
    .bind(&req.content)
    .bind(req.duration)
    .bind(req.cdate)
    .bind(req.result_key)
    .bind(&req.result_value)
    .bind(&req.result_comment)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(bloc))
}

pub async fn update_bloc(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<BlocRequest>,
) -> ApiResult<Json<Bloc>> {
    check_bloc_owner(&state, id, &auth_user.username).await?;
    validate_bloc(&req)?;
    check_category_owner(&state, req.category_id, &auth_user.username).await?;

    let bloc: Bloc = sqlx::query_as(
        r#"
        UPDATE blocs
        SET category_id = $1, content = $2, duration = $3, cdate = $4,
            result_key = $5, result_value = $6, result_comment = $7
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(req.category_id)
    .bind(&req.content)
    .bind(req.duration)
    .bind(req.cdate)
    .bind(req.result_key)
    .bind(&req.result_value)
    .bind(&req.result_comment)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(bloc))
}

pub async fn delete_bloc(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    check_bloc_owner(&state, id, &auth_user.username).await?;

    sqlx::query("DELETE FROM blocs WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::date;

    fn base_req() -> BlocRequest {
        BlocRequest {
            category_id: Uuid::new_v4(),
            content: "5x5 back squat".to_string(),
            duration: Some(45),
            cdate: date!(2025 - 08 - 01),
            result_key: None,
            result_value: None,
            result_comment: None,
        }
    }

    #[test]
    fn test_validate_bloc_basic() {
        assert!(validate_bloc(&base_req()).is_ok());

        let mut empty = base_req();
        empty.content = "  ".to_string();
        assert!(validate_bloc(&empty).is_err());

        let mut negative = base_req();
        negative.duration = Some(-5);
        assert!(validate_bloc(&negative).is_err());
    }

    #[test]
    fn test_validate_bloc_result_pairing() {
        let mut key_only = base_req();
        key_only.result_key = Some(RecordKey::Kg);
        assert!(validate_bloc(&key_only).is_err());

        let mut value_only = base_req();
        value_only.result_value = Some("100".to_string());
        assert!(validate_bloc(&value_only).is_err());

        let mut both = base_req();
        both.result_key = Some(RecordKey::Kg);
        both.result_value = Some("102.5".to_string());
        assert!(validate_bloc(&both).is_ok());

        let mut mismatched = base_req();
        mismatched.result_key = Some(RecordKey::Rep);
        mismatched.result_value = Some("102.5".to_string());
        assert!(validate_bloc(&mismatched).is_err());
    }
}
