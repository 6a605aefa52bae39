//! Training program templates: programs, their steps, and step blocs

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::{Program, ProgramStep, ProgramStepBloc};

#[derive(Debug, Deserialize)]
pub struct ProgramRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgramStepRequest {
    pub name: String,
    pub weight: i32,
}

#[derive(Debug, Deserialize)]
pub struct StepBlocRequest {
    pub content: String,
    pub weight: i32,
}

/// A program with its steps and their blocs, ready for rendering
#[derive(Debug, Serialize)]
pub struct ProgramDetail {
    #[serde(flatten)]
    pub program: Program,
    pub steps: Vec<StepDetail>,
}

#[derive(Debug, Serialize)]
pub struct StepDetail {
    #[serde(flatten)]
    pub step: ProgramStep,
    pub blocs: Vec<ProgramStepBloc>,
}

#[derive(FromRow)]
struct OwnerRow {
    owner: String,
}

async fn check_program_owner(state: &AppState, id: Uuid, username: &str) -> ApiResult<()> {
    let row: OwnerRow = sqlx::query_as("SELECT owner FROM programs WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;

    if row.owner != username {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Check a step through its parent program; returns 404 for a step that
/// does not exist under the given program
async fn check_step_owner(
    state: &AppState,
    program_id: Uuid,
    step_id: Uuid,
    username: &str,
) -> ApiResult<()> {
    check_program_owner(state, program_id, username).await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM program_steps WHERE id = $1 AND program_id = $2)",
    )
    .bind(step_id)
    .bind(program_id)
    .fetch_one(&state.pool)
    .await?;

    if !exists {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

pub async fn list_programs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Program>>> {
    let programs: Vec<Program> =
        sqlx::query_as("SELECT * FROM programs WHERE owner = $1 ORDER BY name")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(programs))
}

/// Fetch one program fully expanded: steps in weight order, blocs in
/// weight order within each step
pub async fn get_program(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProgramDetail>> {
    check_program_owner(&state, id, &auth_user.username).await?;

    let program: Program = sqlx::query_as("SELECT * FROM programs WHERE id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    let steps: Vec<ProgramStep> =
        sqlx::query_as("SELECT * FROM program_steps WHERE program_id = $1 ORDER BY weight")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    let blocs: Vec<ProgramStepBloc> = sqlx::query_as(
        r#"
        SELECT b.* FROM program_step_blocs b
        JOIN program_steps s ON s.id = b.step_id
        WHERE s.program_id = $1
        ORDER BY b.weight
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let steps = steps
        .into_iter()
        .map(|step| {
            let step_blocs = blocs
                .iter()
                .filter(|b| b.step_id == step.id)
                .cloned()
                .collect();
            StepDetail {
                step,
                blocs: step_blocs,
            }
        })
        .collect();

    Ok(Json(ProgramDetail { program, steps }))
}

pub async fn create_program(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ProgramRequest>,
) -> ApiResult<Json<Program>> {
    if req.name.trim().is_empty() || req.name.len() > 128 {
        return Err(ApiError::Validation(
            "Program name must be 1-128 characters".to_string(),
        ));
    }

    let program: Program = sqlx::query_as(
        "INSERT INTO programs (owner, name, description) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&auth_user.username)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(program))
}

pub async fn update_program(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgramRequest>,
) -> ApiResult<Json<Program>> {
    check_program_owner(&state, id, &auth_user.username).await?;

    if req.name.trim().is_empty() || req.name.len() > 128 {
        return Err(ApiError::Validation(
            "Program name must be 1-128 characters".to_string(),
        ));
    }

    let program: Program = sqlx::query_as(
        "UPDATE programs SET name = $1, description = $2 WHERE id = $3 RETURNING *",
    )
    .bind(&req.name)
    .bind(&req.description)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(program))
}

pub async fn delete_program(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    check_program_owner(&state, id, &auth_user.username).await?;

    sqlx::query("DELETE FROM programs WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

pub async fn create_step(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(program_id): Path<Uuid>,
    Json(req): Json<ProgramStepRequest>,
) -> ApiResult<Json<ProgramStep>> {
    check_program_owner(&state, program_id, &auth_user.username).await?;

    let step: ProgramStep = sqlx::query_as(
        "INSERT INTO program_steps (program_id, name, weight) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(program_id)
    .bind(&req.name)
    .bind(req.weight)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(step))
}

pub async fn delete_step(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((program_id, step_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    check_step_owner(&state, program_id, step_id, &auth_user.username).await?;

    sqlx::query("DELETE FROM program_steps WHERE id = $1")
        .bind(step_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

pub async fn create_step_bloc(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((program_id, step_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StepBlocRequest>,
) -> ApiResult<Json<ProgramStepBloc>> {
    check_step_owner(&state, program_id, step_id, &auth_user.username).await?;

    let bloc: ProgramStepBloc = sqlx::query_as(
        "INSERT INTO program_step_blocs (step_id, content, weight) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(step_id)
    .bind(&req.content)
    .bind(req.weight)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(bloc))
}

pub async fn delete_step_bloc(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((program_id, step_id, bloc_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    check_step_owner(&state, program_id, step_id, &auth_user.username).await?;

    let deleted = sqlx::query("DELETE FROM program_step_blocs WHERE id = $1 AND step_id = $2")
        .bind(bloc_id)
        .bind(step_id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(Json(serde_json::json!({})))
}
