//! Health check and instance info

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    /// "local" or "oidc"; the frontend picks its login flow from this
    pub auth_method: String,
    pub registration_enabled: bool,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Health check database ping failed");
            "unreachable"
        }
    };

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
    }))
}

/// Unauthenticated instance metadata for the frontend bootstrap
pub async fn instance_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "repforge",
        version: env!("CARGO_PKG_VERSION"),
        auth_method: state.config.auth_method.to_string(),
        registration_enabled: state.config.registration_enabled,
    })
}
