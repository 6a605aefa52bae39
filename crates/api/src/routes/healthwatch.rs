//! Health watch data: daily metrics, archive import, weekly stats

use std::io::{Cursor, Read};

use axum::{
    extract::{Extension, Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use repforge_shared::HealthWatchData;

/// Name of the daily-metrics file inside the watch export archive
const CYCLES_CSV: &str = "physiological_cycles.csv";

// Column offsets in the export CSV
const COL_RECOVERY: usize = 3;
const COL_RESTING_HR: usize = 4;
const COL_HRV: usize = 5;
const COL_TEMPERATURE: usize = 6;
const COL_OXY_LEVEL: usize = 7;
const COL_STRAIN: usize = 8;
const COL_DATE: usize = 13;
const COL_SLEEP_SCORE: usize = 14;
const COL_SLEEP_LIGHT: usize = 18;
const COL_SLEEP_DEEP: usize = 19;
const COL_SLEEP_REM: usize = 20;
const COL_SLEEP_AWAKE: usize = 21;
const COL_SLEEP_EFFICIENCY: usize = 24;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthWatchRequest {
    pub cdate: Date,
    pub recovery: Option<i32>,
    pub resting_hr: Option<i32>,
    pub hrv: Option<i32>,
    pub temperature: Option<f64>,
    pub oxy_level: Option<f64>,
    pub strain: Option<f64>,
    pub sleep_score: Option<i32>,
    pub sleep_duration_light: Option<i32>,
    pub sleep_duration_deep: Option<i32>,
    pub sleep_duration_rem: Option<i32>,
    pub sleep_duration_awake: Option<i32>,
    pub sleep_efficiency: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct WeeklyStatRow {
    /// Monday of the week
    pub week: Date,
    pub category: String,
    pub color: String,
    pub total_duration: i64,
}

// =============================================================================
// CRUD
// =============================================================================

pub async fn list_health_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<HealthWatchData>>> {
    let data: Vec<HealthWatchData> =
        sqlx::query_as("SELECT * FROM health_watch_data WHERE owner = $1 ORDER BY cdate")
            .bind(&auth_user.username)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(data))
}

/// Insert or overwrite the entry for a given day
pub async fn upsert_health_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<HealthWatchRequest>,
) -> ApiResult<Json<HealthWatchData>> {
    let row = upsert_day(&state, &auth_user.username, &req).await?;
    Ok(Json(row))
}

pub async fn delete_health_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let owner: String = sqlx::query_scalar("SELECT owner FROM health_watch_data WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound)?;
    if owner != auth_user.username {
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM health_watch_data WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({})))
}

async fn upsert_day(
    state: &AppState,
    owner: &str,
    req: &HealthWatchRequest,
) -> ApiResult<HealthWatchData> {
    let row: HealthWatchData = sqlx::query_as(
        r#"
        INSERT INTO health_watch_data
            (owner, cdate, recovery, resting_hr, hrv, temperature, oxy_level,
             strain, sleep_score, sleep_duration_light, sleep_duration_deep,
             sleep_duration_rem, sleep_duration_awake, sleep_efficiency)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (owner, cdate) DO UPDATE SET
            recovery = EXCLUDED.recovery,
            resting_hr = EXCLUDED.resting_hr,
            hrv = EXCLUDED.hrv,
            temperature = EXCLUDED.temperature,
            oxy_level = EXCLUDED.oxy_level,
            strain = EXCLUDED.strain,
            sleep_score = EXCLUDED.sleep_score,
            sleep_duration_light = EXCLUDED.sleep_duration_light,
            sleep_duration_deep = EXCLUDED.sleep_duration_deep,
            sleep_duration_rem = EXCLUDED.sleep_duration_rem,
            sleep_duration_awake = EXCLUDED.sleep_duration_awake,
            sleep_efficiency = EXCLUDED.sleep_efficiency
        RETURNING *
        "#,
    )
    .bind(owner)
    .bind(req.cdate)
    .bind(req.recovery)
    .bind(req.resting_hr)
    .bind(req.hrv)
    .bind(req.temperature)
    .bind(req.oxy_level)
    .bind(req.strain)
    .bind(req.sleep_score)
    .bind(req.sleep_duration_light)
    .bind(req.sleep_duration_deep)
    .bind(req.sleep_duration_rem)
    .bind(req.sleep_duration_awake)
    .bind(req.sleep_efficiency)
    .fetch_one(&state.pool)
    .await?;

    Ok(row)
}

// =============================================================================
// Archive Import
// =============================================================================

/// Import a watch export archive (zip upload, multipart field `file`)
///
/// Extracts `physiological_cycles.csv` and upserts one row per day.
/// Rows without a recovery or strain reading are counted as skipped.
pub async fn import_archive(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
        .ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;

    let csv_data = extract_cycles_csv(&bytes)?;
    let rows = parse_cycles_csv(&csv_data);

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for parsed in rows {
        match parsed {
            Some(req) => {
                upsert_day(&state, &auth_user.username, &req).await?;
                imported += 1;
            }
            None => skipped += 1,
        }
    }

    tracing::info!(
        username = %auth_user.username,
        imported,
        skipped,
        "Watch archive imported"
    );
    Ok(Json(ImportSummary { imported, skipped }))
}

/// Pull the daily-metrics CSV out of the uploaded zip archive
fn extract_cycles_csv(bytes: &[u8]) -> ApiResult<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ApiError::BadRequest(format!("Not a valid zip archive: {e}")))?;

    let name = archive
        .file_names()
        .find(|n| n.ends_with(CYCLES_CSV))
        .map(String::from)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Archive does not contain {CYCLES_CSV}"))
        })?;

    let mut file = archive
        .by_name(&name)
        .map_err(|e| ApiError::BadRequest(format!("Failed to read {CYCLES_CSV}: {e}")))?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| ApiError::BadRequest(format!("Failed to read {CYCLES_CSV}: {e}")))?;
    Ok(data)
}

/// Parse the CSV into per-day upserts; `None` entries are skipped rows
fn parse_cycles_csv(data: &[u8]) -> Vec<Option<HealthWatchRequest>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    reader
        .records()
        .filter_map(|record| record.ok())
        .map(|record| parse_cycle_row(&record))
        .collect()
}

fn parse_cycle_row(record: &csv::StringRecord) -> Option<HealthWatchRequest> {
    // Rows still in progress have no recovery or strain yet
    let recovery = parse_int(record, COL_RECOVERY)?;
    let strain = parse_float(record, COL_STRAIN)?;
    let cdate = parse_date(record.get(COL_DATE)?)?;

    Some(HealthWatchRequest {
        cdate,
        recovery: Some(recovery),
        resting_hr: parse_int(record, COL_RESTING_HR),
        hrv: parse_int(record, COL_HRV),
        temperature: parse_float(record, COL_TEMPERATURE),
        oxy_level: parse_float(record, COL_OXY_LEVEL),
        strain: Some(strain),
        sleep_score: parse_int(record, COL_SLEEP_SCORE),
        sleep_duration_light: parse_int(record, COL_SLEEP_LIGHT),
        sleep_duration_deep: parse_int(record, COL_SLEEP_DEEP),
        sleep_duration_rem: parse_int(record, COL_SLEEP_REM),
        sleep_duration_awake: parse_int(record, COL_SLEEP_AWAKE),
        sleep_efficiency: parse_float(record, COL_SLEEP_EFFICIENCY),
    })
}

fn parse_int(record: &csv::StringRecord, col: usize) -> Option<i32> {
    let raw = record.get(col)?.trim();
    if raw.is_empty() {
        return None;
    }
    // Export writes integer metrics with a decimal point ("33.0")
    raw.parse::<f64>().ok().map(|v| v.round() as i32)
}

fn parse_float(record: &csv::StringRecord, col: usize) -> Option<f64> {
    let raw = record.get(col)?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

/// Timestamps look like `2025-07-14 06:32:11`; only the day matters
fn parse_date(raw: &str) -> Option<Date> {
    let day = raw.trim().get(..10)?;
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(day, &format).ok()
}

// =============================================================================
// Weekly Stats
// =============================================================================

/// Per-category training volume by week, for the dashboard chart
pub async fn weekly_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<WeeklyStatRow>>> {
    let rows: Vec<WeeklyStatRow> = sqlx::query_as(
        r#"
        SELECT date_trunc('week', b.cdate)::DATE AS week,
               c.name AS category,
               c.color AS color,
               COALESCE(SUM(b.duration), 0)::BIGINT AS total_duration
        FROM blocs b
        JOIN bloc_categories c ON c.id = b.category_id
        WHERE b.owner = $1
        GROUP BY week, c.name, c.color
        ORDER BY week, category
        "#,
    )
    .bind(&auth_user.username)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

// =============================================================================
// Tests
// =============================================================================
