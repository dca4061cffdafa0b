//! HTTP request handlers for API endpoints

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::assembler::{horizon_days, Prediction, TrendError, TrendWindow, MAX_HORIZON_DAYS};
use crate::observation::ObservationPoint;
use crate::sampler::{build_prediction_table, PredictionTable};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// True for exactly `YYYY-MM-DD`: four-digit year, no sign, zero-padded fields.
fn is_calendar_date_form(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn parse_date(name: &str, value: Option<&str>) -> Result<NaiveDate, ApiError> {
    let value =
        value.ok_or_else(|| ApiError::InvalidDate(format!("Missing '{}' parameter", name)))?;
    let trimmed = value.trim();
    if !is_calendar_date_form(trimmed) {
        return Err(ApiError::InvalidDate(format!(
            "Invalid {} '{}', expected YYYY-MM-DD",
            name, value
        )));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|e| {
        ApiError::InvalidDate(format!(
            "Invalid {} '{}', expected YYYY-MM-DD: {}",
            name, value, e
        ))
    })
}

/// Health check endpoint
///
/// Reports whether a dataset is loaded without triggering a refresh.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let current = state.cache.current();
    Json(json!({
        "status": "ok",
        "dataset_loaded": current.is_some(),
        "latest_data_date": current.as_ref().map(|dataset| dataset.latest_date()),
        "source_version": current.as_ref().map(|dataset| dataset.source_version()),
    }))
}

/// Response for the current dataset
#[derive(Debug, Serialize)]
pub struct Co2Response {
    pub source_version: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub first_date: NaiveDate,
    pub latest_data_date: NaiveDate,
    pub count: usize,
    pub points: Vec<ObservationPoint>,
}

/// GET /co2 - Current dataset snapshot
pub async fn get_current(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Co2Response>, ApiError> {
    let dataset = state.cache.get_dataset().await?;

    Ok(Json(Co2Response {
        source_version: dataset.source_version(),
        fetched_at: dataset.fetched_at(),
        first_date: dataset.first_date(),
        latest_data_date: dataset.latest_date(),
        count: dataset.len(),
        points: dataset.points().to_vec(),
    }))
}

/// Query parameters for single-date endpoints
#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

/// Response for a single-date prediction
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub source_version: Uuid,
}

/// GET /predict?date= - Predicted trend value for one date
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<PredictResponse>, ApiError> {
    let date = parse_date("date", query.date.as_deref())?;
    let dataset = state.cache.get_dataset().await?;
    let source_version = dataset.source_version();

    // Model fits are CPU-bound; keep them off the async workers
    let assembler = Arc::clone(&state.assembler);
    let prediction =
        tokio::task::spawn_blocking(move || assembler.predict(&dataset, date)).await??;

    Ok(Json(PredictResponse {
        prediction,
        source_version,
    }))
}

/// Response for the trend window
#[derive(Debug, Serialize)]
pub struct TrendResponse {
    #[serde(flatten)]
    pub window: TrendWindow,
    pub model: String,
    pub source_version: Uuid,
    pub fetched_at: DateTime<Utc>,
}

/// GET /trend?date= - Ten years of history plus the forecast through `date`
pub async fn trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<TrendResponse>, ApiError> {
    let date = parse_date("date", query.date.as_deref())?;
    let dataset = state.cache.get_dataset().await?;
    let source_version = dataset.source_version();
    let fetched_at = dataset.fetched_at();

    let assembler = Arc::clone(&state.assembler);
    let (window, model) =
        tokio::task::spawn_blocking(move || assembler.assemble_with_model(&dataset, date))
            .await??;

    Ok(Json(TrendResponse {
        window,
        model: model.order().to_string(),
        source_version,
        fetched_at,
    }))
}

/// Query parameters for the prediction table
#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    pub target: Option<String>,
    /// Defaults to the current UTC date
    pub today: Option<String>,
}

/// Response for the prediction table
#[derive(Debug, Serialize)]
pub struct TableResponse {
    #[serde(flatten)]
    pub table: PredictionTable,
    pub source_version: Uuid,
}

async fn compute_table(
    state: &AppState,
    query: &TableQuery,
) -> Result<(PredictionTable, Uuid), ApiError> {
    let target = parse_date("target", query.target.as_deref())?;
    let today = match query.today.as_deref() {
        Some(value) => parse_date("today", Some(value))?,
        None => Utc::now().date_naive(),
    };
    if target < today {
        return Err(ApiError::InvalidDate(format!(
            "Target {} is before today ({})",
            target, today
        )));
    }
    if (target - today).num_days() > MAX_HORIZON_DAYS as i64 {
        return Err(ApiError::InvalidDate(format!(
            "Table spans more than {} days ({} to {})",
            MAX_HORIZON_DAYS, today, target
        )));
    }

    let dataset = state.cache.get_dataset().await?;
    let source_version = dataset.source_version();
    // Dates before the latest observation fail per row; an unreachable target fails the request.
    if let Err(err @ TrendError::HorizonTooLong { .. }) = horizon_days(&dataset, target) {
        return Err(err.into());
    }

    let assembler = Arc::clone(&state.assembler);
    let table = tokio::task::spawn_blocking(move || {
        build_prediction_table(&assembler, &dataset, today, target)
    })
    .await?;

    Ok((table, source_version))
}

/// GET /prediction-table?target=[&today=] - Predictions over the adaptive date grid
pub async fn prediction_table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableResponse>, ApiError> {
    let (table, source_version) = compute_table(&state, &query).await?;
    Ok(Json(TableResponse {
        table,
        source_version,
    }))
}

/// GET /prediction-table.csv?target=[&today=] - Same table as a CSV download
pub async fn prediction_table_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> Result<Response, ApiError> {
    let (table, _) = compute_table(&state, &query).await?;
    let body = table
        .to_csv_string()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"prediction-table.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}
