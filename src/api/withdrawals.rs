//! Withdrawal ingestion and inspection endpoints

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::api::auth::Capability;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::ingest;
use crate::model::WithdrawalRequest;
use crate::workers::payout_batch::{select_candidates, SelectionLimits, SelectionReport};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub file: String,
    pub stored: usize,
    pub skipped: usize,
}

/// POST /api/withdrawals/refresh
///
/// Downloads the admin-console export and ingests it.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IngestResponse>, ApiError> {
    state.operators.authorize(&headers, Capability::Ingest)?;

    let path = state.csv_source.download().await?;
    let report = ingest::ingest_csv(state.store.as_ref(), &path).await?;
    info!(
        file = %path.display(),
        stored = report.stored,
        skipped = report.skipped,
        "console export refreshed"
    );

    Ok(Json(IngestResponse {
        file: path.display().to_string(),
        stored: report.stored,
        skipped: report.skipped,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub path: PathBuf,
}

/// POST /api/withdrawals/ingest
///
/// Ingests an already-downloaded CSV by path.
pub async fn ingest_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestResponse>, ApiError> {
    state.operators.authorize(&headers, Capability::Ingest)?;

    let report = ingest::ingest_csv(state.store.as_ref(), &body.path).await?;

    Ok(Json(IngestResponse {
        file: body.path.display().to_string(),
        stored: report.stored,
        skipped: report.skipped,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    /// Cumulative amount ceiling for the selection.
    pub limit: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// GET /api/withdrawals/pending?limit&min&max
///
/// Dry-run of the amount-bounded selection: reports what a batch with these
/// limits would pick, without dispatching anything.
pub async fn pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Result<Json<SelectionReport>, ApiError> {
    state.operators.authorize(&headers, Capability::View)?;

    let candidates = state.store.scan_created().await?;
    let report = select_candidates(
        &candidates,
        &SelectionLimits {
            ceiling: query.limit,
            min_amount: query.min,
            max_amount: query.max,
        },
    );
    Ok(Json(report))
}

/// GET /api/withdrawals/{id}
pub async fn row(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    state.operators.authorize(&headers, Capability::View)?;

    let row = state
        .store
        .find_by_business_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("withdrawal {id}")))?;
    Ok(Json(row))
}
