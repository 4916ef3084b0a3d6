//! Batch launch, run observation, and single status-check endpoints

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::api::auth::Capability;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::gateways::status::GatewayStatus;
use crate::gateways::GatewayKind;
use crate::workers::payout_batch::{
    BatchItems, BatchRequest, DirectPayoutRow, PayoutBatchRunner, SelectionLimits,
};
use crate::workers::status_poller::StatusPollRunner;
use crate::workers::{RunKind, RunProgress};

// ---------------------------------------------------------------------------
// Batch + Poll Launch
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub gateway: String,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub selection: Option<SelectionLimits>,
    #[serde(default)]
    pub direct: Option<Vec<DirectPayoutRow>>,
}

#[derive(Debug, Serialize)]
pub struct RunStarted {
    pub run_id: Uuid,
}

/// POST /api/payouts/batch
///
/// Starts a creation batch as a background run and answers 202 immediately;
/// progress is read from `GET /api/runs/{id}`.
pub async fn start_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BatchBody>,
) -> Result<(StatusCode, Json<RunStarted>), ApiError> {
    state.operators.authorize(&headers, Capability::Payout)?;

    let target = GatewayKind::from_label(&body.gateway)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown gateway {:?}", body.gateway)))?;

    let items = match (body.ids, body.selection, body.direct) {
        (Some(ids), None, None) if !ids.is_empty() => BatchItems::Explicit(ids),
        (None, Some(limits), None) => BatchItems::Selection(limits),
        (None, None, Some(rows)) if !rows.is_empty() => BatchItems::Direct(rows),
        _ => {
            return Err(ApiError::BadRequest(
                "body must carry exactly one of: ids, selection, direct".to_string(),
            ))
        }
    };

    // One creation batch at a time: the contact pools are exclusive to it.
    let slot = state
        .registry
        .try_claim_batch_slot()
        .ok_or(ApiError::BatchBusy)?;

    let run_id = Uuid::new_v4();
    let (progress_tx, cancel_rx) = state.registry.open(run_id, RunKind::PayoutBatch).await;
    let runner = PayoutBatchRunner::new(
        state.store.clone(),
        state.gateways.clone(),
        state.bank_directory.clone(),
        state.batch_config.clone(),
    );
    let request = BatchRequest { target, items };
    tokio::spawn(async move {
        let _slot = slot;
        runner.launch(request, progress_tx, cancel_rx).await;
    });

    info!(run_id = %run_id, gateway = target.label(), "payout batch accepted");
    Ok((StatusCode::ACCEPTED, Json(RunStarted { run_id })))
}

/// POST /api/payouts/check
///
/// Starts a status poll over every Processing row, as a background run.
pub async fn start_check(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<RunStarted>), ApiError> {
    state.operators.authorize(&headers, Capability::Payout)?;

    let run_id = Uuid::new_v4();
    let (progress_tx, cancel_rx) = state.registry.open(run_id, RunKind::StatusPoll).await;
    let runner = StatusPollRunner::new(
        state.store.clone(),
        state.gateways.clone(),
        state.batch_config.item_delay,
    );
    tokio::spawn(async move {
        runner.run(progress_tx, cancel_rx).await;
    });

    info!(run_id = %run_id, "status poll accepted");
    Ok((StatusCode::ACCEPTED, Json(RunStarted { run_id })))
}

// ---------------------------------------------------------------------------
// Run Observation
// ---------------------------------------------------------------------------

/// GET /api/runs/{id}
pub async fn run_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RunProgress>, ApiError> {
    state.operators.authorize(&headers, Capability::View)?;

    let run_id = parse_run_id(&id)?;
    let progress = state
        .registry
        .progress(run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))?;
    Ok(Json(progress))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub cancelled: bool,
}

/// POST /api/runs/{id}/cancel
///
/// Asks the run to stop between items. Items already dispatched keep their
/// committed state.
pub async fn cancel_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    state.operators.authorize(&headers, Capability::Payout)?;

    let run_id = parse_run_id(&id)?;
    if !state.registry.cancel(run_id).await {
        return Err(ApiError::NotFound(format!("run {run_id}")));
    }
    info!(run_id = %run_id, "cancellation requested");
    Ok(Json(CancelResponse {
        run_id,
        cancelled: true,
    }))
}

fn parse_run_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid run id {raw:?}")))
}

// ---------------------------------------------------------------------------
// Single Status Checks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusCheckResponse {
    pub order_id: String,
    pub gateway: &'static str,
    pub status: GatewayStatus,
    pub raw: Value,
}

/// GET /api/status/payin/{order_id}
///
/// One-off pay-in spot check: dispatches by order-id prefix and returns the
/// raw gateway answer next to its normalized status.
pub async fn payin_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<StatusCheckResponse>, ApiError> {
    state.operators.authorize(&headers, Capability::Status)?;

    let (kind, reply) = state.gateways.check_payin_status(&order_id).await?;
    let status = kind.normalize_payin(&reply);
    Ok(Json(StatusCheckResponse {
        order_id,
        gateway: kind.label(),
        status,
        raw: reply.to_value(),
    }))
}

/// GET /api/status/payout/{order_id}
pub async fn payout_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<StatusCheckResponse>, ApiError> {
    state.operators.authorize(&headers, Capability::Status)?;

    let (kind, reply) = state.gateways.check_payout_status(&order_id).await?;
    let status = kind.normalize_payout(&reply);
    Ok(Json(StatusCheckResponse {
        order_id,
        gateway: kind.label(),
        status,
        raw: reply.to_value(),
    }))
}
