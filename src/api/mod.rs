//! HTTP surface of the payout desk
//!
//! Every route authorizes against the operator token directory before it
//! touches the store or a gateway; see [`auth::Capability`] for the
//! capability each route demands.

pub mod auth;
pub mod error;
pub mod payouts;
pub mod withdrawals;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::api::auth::OperatorDirectory;
use crate::database;
use crate::database::withdrawal_repository::WithdrawalStore;
use crate::gateways::GatewayRouter;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::bank_directory::BankDirectory;
use crate::services::console_download::WithdrawCsvSource;
use crate::workers::payout_batch::BatchConfig;
use crate::workers::RunRegistry;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared handles every handler clones from.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WithdrawalStore>,
    pub gateways: Arc<GatewayRouter>,
    pub bank_directory: Arc<dyn BankDirectory>,
    pub csv_source: Arc<dyn WithdrawCsvSource>,
    pub registry: Arc<RunRegistry>,
    pub operators: Arc<OperatorDirectory>,
    pub batch_config: BatchConfig,
    pub pool: PgPool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the full route table with request-id and logging layers applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/withdrawals/refresh", post(withdrawals::refresh))
        .route("/api/withdrawals/ingest", post(withdrawals::ingest_file))
        .route("/api/withdrawals/pending", get(withdrawals::pending))
        .route("/api/withdrawals/{id}", get(withdrawals::row))
        .route("/api/payouts/batch", post(payouts::start_batch))
        .route("/api/payouts/check", post(payouts::start_check))
        .route("/api/runs/{id}", get(payouts::run_progress))
        .route("/api/runs/{id}/cancel", post(payouts::cancel_run))
        .route("/api/status/payin/{order_id}", get(payouts::payin_status))
        .route("/api/status/payout/{order_id}", get(payouts::payout_status))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// GET /health
///
/// Liveness plus a database round trip. Unauthenticated so probes can hit it.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match database::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "up" })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": e.to_string() })),
        ),
    }
}
