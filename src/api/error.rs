//! API error taxonomy and response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::database::error::DatabaseError;
use crate::gateways::GatewayError;
use crate::ingest::IngestError;
use crate::services::console_download::DownloadError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("unknown bearer token")]
    UnknownToken,

    #[error("token lacks the {0} capability")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("another creation batch is already running")]
    BatchBusy,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingToken | ApiError::UnknownToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BatchBusy => StatusCode::CONFLICT,
            ApiError::Database(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Database(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Gateway(GatewayError::UnknownMethod(_)) => StatusCode::BAD_REQUEST,
            ApiError::Gateway(GatewayError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ingest(_) | ApiError::Download(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = %status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = %status.as_u16(), error = %self, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
