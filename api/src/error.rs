use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// Batch-side error taxonomy. The transport retries the transient classes
/// itself; everything that reaches the job loop fails the current target and
/// the loop moves on.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("upstream auth error: status {0}")]
    UpstreamAuth(u16),
    #[error("upstream client error: status {0}")]
    UpstreamClient(u16),
    #[error("upstream retries exhausted after {0} attempts")]
    RetriesExhausted(u32),
    #[error("invalid upstream payload: {0}")]
    Payload(String),
    #[error("object store error: {0}")]
    RawStore(String),
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("database connection error: {0}")]
    Connect(#[from] diesel::ConnectionError),
}

/// Errors surfaced by the recommendation handlers.
pub enum AppError {
    BadRequest(String),
    Database(eyre::Report),
    Internal(eyre::Report),
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, detail) = match self {
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            AppError::Database(e) => {
                tracing::error!(error = ?e, "store failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("store failed: {e}"),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status_code, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        AppError::Database(e.into())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for AppError {
    fn from(e: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        AppError::Database(e.into())
    }
}

impl From<eyre::Report> for AppError {
    fn from(e: eyre::Report) -> Self {
        AppError::Internal(e)
    }
}
