//! Application error types and HTTP response mapping.
//!
//! Defines `AppError` for every request-level failure mode and implements
//! Axum's `IntoResponse` so handlers can bubble errors with `?`. Bodies are
//! plain text; the /clone endpoint reserves JSON for successful results.
//!
//! Error mappings:
//! - `MissingUrl` → 400
//! - `CloneFailed`, `HistoryFailed`, `TreeListFailed`, `Serialize`, `Internal` → 500

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("url parameter is required")]
    MissingUrl,

    #[error("failed to clone repo: {0}")]
    CloneFailed(String),

    #[error("failed to read history: {0}")]
    HistoryFailed(String),

    #[error("failed to list current files: {0}")]
    TreeListFailed(String),

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MissingUrl => StatusCode::BAD_REQUEST,
            AppError::CloneFailed(_)
            | AppError::HistoryFailed(_)
            | AppError::TreeListFailed(_)
            | AppError::Serialize(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
