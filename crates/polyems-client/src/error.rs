//! Client-side error types

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("could not decode gateway reply: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
