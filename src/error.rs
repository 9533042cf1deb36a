use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::upstream::FetchError;

/// Errors a snapshot request can surface. Everything else (parse failures,
/// estimator anomalies, stale fallbacks) is absorbed before reaching here.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("upstream unavailable and no cached snapshot exists: {0}")]
    UpstreamUnavailable(#[source] FetchError),
    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for SnapshotError {
    fn status_code(&self) -> StatusCode {
        match self {
            SnapshotError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SnapshotError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}
