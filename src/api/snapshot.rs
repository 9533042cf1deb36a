use actix_web::{HttpResponse, get, http::header::ContentType, web};
use chrono::Utc;
use log::debug;

use super::models::AppState;
use crate::error::SnapshotError;

/// Response header telling clients whether the body was cached, refreshed or a fallback.
pub const SOURCE_HEADER: &str = "X-Snapshot-Source";

/// Current network snapshot, bytes exactly as published.
#[get("/snapshot/")]
pub async fn get_snapshot(state: web::Data<AppState>) -> Result<HttpResponse, SnapshotError> {
    let served = state
        .service
        .get_snapshot(Utc::now().timestamp_millis())
        .await?;
    debug!(
        "GET /snapshot/ - {} (as of {})",
        served.source.as_str(),
        served.snapshot.as_of_ms
    );

    Ok(HttpResponse::Ok()
        .content_type(ContentType::json())
        .insert_header((SOURCE_HEADER, served.source.as_str()))
        .body(served.body))
}
