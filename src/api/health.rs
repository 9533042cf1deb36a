use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, HealthResponse};

/// Liveness plus the age of whatever snapshot is currently published.
#[get("/health/")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let cached = state.service.cached();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        snapshot_as_of_ms: cached.as_ref().map(|r| r.as_of_ms()),
        snapshot_block: cached.as_ref().map(|r| r.snapshot.block),
    })
}
