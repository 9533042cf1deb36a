use serde::Serialize;

use crate::assembler::SnapshotService;

/// Shared application state: the one snapshot service behind every request.
pub struct AppState {
    pub service: SnapshotService,
}

impl AppState {
    pub fn new(service: SnapshotService) -> Self {
        Self { service }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub snapshot_as_of_ms: Option<i64>,
    pub snapshot_block: Option<u64>,
}
