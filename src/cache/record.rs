use serde::{Deserialize, Serialize};

use crate::estimator::EstimatorState;
use crate::hashrate::CanonicalHashrate;
use crate::upstream::RawUpstreamSummary;

/// The outward network-state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// When the snapshot was computed. Unlike `as_of_ms` it is never restamped.
    pub server_time: i64,
    pub as_of_ms: i64,
    pub block: u64,
    pub difficulty: f64,
    pub supply: f64,
    pub hashrate: CanonicalHashrate,
    pub block_time_sec: f64,
    pub current_reward: u64,
    pub next_reward: u64,
    pub next_halving_block: Option<u64>,
    pub next_halving_name: Option<String>,
    pub blocks_remaining: u64,
    pub progress_pct: f64,
    pub target_halving_ts: i64,
}

/// What gets persisted: the snapshot plus the state needed to continue
/// smoothing after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub snapshot: Snapshot,
    pub estimator: EstimatorState,
    #[serde(default)]
    pub upstream: Option<RawUpstreamSummary>,
}

impl CacheRecord {
    pub fn as_of_ms(&self) -> i64 {
        self.snapshot.as_of_ms
    }

    /// Serialized snapshot body as served to clients.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.snapshot)
    }
}
