pub mod record;
pub mod store;

use log::{debug, warn};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub use record::{CacheRecord, Snapshot};
pub use store::{FileStore, MemoryStore, SnapshotStore, StoreError};

/// True iff `record` is younger than `ttl_ms` at `now_ms`.
pub fn is_fresh(now_ms: i64, record: &CacheRecord, ttl_ms: i64) -> bool {
    now_ms - record.as_of_ms() < ttl_ms
}

/// Owner of the single published `CacheRecord`.
pub struct SnapshotCache {
    store: Box<dyn SnapshotStore>,
    ttl_ms: i64,
    write_lock: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(store: impl SnapshotStore + 'static, ttl: Duration) -> Self {
        Self {
            store: Box::new(store),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_fresh(&self, now_ms: i64, record: &CacheRecord) -> bool {
        is_fresh(now_ms, record, self.ttl_ms)
    }

    /// The published record, `None` if nothing has been written yet.
    pub fn read(&self) -> Result<Option<CacheRecord>, StoreError> {
        match self.store.read()? {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }

    /// Publish `record`, then restamp it with the commit time.
    ///
    /// The second write makes every reader of the persisted record agree on its
    /// age. If the first publish fails nothing changed and the error is returned;
    /// if only the restamp fails, the record as first committed is returned,
    /// since that is what readers now see.
    pub fn write(&self, mut record: CacheRecord) -> Result<CacheRecord, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let committed_at = self.store.write(&serde_json::to_vec(&record)?)?;
        let computed_at = record.snapshot.as_of_ms;
        if committed_at == computed_at {
            return Ok(record);
        }

        record.snapshot.as_of_ms = committed_at;
        let restamped = serde_json::to_vec(&record)
            .map_err(StoreError::from)
            .and_then(|bytes| self.store.write(&bytes));
        match restamped {
            Ok(_) => {
                debug!("snapshot restamped {computed_at} -> {committed_at}");
                Ok(record)
            }
            Err(e) => {
                warn!("snapshot restamp failed, keeping compute-time stamp: {e}");
                record.snapshot.as_of_ms = computed_at;
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorState;
    use crate::hashrate::CanonicalHashrate;

    fn sample_record(as_of_ms: i64) -> CacheRecord {
        CacheRecord {
            snapshot: Snapshot {
                server_time: as_of_ms,
                as_of_ms,
                block: 600_000,
                difficulty: 1.25,
                supply: 250_000_000.0,
                hashrate: CanonicalHashrate::from_hashes_per_sec(7.69e14),
                block_time_sec: 60.0,
                current_reward: 256,
                next_reward: 128,
                next_halving_block: Some(1_051_200),
                next_halving_name: Some("Second halving".into()),
                blocks_remaining: 451_200,
                progress_pct: 14.155,
                target_halving_ts: as_of_ms + 451_200 * 60_000,
            },
            estimator: EstimatorState {
                last_height: 600_000,
                last_observed_at_ms: as_of_ms,
                smoothed_sec_per_block: 60.0,
            },
            upstream: None,
        }
    }

    #[test]
    fn freshness_is_strictly_below_ttl() {
        let rec = sample_record(10_000);
        assert!(is_fresh(10_000, &rec, 5_000));
        assert!(is_fresh(14_999, &rec, 5_000));
        assert!(!is_fresh(15_000, &rec, 5_000));
        // restamped records can be slightly in the future of a request
        assert!(is_fresh(9_990, &rec, 5_000));
    }

    #[test]
    fn write_restamps_with_commit_time() {
        let store = MemoryStore::with_clock(|| 77_000);
        let cache = SnapshotCache::new(store, Duration::from_secs(5));
        assert_eq!(cache.read().unwrap(), None);

        let written = cache.write(sample_record(70_000)).unwrap();
        assert_eq!(written.as_of_ms(), 77_000);
        assert_eq!(written.snapshot.server_time, 70_000);

        let read = cache.read().unwrap().unwrap();
        assert_eq!(read, written);
        // target is computed from compute time and is not shifted
        assert_eq!(read.snapshot.target_halving_ts, 70_000 + 451_200 * 60_000);
    }

    #[test]
    fn file_backed_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let cache = SnapshotCache::new(FileStore::new(&path), Duration::from_secs(5));
        let written = cache.write(sample_record(1_000)).unwrap();

        let reopened = SnapshotCache::new(FileStore::new(&path), Duration::from_secs(5));
        assert_eq!(reopened.read().unwrap(), Some(written));
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let store = MemoryStore::new();
        store.write(b"{ not json").unwrap();
        let cache = SnapshotCache::new(store, Duration::from_secs(5));
        assert!(matches!(cache.read(), Err(StoreError::Serde(_))));
    }
}
