use actix_web::web;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::{CacheRecord, Snapshot, SnapshotCache, StoreError};
use crate::error::SnapshotError;
use crate::estimator::{BlockTimeEstimator, EstimatorState, Outcome};
use crate::halving::HalvingSchedule;
use crate::hashrate::{self, HashUnit};
use crate::upstream::{FetchError, RawUpstreamSummary, UpstreamFetcher};

/// Where a served snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Published record still inside its TTL.
    Cache,
    /// Rebuilt from a fresh upstream fetch.
    Refreshed,
    /// Upstream failed; last known good record, original timestamp.
    Fallback,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Refreshed => "refreshed",
            Source::Fallback => "fallback",
        }
    }
}

/// A snapshot plus the exact bytes to hand to clients.
#[derive(Debug, Clone)]
pub struct Served {
    pub snapshot: Snapshot,
    pub body: Vec<u8>,
    pub source: Source,
}

impl Served {
    fn from_record(record: CacheRecord, source: Source) -> Result<Self, SnapshotError> {
        let body = record.snapshot_bytes()?;
        Ok(Self {
            snapshot: record.snapshot,
            body,
            source,
        })
    }
}

/// Builds and serves the network snapshot around a single cache record.
pub struct SnapshotService {
    cache: Arc<SnapshotCache>,
    fetcher: Box<dyn UpstreamFetcher>,
    schedule: HalvingSchedule,
    estimator: BlockTimeEstimator,
    hashrate_base: HashUnit,
    fetch_timeout: Duration,
    refresh: Mutex<()>,
}

impl SnapshotService {
    pub fn new(
        cache: SnapshotCache,
        fetcher: impl UpstreamFetcher + 'static,
        schedule: HalvingSchedule,
        estimator: BlockTimeEstimator,
        hashrate_base: HashUnit,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            cache: Arc::new(cache),
            fetcher: Box::new(fetcher),
            schedule,
            estimator,
            hashrate_base,
            fetch_timeout,
            refresh: Mutex::new(()),
        }
    }

    /// Last published record, if any, regardless of age.
    pub fn cached(&self) -> Option<CacheRecord> {
        match self.cache.read() {
            Ok(record) => record,
            Err(e) => {
                warn!("cached snapshot unreadable, treating as absent: {e}");
                None
            }
        }
    }

    /// Serve the snapshot as of `now_ms`, refreshing from upstream when stale.
    ///
    /// Concurrent callers that all see a stale record queue on the refresh
    /// guard; whoever gets it second finds the fresh record and skips the fetch.
    pub async fn get_snapshot(&self, now_ms: i64) -> Result<Served, SnapshotError> {
        if let Some(record) = self.cached().filter(|r| self.cache.is_fresh(now_ms, r)) {
            return Served::from_record(record, Source::Cache);
        }

        let _guard = self.refresh.lock().await;

        let cached = self.cached();
        if let Some(record) = cached.as_ref().filter(|r| self.cache.is_fresh(now_ms, r)) {
            debug!("snapshot refreshed by a concurrent request");
            return Served::from_record(record.clone(), Source::Cache);
        }

        let raw = match self.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                return match cached {
                    Some(record) => {
                        warn!(
                            "upstream fetch failed, serving snapshot from {}: {e}",
                            record.as_of_ms()
                        );
                        Served::from_record(record, Source::Fallback)
                    }
                    None => {
                        error!("upstream fetch failed and no snapshot is cached: {e}");
                        Err(SnapshotError::UpstreamUnavailable(e))
                    }
                };
            }
        };

        let fresh = self.assemble(raw, cached.as_ref(), now_ms);
        match self.persist(fresh.clone()).await {
            Ok(committed) => {
                info!(
                    "snapshot refreshed: block {} reward {} next halving {:?} ({:.2}s/block)",
                    committed.snapshot.block,
                    committed.snapshot.current_reward,
                    committed.snapshot.next_halving_block,
                    committed.snapshot.block_time_sec
                );
                Served::from_record(committed, Source::Refreshed)
            }
            Err(e) => {
                error!("failed to persist snapshot: {e}");
                match cached {
                    Some(previous) => Served::from_record(previous, Source::Fallback),
                    None => Served::from_record(fresh, Source::Refreshed),
                }
            }
        }
    }

    /// Commit on the blocking pool; the store writes and fsyncs.
    async fn persist(&self, record: CacheRecord) -> Result<CacheRecord, StoreError> {
        let cache = Arc::clone(&self.cache);
        web::block(move || cache.write(record))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))
            .and_then(|written| written)
    }

    /// One bounded upstream call. A response without a usable height is as
    /// good as no response.
    async fn fetch(&self) -> Result<RawUpstreamSummary, FetchError> {
        let raw = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_summary())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))??;
        match raw.usable_height() {
            Some(_) => Ok(raw),
            None => Err(FetchError::MissingHeight),
        }
    }

    /// Turn one upstream summary into the next record.
    fn assemble(
        &self,
        raw: RawUpstreamSummary,
        previous: Option<&CacheRecord>,
        now_ms: i64,
    ) -> CacheRecord {
        let height = raw.usable_height().unwrap_or(0);

        let prev_state = previous
            .map(|r| r.estimator)
            .unwrap_or_else(|| EstimatorState::cold(self.estimator.params()));
        let (estimator, outcome) = self.estimator.observe(&prev_state, height, now_ms);
        match outcome {
            Outcome::Seeded => debug!("block-time estimator seeded at height {height}"),
            Outcome::Updated { observed_sec } => debug!(
                "block time {:.2}s -> {:.2}s (sample {observed_sec:.2}s)",
                prev_state.smoothed_sec_per_block, estimator.smoothed_sec_per_block
            ),
            Outcome::NoNewBlock => debug!("no new block since height {height}"),
            Outcome::Regressed { previous, observed } => warn!(
                "upstream height regressed ({previous} -> {observed}); keeping block time at {:.2}s",
                estimator.smoothed_sec_per_block
            ),
        }

        let halving = self
            .schedule
            .resolve(i64::try_from(height).unwrap_or(i64::MAX));
        let block_time_sec = estimator.smoothed_sec_per_block;
        let target_halving_ts = match halving.next_halving_block {
            Some(_) => {
                let eta_ms = halving.blocks_remaining as f64 * block_time_sec * 1000.0;
                now_ms.saturating_add(eta_ms.round() as i64)
            }
            None => now_ms,
        };

        let snapshot = Snapshot {
            server_time: now_ms,
            as_of_ms: now_ms,
            block: height,
            difficulty: raw.difficulty_value(),
            supply: raw.supply_value(),
            hashrate: hashrate::normalize(raw.hashrate.as_ref(), self.hashrate_base),
            block_time_sec,
            current_reward: halving.current_reward,
            next_reward: halving.next_reward,
            next_halving_block: halving.next_halving_block,
            next_halving_name: halving.next_halving_name,
            blocks_remaining: halving.blocks_remaining,
            progress_pct: halving.progress_pct,
            target_halving_ts,
        };

        CacheRecord {
            snapshot,
            estimator,
            upstream: Some(raw),
        }
    }
}
