use serde::{Deserialize, Serialize};

use crate::halving::TARGET_BLOCK_TIME_SECS;

/// Tuning for the block-time EMA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorParams {
    /// Weight kept on history for each new sample.
    pub alpha: f64,
    pub min_sec: f64,
    pub max_sec: f64,
    /// Seed used on cold start.
    pub default_sec: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            min_sec: 10.0,
            max_sec: 600.0,
            default_sec: TARGET_BLOCK_TIME_SECS as f64,
        }
    }
}

impl EstimatorParams {
    pub fn clamp(&self, sec: f64) -> f64 {
        if sec.is_nan() {
            return self.default_sec.clamp(self.min_sec, self.max_sec);
        }
        sec.clamp(self.min_sec, self.max_sec)
    }
}

/// Smoothed seconds-per-block, persisted alongside each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorState {
    pub last_height: u64,
    pub last_observed_at_ms: i64,
    pub smoothed_sec_per_block: f64,
}

impl EstimatorState {
    /// Fresh state, anchored nowhere.
    pub fn cold(params: &EstimatorParams) -> Self {
        Self {
            last_height: 0,
            last_observed_at_ms: 0,
            smoothed_sec_per_block: params.clamp(params.default_sec),
        }
    }
}

/// What an observation did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// First observation; seeded with the default rate.
    Seeded,
    /// Height advanced; EMA blended with the new sample.
    Updated { observed_sec: f64 },
    /// No new block since the last observation.
    NoNewBlock,
    /// Upstream height went backwards; observation ignored.
    Regressed { previous: u64, observed: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct BlockTimeEstimator {
    params: EstimatorParams,
}

impl Default for BlockTimeEstimator {
    fn default() -> Self {
        Self::new(EstimatorParams::default())
    }
}

impl BlockTimeEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Fold one `(height, now_ms)` observation into `prev`.
    ///
    /// Regressions and zero deltas leave the state as it was; only an advancing
    /// height moves the timing anchor. Every returned state is inside
    /// `[min_sec, max_sec]`.
    pub fn observe(
        &self,
        prev: &EstimatorState,
        height: u64,
        now_ms: i64,
    ) -> (EstimatorState, Outcome) {
        let p = &self.params;

        if prev.last_observed_at_ms == 0 {
            let seeded = EstimatorState {
                last_height: height,
                last_observed_at_ms: now_ms,
                smoothed_sec_per_block: p.clamp(p.default_sec),
            };
            return (seeded, Outcome::Seeded);
        }

        let kept = EstimatorState {
            smoothed_sec_per_block: p.clamp(prev.smoothed_sec_per_block),
            ..*prev
        };

        if height < prev.last_height {
            return (
                kept,
                Outcome::Regressed {
                    previous: prev.last_height,
                    observed: height,
                },
            );
        }

        if height == prev.last_height {
            return (kept, Outcome::NoNewBlock);
        }

        let elapsed_sec = (now_ms - prev.last_observed_at_ms).max(0) as f64 / 1000.0;
        let observed_sec = p.clamp(elapsed_sec / (height - prev.last_height) as f64);
        let blended = p.alpha * kept.smoothed_sec_per_block + (1.0 - p.alpha) * observed_sec;

        let next = EstimatorState {
            last_height: height,
            last_observed_at_ms: now_ms,
            smoothed_sec_per_block: p.clamp(blended),
        };
        (next, Outcome::Updated { observed_sec })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warm(height: u64, at_ms: i64, sec: f64) -> EstimatorState {
        EstimatorState {
            last_height: height,
            last_observed_at_ms: at_ms,
            smoothed_sec_per_block: sec,
        }
    }

    #[test]
    fn cold_start_seeds_default() {
        let est = BlockTimeEstimator::default();
        let cold = EstimatorState::cold(est.params());
        let (next, outcome) = est.observe(&cold, 1_000, 5_000);
        assert_eq!(outcome, Outcome::Seeded);
        assert_eq!(next, warm(1_000, 5_000, 60.0));
    }

    #[test]
    fn blends_seventy_thirty() {
        let est = BlockTimeEstimator::default();
        // 10 blocks in 300s -> 30s/block
        let (next, outcome) = est.observe(&warm(100, 1_000_000, 60.0), 110, 1_300_000);
        assert_eq!(outcome, Outcome::Updated { observed_sec: 30.0 });
        assert!((next.smoothed_sec_per_block - 51.0).abs() < 1e-9);
        assert_eq!(next.last_height, 110);
        assert_eq!(next.last_observed_at_ms, 1_300_000);
    }

    #[test]
    fn outlier_sample_is_clamped_before_blending() {
        let est = BlockTimeEstimator::default();
        // one block after an hour: sample clamps to 600s
        let (next, _) = est.observe(&warm(100, 1, 60.0), 101, 3_600_001);
        assert!((next.smoothed_sec_per_block - (0.7 * 60.0 + 0.3 * 600.0)).abs() < 1e-9);
    }

    #[test]
    fn same_height_keeps_state() {
        let est = BlockTimeEstimator::default();
        let prev = warm(100, 1_000, 45.0);
        let (next, outcome) = est.observe(&prev, 100, 90_000);
        assert_eq!(outcome, Outcome::NoNewBlock);
        assert_eq!(next, prev);
    }

    #[test]
    fn regression_is_ignored() {
        let est = BlockTimeEstimator::default();
        let prev = warm(500, 1_000, 42.0);
        let (next, outcome) = est.observe(&prev, 12, 99_000);
        assert_eq!(
            outcome,
            Outcome::Regressed {
                previous: 500,
                observed: 12
            }
        );
        assert_eq!(next, prev);
    }

    #[test]
    fn clock_going_backwards_does_not_escape_bounds() {
        let est = BlockTimeEstimator::default();
        let (next, _) = est.observe(&warm(100, 50_000, 10.0), 200, 1_000);
        assert!(next.smoothed_sec_per_block >= 10.0);
    }

    #[test]
    fn never_leaves_band_over_a_noisy_sequence() {
        let est = BlockTimeEstimator::default();
        let mut state = EstimatorState::cold(est.params());
        let mut now = 1_i64;
        let mut height = 1_000_u64;
        // bursts, stalls, regressions, repeats
        let steps: [(i64, i64); 10] = [
            (1, 1),
            (500, 1),
            (3_600_000, 1),
            (1_000, 0),
            (2_000, -40),
            (120_000, 60),
            (86_400_000, 2),
            (10, 1_000),
            (0, 0),
            (61_000, 1),
        ];
        for (dt, dh) in steps {
            now += dt;
            height = (height as i64 + dh).max(0) as u64;
            let (next, _) = est.observe(&state, height, now);
            let s = next.smoothed_sec_per_block;
            assert!((10.0..=600.0).contains(&s), "left band: {s}");
            state = next;
        }
    }
}
