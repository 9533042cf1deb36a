use super::{DEFAULT_STEPS, START_REWARD};

/// One scheduled subsidy change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalvingStep {
    pub name: String,
    pub trigger_height: u64,
    pub reward_after: u64,
}

/// Where a given height sits in the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct HalvingStatus {
    pub current_reward: u64,
    pub next_reward: u64,
    pub next_halving_block: Option<u64>,
    pub next_halving_name: Option<String>,
    pub blocks_remaining: u64,
    pub progress_pct: f64,
}

/// Immutable, table-driven reward schedule.
#[derive(Debug, Clone)]
pub struct HalvingSchedule {
    start_reward: u64,
    steps: Vec<HalvingStep>,
}

impl Default for HalvingSchedule {
    fn default() -> Self {
        Self::canonical(START_REWARD, None)
    }
}

impl HalvingSchedule {
    pub fn new(start_reward: u64, steps: Vec<HalvingStep>) -> Self {
        Self {
            start_reward,
            steps,
        }
    }

    /// The built-in table, optionally replacing the final step's reward
    /// (e.g. 1 instead of 0 to keep a tail subsidy).
    pub fn canonical(start_reward: u64, final_reward_override: Option<u64>) -> Self {
        let mut steps: Vec<HalvingStep> = DEFAULT_STEPS
            .iter()
            .map(|(name, trigger_height, reward_after)| HalvingStep {
                name: (*name).to_string(),
                trigger_height: *trigger_height,
                reward_after: *reward_after,
            })
            .collect();
        if let (Some(last), Some(reward)) = (steps.last_mut(), final_reward_override) {
            last.reward_after = reward;
        }
        Self::new(start_reward, steps)
    }

    /// Reward of the last step already triggered at `height`.
    pub fn reward_at(&self, height: i64) -> u64 {
        let h = clamp_height(height);
        self.steps
            .iter()
            .filter(|s| s.trigger_height <= h)
            .last()
            .map_or(self.start_reward, |s| s.reward_after)
    }

    /// Index of the first step strictly above `height`, `None` once exhausted.
    pub fn next_step(&self, height: i64) -> Option<usize> {
        let h = clamp_height(height);
        self.steps.iter().position(|s| s.trigger_height > h)
    }

    /// Percent of the way from the previous boundary to the next one.
    pub fn progress_pct(&self, height: i64) -> f64 {
        let h = clamp_height(height);
        match self.next_step(height) {
            None => 100.0,
            Some(idx) => {
                let prev = self.prev_boundary(idx);
                let next = self.steps[idx].trigger_height;
                let interval = next.saturating_sub(prev).max(1);
                let done = h.saturating_sub(prev).min(interval);
                (100.0 * done as f64 / interval as f64).clamp(0.0, 100.0)
            }
        }
    }

    /// Everything the snapshot needs about the schedule at `height`.
    pub fn resolve(&self, height: i64) -> HalvingStatus {
        let h = clamp_height(height);
        match self.next_step(height) {
            None => HalvingStatus {
                current_reward: self
                    .steps
                    .last()
                    .map_or(self.start_reward, |s| s.reward_after),
                next_reward: 0,
                next_halving_block: None,
                next_halving_name: None,
                blocks_remaining: 0,
                progress_pct: 100.0,
            },
            Some(idx) => {
                let next = &self.steps[idx];
                HalvingStatus {
                    current_reward: self.reward_at(height),
                    next_reward: next.reward_after,
                    next_halving_block: Some(next.trigger_height),
                    next_halving_name: Some(next.name.clone()),
                    blocks_remaining: next.trigger_height.saturating_sub(h),
                    progress_pct: self.progress_pct(height),
                }
            }
        }
    }

    fn prev_boundary(&self, next_idx: usize) -> u64 {
        match next_idx {
            0 => 0,
            i => self.steps[i - 1].trigger_height,
        }
    }
}

fn clamp_height(height: i64) -> u64 {
    height.max(0) as u64
}
