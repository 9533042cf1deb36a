pub mod schedule;

pub use schedule::{HalvingSchedule, HalvingStatus, HalvingStep};

/// Block subsidy before the first halving.
pub const START_REWARD: u64 = 512;

/// Target seconds per block on the tracked chain.
pub const TARGET_BLOCK_TIME_SECS: u64 = 60;

/// Canonical halving table as (name, trigger height, reward after).
/// Rewards do not halve uniformly (16 -> 2), so lookups go through the table.
pub const DEFAULT_STEPS: [(&str, u64, u64); 7] = [
    ("First halving", 525_600, 256),
    ("Second halving", 1_051_200, 128),
    ("Third halving", 1_576_800, 64),
    ("Fourth halving", 5_256_000, 32),
    ("Fifth halving", 10_512_000, 16),
    ("Sixth halving", 26_280_000, 2),
    ("Seventh halving", 105_120_000, 0),
];
