use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::estimator::EstimatorParams;
use crate::halving::{HalvingSchedule, START_REWARD};
use crate::hashrate::HashUnit;

pub const DEFAULT_EXPLORER_URL: &str = "https://nito-explorer.nitopool.fr";
pub const DEFAULT_CACHE_PATH: &str = "cache/state.json";

/// Runtime settings, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub explorer_url: String,
    /// `None` keeps the snapshot in memory only.
    pub cache_path: Option<PathBuf>,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Unit assumed for hashrates reported without one.
    pub hashrate_base: HashUnit,
    pub start_reward: u64,
    pub final_reward_override: Option<u64>,
    pub estimator: EstimatorParams,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Bad values are logged and replaced by defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = EstimatorParams::default();
        let mut estimator = EstimatorParams {
            alpha: parse_or(&lookup, "EMA_ALPHA", defaults.alpha),
            min_sec: parse_or(&lookup, "BLOCK_TIME_MIN_SEC", defaults.min_sec),
            max_sec: parse_or(&lookup, "BLOCK_TIME_MAX_SEC", defaults.max_sec),
            default_sec: parse_or(&lookup, "BLOCK_TIME_DEFAULT_SEC", defaults.default_sec),
        };
        if !(0.0..=1.0).contains(&estimator.alpha) {
            warn!("EMA_ALPHA={} outside [0, 1], using {}", estimator.alpha, defaults.alpha);
            estimator.alpha = defaults.alpha;
        }
        if !(estimator.min_sec > 0.0 && estimator.min_sec <= estimator.max_sec) {
            warn!(
                "block time band [{}, {}] is invalid, using [{}, {}]",
                estimator.min_sec, estimator.max_sec, defaults.min_sec, defaults.max_sec
            );
            estimator.min_sec = defaults.min_sec;
            estimator.max_sec = defaults.max_sec;
        }

        let cache_path = match lookup("CACHE_PATH") {
            None => Some(PathBuf::from(DEFAULT_CACHE_PATH)),
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(PathBuf::from(p.trim())),
        };

        let final_reward_override = lookup("FINAL_REWARD_OVERRIDE")
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| match v.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("invalid FINAL_REWARD_OVERRIDE={v:?}, ignoring");
                    None
                }
            });

        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8080),
            explorer_url: lookup("EXPLORER_URL")
                .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string()),
            cache_path,
            cache_ttl: Duration::from_millis(parse_or(&lookup, "CACHE_TTL_MS", 5_000)),
            fetch_timeout: Duration::from_millis(parse_or(&lookup, "FETCH_TIMEOUT_MS", 5_000)),
            hashrate_base: parse_or(&lookup, "HASHRATE_BASE_UNIT", HashUnit::H),
            start_reward: parse_or(&lookup, "START_REWARD", START_REWARD),
            final_reward_override,
            estimator,
        }
    }

    pub fn schedule(&self) -> HalvingSchedule {
        HalvingSchedule::canonical(self.start_reward, self.final_reward_override)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("invalid {key}={raw:?}, using default");
            default
        }),
    }
}
