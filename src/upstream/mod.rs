pub mod explorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::hashrate::parse_number;

pub use explorer::ExplorerClient;

/// Explorer field that may arrive as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
}

impl RawField {
    /// Numeric value, if one can be coerced out of the field.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawField::Number(n) => Some(*n).filter(|n| n.is_finite()),
            RawField::Text(s) => parse_number(s).filter(|n| n.is_finite()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(RawField::Number),
            Value::String(s) => Some(RawField::Text(s.clone())),
            _ => None,
        }
    }

    fn is_positive(field: &Option<RawField>) -> bool {
        field.as_ref().and_then(RawField::as_f64).is_some_and(|n| n > 0.0)
    }
}

/// Whatever the explorer told us, uncoerced. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUpstreamSummary {
    pub height: Option<i64>,
    pub difficulty: Option<RawField>,
    pub supply: Option<RawField>,
    pub hashrate: Option<RawField>,
}

impl RawUpstreamSummary {
    /// Parse the explorer's `getsummary` object. Height may be published as
    /// `height`, `blockcount` or `blocks`; the later key wins.
    pub fn from_summary_json(value: &Value) -> Self {
        let height = ["height", "blockcount", "blocks"]
            .iter()
            .filter_map(|key| value.get(*key))
            .filter_map(coerce_height)
            .last();

        Self {
            height,
            difficulty: value.get("difficulty").and_then(RawField::from_json),
            supply: value.get("supply").and_then(RawField::from_json),
            hashrate: value.get("hashrate").and_then(RawField::from_json),
        }
    }

    /// Height when it is present and positive.
    pub fn usable_height(&self) -> Option<u64> {
        self.height.filter(|h| *h > 0).map(|h| h as u64)
    }

    pub fn difficulty_value(&self) -> f64 {
        self.difficulty.as_ref().and_then(RawField::as_f64).unwrap_or(0.0)
    }

    pub fn supply_value(&self) -> f64 {
        self.supply.as_ref().and_then(RawField::as_f64).unwrap_or(0.0)
    }

    /// True when any field is missing or not positive.
    pub fn has_gaps(&self) -> bool {
        self.usable_height().is_none()
            || !RawField::is_positive(&self.difficulty)
            || !RawField::is_positive(&self.supply)
            || !RawField::is_positive(&self.hashrate)
    }

    /// Fill missing or non-positive fields from `other`.
    pub fn fill_gaps_from(&mut self, other: RawUpstreamSummary) {
        if self.usable_height().is_none() && other.usable_height().is_some() {
            self.height = other.height;
        }
        if !RawField::is_positive(&self.difficulty) && other.difficulty.is_some() {
            self.difficulty = other.difficulty;
        }
        if !RawField::is_positive(&self.supply) && other.supply.is_some() {
            self.supply = other.supply;
        }
        if !RawField::is_positive(&self.hashrate) && other.hashrate.is_some() {
            self.hashrate = other.hashrate;
        }
    }
}

fn coerce_height(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_number(s).map(|f| f as i64),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("explorer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("explorer returned no usable block height")]
    MissingHeight,
    #[error("explorer did not answer within {0:?}")]
    Timeout(Duration),
}

/// Source of raw chain data. One call per refresh.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch_summary(&self) -> Result<RawUpstreamSummary, FetchError>;
}
