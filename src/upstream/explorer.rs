use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, header};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use super::{FetchError, RawField, RawUpstreamSummary, UpstreamFetcher};
use crate::hashrate::parse_exact;

const GET_BLOCK_COUNT: &str = "/api/getblockcount";
const GET_DIFFICULTY: &str = "/api/getdifficulty";
const GET_NETWORK_HASHPS: &str = "/api/getnetworkhashps";
const GET_MONEY_SUPPLY: &str = "/ext/getmoneysupply";
const GET_SUMMARY: &str = "/ext/getsummary";

/// Share of the overall fetch deadline each request phase may use. Two
/// phases (primitives, then the summary) must both fit inside the deadline.
const PHASE_SHARE: f64 = 0.4;

/// HTTP client for an explorer exposing the classic `/api` + `/ext` endpoints.
///
/// Each primitive comes from its own endpoint; `/ext/getsummary` is only
/// consulted when one of them is missing or non-positive. Every request is
/// cut off after its phase budget, so one hung endpoint costs that field
/// and nothing else.
pub struct ExplorerClient {
    client: Client,
    base_url: String,
    phase_budget: Duration,
}

impl ExplorerClient {
    /// `deadline` is the whole-fetch budget the caller enforces.
    pub fn new(base_url: impl Into<String>, deadline: Duration) -> Result<Self, FetchError> {
        let phase_budget = deadline.mul_f64(PHASE_SHARE);
        let client = Client::builder()
            .connect_timeout(phase_budget.min(Duration::from_secs(2)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            phase_budget,
        })
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        tokio::time::timeout(self.phase_budget, request)
            .await
            .map_err(|_| FetchError::Timeout(self.phase_budget))?
    }

    async fn get_text(&self, path: &str) -> Result<String, FetchError> {
        let body = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let value = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    }
}

/// A primitive body is a reading only when it is a bare number.
fn primitive(body: String, what: &str) -> Option<f64> {
    let value = parse_exact(&body).filter(|n| n.is_finite());
    if value.is_none() {
        debug!("explorer {what} answered {body:?}, ignoring");
    }
    value
}

#[async_trait]
impl UpstreamFetcher for ExplorerClient {
    async fn fetch_summary(&self) -> Result<RawUpstreamSummary, FetchError> {
        let (height, difficulty, hashps, supply) = tokio::join!(
            self.bounded(self.get_text(GET_BLOCK_COUNT)),
            self.bounded(self.get_text(GET_DIFFICULTY)),
            self.bounded(self.get_text(GET_NETWORK_HASHPS)),
            self.bounded(self.get_text(GET_MONEY_SUPPLY)),
        );

        let mut first_error = None;
        let mut keep = |res: Result<String, FetchError>, what: &str| match res {
            Ok(text) => primitive(text, what),
            Err(e) => {
                debug!("explorer {what} unavailable: {e}");
                first_error.get_or_insert(e);
                None
            }
        };

        let mut summary = RawUpstreamSummary {
            height: keep(height, "block count").map(|h| h as i64),
            difficulty: keep(difficulty, "difficulty").map(RawField::Number),
            hashrate: keep(hashps, "network hashps").map(RawField::Number),
            supply: keep(supply, "money supply").map(RawField::Number),
        };

        if summary.has_gaps() {
            match self.bounded(self.get_json(GET_SUMMARY)).await {
                Ok(value) => {
                    summary.fill_gaps_from(RawUpstreamSummary::from_summary_json(&value))
                }
                Err(e) => {
                    warn!("explorer summary fallback failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (summary.usable_height(), first_error) {
            (Some(_), _) => Ok(summary),
            (None, Some(e)) => Err(e),
            (None, None) => Err(FetchError::MissingHeight),
        }
    }
}
