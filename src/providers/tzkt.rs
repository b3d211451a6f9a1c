use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::ledger::models::BigMapEntry;
use crate::providers::http::get_json;
use crate::providers::{warn_if_truncated, BigMapSource, VoterSource};
use crate::retry::RetryPolicy;

const PROVIDER: &str = "TzKT";

/// Voter status for bakers who did not take part in the period
const NON_PARTICIPATING: &str = "none";

#[derive(Debug, Clone, Deserialize)]
pub struct TzktAccount {
    pub address: String,
}

/// One row of `GET /v1/voting/periods/{period}/voters`
#[derive(Debug, Clone, Deserialize)]
pub struct TzktVoter {
    pub delegate: TzktAccount,
    pub status: String,
}

/// One row of `GET /v1/bigmaps/{id}/keys`
#[derive(Debug, Clone, Deserialize)]
pub struct TzktBigMapKey {
    pub key: String,
    pub value: String,
}

/// Provider A: TzKT. Supplies voters and the oven big map.
pub struct TzktProvider {
    base_url: String,
    voting_period: u32,
    big_map_id: u64,
    limit: u32,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl TzktProvider {
    pub fn new(base_url: impl Into<String>, voting_period: u32, big_map_id: u64) -> Self {
        Self {
            base_url: base_url.into(),
            voting_period,
            big_map_id,
            limit: 1000,
            retry: RetryPolicy::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tzkt_url.clone(),
            config.voting_period,
            config.oven_big_map_id,
        )
        .with_limit(config.provider_limit)
        .with_retry(RetryPolicy::new(config.http_retries, config.retry_backoff()))
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Drop bakers who did not vote and keep the bare addresses.
pub fn participating_voters(voters: Vec<TzktVoter>) -> Vec<String> {
    voters
        .into_iter()
        .filter(|voter| voter.status != NON_PARTICIPATING)
        .map(|voter| voter.delegate.address)
        .collect()
}

#[async_trait]
impl VoterSource for TzktProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_voters(&self) -> Result<Vec<String>, ProviderError> {
        let url = self.url(&format!(
            "/v1/voting/periods/{}/voters?limit={}",
            self.voting_period, self.limit
        ));
        let voters: Vec<TzktVoter> = get_json(&self.http, PROVIDER, &url, &self.retry).await?;
        warn_if_truncated(PROVIDER, "voters", voters.len(), self.limit);

        let total = voters.len();
        let participating = participating_voters(voters);
        info!(
            "{}: {} of {} bakers voted in period {}",
            PROVIDER,
            participating.len(),
            total,
            self.voting_period
        );
        Ok(participating)
    }
}

#[async_trait]
impl BigMapSource for TzktProvider {
    async fn fetch_big_map(&self) -> Result<Vec<BigMapEntry>, ProviderError> {
        let url = self.url(&format!(
            "/v1/bigmaps/{}/keys?active=true&limit={}",
            self.big_map_id, self.limit
        ));
        let keys: Vec<TzktBigMapKey> = get_json(&self.http, PROVIDER, &url, &self.retry).await?;
        warn_if_truncated(PROVIDER, "big map keys", keys.len(), self.limit);

        Ok(keys
            .into_iter()
            .map(|entry| BigMapEntry {
                key: entry.key,
                value: entry.value,
            })
            .collect())
    }
}
