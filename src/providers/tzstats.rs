use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::providers::http::get_json;
use crate::providers::{warn_if_truncated, VoterSource};
use crate::retry::RetryPolicy;

const PROVIDER: &str = "TzStats";

/// One row of `GET /explorer/election/{proposal}/{stage}/ballots`.
/// The endpoint only lists cast ballots, so no status filter applies.
#[derive(Debug, Clone, Deserialize)]
pub struct TzstatsBallot {
    pub sender: String,
}

/// Provider B: TzStats. Supplies the independent voter list.
pub struct TzstatsProvider {
    base_url: String,
    proposal: String,
    stage: u32,
    limit: u32,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl TzstatsProvider {
    pub fn new(base_url: impl Into<String>, proposal: impl Into<String>, stage: u32) -> Self {
        Self {
            base_url: base_url.into(),
            proposal: proposal.into(),
            stage,
            limit: 1000,
            retry: RetryPolicy::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tzstats_url.clone(),
            config.election_proposal.clone(),
            config.election_stage,
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
}

#[async_trait]
impl VoterSource for TzstatsProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_voters(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!(
            "{}/explorer/election/{}/{}/ballots?limit={}",
            self.base_url.trim_end_matches('/'),
            self.proposal,
            self.stage,
            self.limit
        );
        let ballots: Vec<TzstatsBallot> =
            get_json(&self.http, PROVIDER, &url, &self.retry).await?;
        warn_if_truncated(PROVIDER, "ballots", ballots.len(), self.limit);

        info!("{}: {} ballots in stage {}", PROVIDER, ballots.len(), self.stage);
        Ok(ballots.into_iter().map(|ballot| ballot.sender).collect())
    }
}
