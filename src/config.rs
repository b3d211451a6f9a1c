use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Environment variable holding the `edsk...` signing key.
pub const PRIVATE_KEY_ENV: &str = "AIRDROP_PRIVATE_KEY";

/// Prefix for every other setting, e.g. `AIRDROP_RPC_URL`.
const ENV_PREFIX: &str = "AIRDROP";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rpc_url: String,
    /// FA1.2 token contract the distribution transfers from
    pub token_contract: String,
    pub confirmations: u32,
    pub safety_pause_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub fee_mutez: u64,
    pub gas_limit: u64,
    pub storage_limit: u64,

    pub tzkt_url: String,
    pub tzstats_url: String,
    pub voting_period: u32,
    pub election_proposal: String,
    pub election_stage: u32,
    pub oven_big_map_id: u64,
    pub provider_limit: u32,
    pub balance_concurrency: usize,
    pub explorer_url: String,

    pub http_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Config {
    /// Built-in defaults overlaid with `AIRDROP_*` environment variables.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("rpc_url", "https://mainnet.api.tez.ie")?
            .set_default("token_contract", "")?
            .set_default("confirmations", 1)?
            .set_default("safety_pause_secs", 120)?
            .set_default("confirmation_timeout_secs", 600)?
            .set_default("poll_interval_ms", 5000)?
            .set_default("fee_mutez", 10_000)?
            .set_default("gas_limit", 40_000)?
            .set_default("storage_limit", 300)?
            .set_default("tzkt_url", "https://api.tzkt.io")?
            .set_default("tzstats_url", "https://api.tzstats.com")?
            .set_default("voting_period", 40)?
            .set_default(
                "election_proposal",
                "PtEdoTezd3RHSC31mpxxo1npxFjoWWcFgQtxapi51Z8TLu6v6Uq",
            )?
            .set_default("election_stage", 4)?
            .set_default("oven_big_map_id", 260)?
            .set_default("provider_limit", 1000)?
            .set_default("balance_concurrency", 8)?
            .set_default("explorer_url", "https://better-call.dev/mainnet")?
            .set_default("http_retries", 3)?
            .set_default("retry_backoff_ms", 500)?
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn safety_pause(&self) -> Duration {
        Duration::from_secs(self.safety_pause_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Distribution needs a token contract; reconciliation does not.
    pub fn require_token_contract(&self) -> AppResult<&str> {
        let contract = self.token_contract.trim();
        if contract.is_empty() {
            return Err(AppError::Config(format!(
                "{}_TOKEN_CONTRACT must be set for distribution",
                ENV_PREFIX
            )));
        }
        Ok(contract)
    }

    /// Block explorer page listing the oven big map, for the manual cross-check.
    pub fn oven_explorer_url(&self) -> String {
        format!(
            "{}/big_map/{}/keys",
            self.explorer_url.trim_end_matches('/'),
            self.oven_big_map_id
        )
    }
}

/// Read the signing key from the environment.
///
/// Must be called before any file or network I/O so a missing key aborts
/// the run with nothing done.
pub fn signing_key_from_env() -> AppResult<String> {
    match std::env::var(PRIVATE_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(AppError::Config(format!(
            "No signing key defined. Set a {} environment variable.",
            PRIVATE_KEY_ENV
        ))),
    }
}
