pub mod http;
pub mod tzkt;
pub mod tzstats;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::ledger::models::BigMapEntry;

pub use tzkt::TzktProvider;
pub use tzstats::TzstatsProvider;

/// An indexer that can list the bakers who voted in one governance period
#[async_trait]
pub trait VoterSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Voter addresses in whatever order the indexer returns them
    async fn fetch_voters(&self) -> Result<Vec<String>, ProviderError>;
}

/// An indexer that can snapshot a big map as string key/value pairs
#[async_trait]
pub trait BigMapSource: Send + Sync {
    async fn fetch_big_map(&self) -> Result<Vec<BigMapEntry>, ProviderError>;
}

/// Limit-bounded endpoints silently truncate; flag results that hit the cap.
pub(crate) fn warn_if_truncated(provider: &str, what: &str, len: usize, limit: u32) {
    if len >= limit as usize {
        tracing::warn!(
            "⚠️ {} returned {} {} which equals the request limit; results may be truncated",
            provider,
            len,
            what
        );
    }
}
