// Cross-Source Reconciler
//
// Voter data is only trusted once two independently operated indexers
// agree on it exactly. Oven enumeration then comes from provider A's big
// map snapshot, with balances read live from a chain node. Nothing is
// written until every fetch, check and balance query has succeeded.

use futures::{StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{AppResult, ChainError, ReconcileError};
use crate::execution::ChainClient;
use crate::ledger::models::{BigMapEntry, OvenRecord, ReconcileReport};
use crate::ledger::writer::write_reconciliation;
use crate::providers::{BigMapSource, VoterSource};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub voters_path: PathBuf,
    pub ovens_path: PathBuf,
    /// Upper bound on in-flight balance queries
    pub balance_concurrency: usize,
    /// Page the operator compares the oven count against
    pub explorer_url: String,
}

impl ReconcileConfig {
    pub fn from_config(
        config: &Config,
        voters_path: impl Into<PathBuf>,
        ovens_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            voters_path: voters_path.into(),
            ovens_path: ovens_path.into(),
            balance_concurrency: config.balance_concurrency,
            explorer_url: config.oven_explorer_url(),
        }
    }
}

/// Canonical order for comparing voter sets: plain lexicographic.
pub fn canonicalize(mut voters: Vec<String>) -> Vec<String> {
    voters.sort();
    voters
}

/// Both lists must already be canonicalized.
pub fn verify_consistent(
    provider_a: &[String],
    provider_b: &[String],
) -> Result<(), ReconcileError> {
    if provider_a.len() != provider_b.len() {
        return Err(ReconcileError::InconsistentResults {
            provider_a: provider_a.len(),
            provider_b: provider_b.len(),
        });
    }

    match provider_a
        .iter()
        .zip(provider_b)
        .position(|(a, b)| a != b)
    {
        Some(index) => Err(ReconcileError::Mismatch {
            index,
            provider_a: provider_a[index].clone(),
            provider_b: provider_b[index].clone(),
        }),
        None => Ok(()),
    }
}

pub struct Reconciler {
    config: ReconcileConfig,
    provider_a: Arc<dyn VoterSource>,
    provider_b: Arc<dyn VoterSource>,
    ovens: Arc<dyn BigMapSource>,
    chain: Arc<dyn ChainClient>,
}

impl Reconciler {
    pub fn new(
        config: ReconcileConfig,
        provider_a: Arc<dyn VoterSource>,
        provider_b: Arc<dyn VoterSource>,
        ovens: Arc<dyn BigMapSource>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            config,
            provider_a,
            provider_b,
            ovens,
            chain,
        }
    }

    /// Fetch both voter lists and accept them only if they match exactly.
    pub async fn reconciled_voters(&self) -> AppResult<Vec<String>> {
        info!("> Getting voters");
        let (voters_a, voters_b) = tokio::try_join!(
            self.provider_a.fetch_voters(),
            self.provider_b.fetch_voters()
        )?;
        let voters_a = canonicalize(voters_a);
        let voters_b = canonicalize(voters_b);

        info!(
            "> Got {} from {} and {} from {}.",
            voters_a.len(),
            self.provider_a.name(),
            voters_b.len(),
            self.provider_b.name()
        );

        verify_consistent(&voters_a, &voters_b)?;
        info!("> Results matched!");
        Ok(voters_a)
    }

    /// One live balance query per entry, duplicates included, in snapshot order.
    pub async fn enrich_ovens(&self, entries: Vec<BigMapEntry>) -> Result<Vec<OvenRecord>, ChainError> {
        let concurrency = self.config.balance_concurrency.max(1);

        futures::stream::iter(entries)
            .map(|entry| {
                let chain = self.chain.clone();
                async move {
                    let balance = chain.get_balance(&entry.key).await?;
                    Ok::<_, ChainError>(OvenRecord {
                        oven_address: entry.key,
                        owner_address: entry.value,
                        balance,
                    })
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> AppResult<ReconcileReport> {
        let voters = self.reconciled_voters().await?;

        info!("> Getting oven data");
        let entries = self.ovens.fetch_big_map().await?;
        let ovens = self.enrich_ovens(entries).await?;
        info!("> Done");

        warn!(
            "Got {} ovens. Please VERIFY that number is matched here: {}",
            ovens.len(),
            self.config.explorer_url
        );

        info!("> Writing voter and oven data.");
        write_reconciliation(
            &self.config.voters_path,
            &voters,
            &self.config.ovens_path,
            &ovens,
        )?;

        Ok(ReconcileReport { voters, ovens })
    }
}
