// Disbursement Engine - sends a static transfer list on chain
//
// Run Flow:
// 1. Sum the intended amounts and show the total
// 2. Pause so an operator can abort before anything is sent
// 3. Resolve the token contract once
// 4. For each intent, in input order: submit, wait for confirmation,
//    append to the ledger. A failed item is logged and skipped.
// 5. Rewrite the ledger from the in-memory completed list

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult, InputError};
use crate::execution::{ChainClient, ContractHandle};
use crate::ledger::models::{
    CompletedTransfer, DisbursementReport, FailureStage, TransferFailure, TransferIntent,
};
use crate::ledger::LedgerWriter;

pub const MIN_SAFETY_PAUSE_SECS: u64 = 1;

#[derive(Debug, Clone)]
pub struct DisbursementConfig {
    /// FA1.2 token contract
    pub token_contract: String,
    /// Address the tokens are sent from (the signer)
    pub source: String,
    pub confirmations: u32,
    pub safety_pause: Duration,
    pub ledger_path: PathBuf,
}

impl DisbursementConfig {
    pub fn from_config(
        config: &Config,
        source: impl Into<String>,
        ledger_path: impl Into<PathBuf>,
    ) -> AppResult<Self> {
        let mut disbursement = Self {
            token_contract: config.require_token_contract()?.to_string(),
            source: source.into(),
            confirmations: config.confirmations,
            safety_pause: Duration::ZERO,
            ledger_path: ledger_path.into(),
        };
        disbursement.set_safety_pause(config.safety_pause_secs)?;
        Ok(disbursement)
    }

    /// The operator window cannot be switched off.
    pub fn set_safety_pause(&mut self, secs: u64) -> AppResult<()> {
        if secs < MIN_SAFETY_PAUSE_SECS {
            return Err(AppError::Config(format!(
                "safety pause must be at least {}s, got {}s",
                MIN_SAFETY_PAUSE_SECS, secs
            )));
        }
        self.safety_pause = Duration::from_secs(secs);
        Ok(())
    }
}

/// Exact sum of all intended amounts.
pub fn total_amount(intents: &[TransferIntent]) -> AppResult<BigDecimal> {
    intents
        .iter()
        .try_fold(BigDecimal::from(0), |total, intent| {
            intent
                .amount_value()
                .map(|amount| total + amount)
                .ok_or_else(|| {
                    AppError::Input(InputError::BadAmount {
                        address: intent.address.clone(),
                        amount: intent.amount.clone(),
                    })
                })
        })
}

pub struct DisbursementEngine {
    config: DisbursementConfig,
    client: Arc<dyn ChainClient>,
}

impl DisbursementEngine {
    pub fn new(config: DisbursementConfig, client: Arc<dyn ChainClient>) -> Self {
        Self { config, client }
    }

    /// Blocking operator window before the first mutation.
    pub async fn safety_pause(&self, total: &BigDecimal, count: usize) {
        warn!(
            "⚠️ About to distribute {} across {} transfers from {}",
            total, count, self.config.source
        );
        warn!(
            "⏳ Sleeping for {}s while you ponder that. Kill the process now to abort.",
            self.config.safety_pause.as_secs()
        );
        tokio::time::sleep(self.config.safety_pause).await;
    }

    /// Submit and confirm a single transfer.
    ///
    /// Never touches the ledger; the caller decides what to record.
    pub async fn process_one(
        &self,
        contract: &ContractHandle,
        index: usize,
        intent: &TransferIntent,
    ) -> Result<CompletedTransfer, TransferFailure> {
        info!(">> Sending {} to {}", intent.amount, intent.address);

        let operation = self
            .client
            .submit_transfer(contract, &self.config.source, &intent.address, &intent.amount)
            .await
            .map_err(|error| TransferFailure {
                index,
                intent: intent.clone(),
                stage: FailureStage::Submission,
                operation_hash: None,
                error,
            })?;

        info!(
            ">> Sent in hash {}. Waiting for {} confirmation(s).",
            operation.hash, self.config.confirmations
        );

        self.client
            .await_confirmation(&operation, self.config.confirmations)
            .await
            .map_err(|error| TransferFailure {
                index,
                intent: intent.clone(),
                stage: FailureStage::Confirmation,
                operation_hash: Some(operation.hash.clone()),
                error,
            })?;

        info!(">> Confirmed.");
        Ok(CompletedTransfer::from_intent(intent, operation.hash))
    }

    /// Run the whole list. Per-item failures are collected, not returned.
    #[instrument(skip(self, intents), fields(run_id = tracing::field::Empty, count = intents.len()))]
    pub async fn run(&self, intents: &[TransferIntent]) -> AppResult<DisbursementReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();

        info!("> Deploying from: {}", self.config.source);
        info!("> Token contract: {}", self.config.token_contract);

        let total = total_amount(intents)?;
        info!("> About to distribute {} in {} transfers", total, intents.len());
        self.safety_pause(&total, intents.len()).await;

        let contract = self.client.contract_at(&self.config.token_contract).await?;

        let mut ledger = LedgerWriter::create(&self.config.ledger_path)?;
        let mut completed = Vec::with_capacity(intents.len());
        let mut failed = Vec::new();

        for (index, intent) in intents.iter().enumerate() {
            info!(">> Processing {} of {}", index + 1, intents.len());

            match self.process_one(&contract, index, intent).await {
                Ok(transfer) => {
                    ledger.append(&transfer)?;
                    completed.push(transfer);
                }
                Err(failure) => {
                    log_failure(&failure);
                    failed.push(failure);
                }
            }
        }

        info!("> Writing results.");
        let path = ledger.finish(&completed)?;
        info!("> Written to {}", path.display());

        let report = DisbursementReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total,
            completed,
            failed,
        };
        summarize(&report);
        Ok(report)
    }
}

fn log_failure(failure: &TransferFailure) {
    match &failure.operation_hash {
        Some(hash) => warn!(
            "❌ Transfer of {} to {} failed at {} (operation {}): {}. Please verify manually.",
            failure.intent.amount, failure.intent.address, failure.stage, hash, failure.error
        ),
        None => warn!(
            "❌ Transfer of {} to {} failed at {}: {}. Please verify manually.",
            failure.intent.amount, failure.intent.address, failure.stage, failure.error
        ),
    }
}

fn summarize(report: &DisbursementReport) {
    let elapsed = report.finished_at - report.started_at;
    info!(
        "✓ Run {} finished in {}s: {} confirmed, {} failed",
        report.run_id,
        elapsed.num_seconds(),
        report.completed.len(),
        report.failed.len()
    );

    if report.is_clean() {
        return;
    }

    for failure in &report.failed {
        error!(
            "   #{} {}, {} ({}{})",
            failure.index + 1,
            failure.intent.address,
            failure.intent.amount,
            failure.stage,
            failure
                .operation_hash
                .as_deref()
                .map(|h| format!(", operation {}", h))
                .unwrap_or_default()
        );
    }
    warn!(
        "⚠️ Transfers are not idempotent. Remove confirmed rows from the input before re-running."
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::execution::OperationHandle;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;

    /// Chain client that fails for chosen recipients
    #[derive(Default)]
    struct MockChain {
        fail_submit: HashSet<String>,
        fail_confirm: HashSet<String>,
        submitted: Mutex<Vec<(String, String, String)>>,
        submitted_at: Mutex<Vec<tokio::time::Instant>>,
        fail_contract: bool,
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn contract_at(&self, address: &str) -> Result<ContractHandle, ChainError> {
            if self.fail_contract {
                return Err(ChainError::MissingEntrypoint {
                    address: address.to_string(),
                    entrypoint: "transfer".to_string(),
                });
            }
            Ok(ContractHandle {
                address: address.to_string(),
            })
        }

        async fn submit_transfer(
            &self,
            _contract: &ContractHandle,
            from: &str,
            to: &str,
            amount: &str,
        ) -> Result<OperationHandle, ChainError> {
            if self.fail_submit.contains(to) {
                return Err(ChainError::Rpc {
                    endpoint: "/injection/operation".to_string(),
                    message: format!("rejected {}", to),
                });
            }
            self.submitted
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_string(), amount.to_string()));
            self.submitted_at
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            Ok(OperationHandle {
                hash: format!("oo{}", to),
                injected_at_level: 1,
            })
        }

        async fn await_confirmation(
            &self,
            operation: &OperationHandle,
            _confirmations: u32,
        ) -> Result<(), ChainError> {
            let recipient = operation.hash.trim_start_matches("oo");
            if self.fail_confirm.contains(recipient) {
                return Err(ChainError::ConfirmationTimeout {
                    operation_hash: operation.hash.clone(),
                    waited_secs: 0,
                });
            }
            Ok(())
        }

        async fn get_balance(&self, _address: &str) -> Result<u64, ChainError> {
            Ok(0)
        }
    }

    fn engine(chain: Arc<MockChain>, ledger_path: PathBuf) -> DisbursementEngine {
        DisbursementEngine::new(
            DisbursementConfig {
                token_contract: "KT1token".to_string(),
                source: "tz1source".to_string(),
                confirmations: 1,
                safety_pause: Duration::ZERO,
                ledger_path,
            },
            chain,
        )
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_total_amount_is_exact() {
        let intents = vec![
            TransferIntent::new("a", "99999999999999999999999999999999"),
            TransferIntent::new("b", "1"),
            TransferIntent::new("c", "18446744073709551615"),
        ];
        let total = total_amount(&intents).unwrap();
        assert_eq!(
            total,
            "100000000000018446744073709551615"
                .parse::<BigDecimal>()
                .unwrap()
        );
        assert_eq!(total.to_string(), "100000000000018446744073709551615");
    }

    #[test]
    fn test_total_of_empty_list_is_zero() {
        assert_eq!(total_amount(&[]).unwrap(), BigDecimal::from(0));
    }

    #[test]
    fn test_non_numeric_amount_is_input_error() {
        let intents = vec![TransferIntent::new("tz1a", "1"), TransferIntent::new("tz1b", "lots")];
        match total_amount(&intents) {
            Err(AppError::Input(InputError::BadAmount { address, amount })) => {
                assert_eq!(address, "tz1b");
                assert_eq!(amount, "lots");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_safety_pause_is_rejected() {
        let mut config = Config::from_env().unwrap();
        config.token_contract = "KT1token".to_string();
        config.safety_pause_secs = 0;
        assert!(matches!(
            DisbursementConfig::from_config(&config, "tz1source", "ledger.csv"),
            Err(AppError::Config(_))
        ));

        config.safety_pause_secs = 120;
        let mut disbursement =
            DisbursementConfig::from_config(&config, "tz1source", "ledger.csv").unwrap();
        assert_eq!(disbursement.safety_pause, Duration::from_secs(120));

        assert!(matches!(
            disbursement.set_safety_pause(0),
            Err(AppError::Config(_))
        ));
        assert_eq!(disbursement.safety_pause, Duration::from_secs(120));

        disbursement.set_safety_pause(5).unwrap();
        assert_eq!(disbursement.safety_pause, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_is_sent_before_the_pause_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let chain = Arc::new(MockChain::default());
        let mut engine = engine(chain.clone(), path);
        engine.config.safety_pause = Duration::from_secs(120);

        let started = tokio::time::Instant::now();
        engine
            .run(&[TransferIntent::new("addr1", "100")])
            .await
            .unwrap();

        let submitted_at = chain.submitted_at.lock().unwrap();
        assert_eq!(submitted_at.len(), 1);
        assert!(submitted_at[0] - started >= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_all_transfers_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completed_airdrops.csv");
        let chain = Arc::new(MockChain::default());
        let engine = engine(chain.clone(), path.clone());

        let intents = vec![
            TransferIntent::new("addr1", "100"),
            TransferIntent::new("addr2", "250"),
        ];
        let report = engine.run(&intents).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.total, BigDecimal::from(350));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "address, amount (mutez), operation hash,\n\
             addr1, 100, ooaddr1,\n\
             addr2, 250, ooaddr2,\n"
        );

        let submitted = chain.submitted.lock().unwrap();
        assert_eq!(
            *submitted,
            vec![
                ("tz1source".to_string(), "addr1".to_string(), "100".to_string()),
                ("tz1source".to_string(), "addr2".to_string(), "250".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_submission_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let chain = Arc::new(MockChain {
            fail_submit: set(&["addrB"]),
            ..MockChain::default()
        });
        let engine = engine(chain, path.clone());

        let intents = vec![
            TransferIntent::new("addrA", "100"),
            TransferIntent::new("addrB", "50"),
        ];
        let report = engine.run(&intents).await.unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        let failure = &report.failed[0];
        assert_eq!(failure.intent.address, "addrB");
        assert_eq!(failure.index, 1);
        assert_eq!(failure.stage, FailureStage::Submission);
        assert!(failure.operation_hash.is_none());

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "address, amount (mutez), operation hash,\naddrA, 100, ooaddrA,\n"
        );
    }

    /// Shared buffer the test subscriber formats into
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_failed_submission_warns_with_recipient_and_amount() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(MockChain {
            fail_submit: set(&["addrB"]),
            ..MockChain::default()
        });
        let engine = engine(chain, dir.path().join("ledger.csv"));

        engine
            .run(&[
                TransferIntent::new("addrA", "100"),
                TransferIntent::new("addrB", "50"),
            ])
            .await
            .unwrap();

        let output = logs.contents();
        let warning = output
            .lines()
            .find(|line| line.contains("WARN") && line.contains("addrB"))
            .unwrap_or_else(|| panic!("no warning for addrB in:\n{}", output));
        assert!(warning.contains("50"));
        assert!(!output.lines().any(|line| line.contains("WARN") && line.contains("addrA")));
    }

    #[tokio::test]
    async fn test_failure_in_the_middle_keeps_later_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let chain = Arc::new(MockChain {
            fail_submit: set(&["b"]),
            fail_confirm: set(&["d"]),
            ..MockChain::default()
        });
        let engine = engine(chain, path.clone());

        let intents: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|a| TransferIntent::new(*a, "1"))
            .collect();
        let report = engine.run(&intents).await.unwrap();

        let done: Vec<_> = report.completed.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(done, vec!["a", "c", "e"]);

        let confirm_failure = report
            .failed
            .iter()
            .find(|f| f.intent.address == "d")
            .unwrap();
        assert_eq!(confirm_failure.stage, FailureStage::Confirmation);
        assert_eq!(confirm_failure.operation_hash.as_deref(), Some("ood"));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
        assert!(!contents.contains("ood"));
    }

    #[tokio::test]
    async fn test_process_one_is_independent_of_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let chain = Arc::new(MockChain {
            fail_confirm: set(&["tz1late"]),
            ..MockChain::default()
        });
        let engine = engine(chain, path.clone());
        let contract = ContractHandle {
            address: "KT1token".to_string(),
        };

        let ok = engine
            .process_one(&contract, 0, &TransferIntent::new("tz1fine", "5"))
            .await
            .unwrap();
        assert_eq!(ok.operation_hash, "ootz1fine");

        let failure = engine
            .process_one(&contract, 1, &TransferIntent::new("tz1late", "5"))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, FailureStage::Confirmation);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_contract_resolution_failure_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let chain = Arc::new(MockChain {
            fail_contract: true,
            ..MockChain::default()
        });
        let engine = engine(chain.clone(), path.clone());

        let result = engine.run(&[TransferIntent::new("addr1", "100")]).await;

        assert!(matches!(result, Err(AppError::Chain(_))));
        assert!(chain.submitted.lock().unwrap().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rerun_replaces_previous_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "address, amount (mutez), operation hash,\nold, 1, ooOld,\n").unwrap();

        let engine = engine(Arc::new(MockChain::default()), path.clone());
        engine
            .run(&[TransferIntent::new("new", "2")])
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "address, amount (mutez), operation hash,\nnew, 2, oonew,\n"
        );
    }
}
