use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::ChainError;
use crate::execution::client::{ChainClient, ContractHandle, OperationHandle};
use crate::execution::signer::InMemorySigner;
use crate::retry::{is_transient_error, is_transient_status, RetryPolicy};

const TRANSFER_ENTRYPOINT: &str = "transfer";

#[derive(Debug, Clone)]
pub struct TezosConfig {
    pub rpc_url: String,
    pub fee_mutez: u64,
    pub gas_limit: u64,
    pub storage_limit: u64,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TezosConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.api.tez.ie".to_string(),
            fee_mutez: 10_000,
            gas_limit: 40_000,
            storage_limit: 300,
            poll_interval: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for TezosConfig {
    fn from(config: &Config) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            fee_mutez: config.fee_mutez,
            gas_limit: config.gas_limit,
            storage_limit: config.storage_limit,
            poll_interval: config.poll_interval(),
            confirmation_timeout: config.confirmation_timeout(),
            retry: RetryPolicy::new(config.http_retries, config.retry_backoff()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    level: i64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct EntrypointsResponse {
    entrypoints: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ForgeRequest<'a> {
    branch: &'a str,
    contents: Vec<TransactionContent<'a>>,
}

#[derive(Debug, Serialize)]
struct TransactionContent<'a> {
    kind: &'static str,
    source: &'a str,
    fee: String,
    counter: String,
    gas_limit: String,
    storage_limit: String,
    amount: &'static str,
    destination: &'a str,
    parameters: TransactionParameters,
}

#[derive(Debug, Serialize)]
struct TransactionParameters {
    entrypoint: &'static str,
    value: serde_json::Value,
}

/// FA1.2 `transfer` argument: `Pair from (Pair to amount)`
fn fa12_transfer_value(from: &str, to: &str, amount: &str) -> serde_json::Value {
    serde_json::json!({
        "prim": "Pair",
        "args": [
            { "string": from },
            {
                "prim": "Pair",
                "args": [ { "string": to }, { "int": amount } ]
            }
        ]
    })
}

/// Tezos node RPC client.
///
/// Operations are forged by the node, signed locally and injected. Reads
/// are retried on transient failures; forging and injection are not.
pub struct TezosRpcClient {
    config: TezosConfig,
    http: reqwest::Client,
    signer: Option<InMemorySigner>,
}

impl TezosRpcClient {
    /// Read-only client (balances, contract lookup, confirmations)
    pub fn new(config: TezosConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: InMemorySigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.rpc_url.trim_end_matches('/'), path)
    }

    async fn rpc_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            let outcome = match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.json::<T>().await.map_err(|e| ChainError::Decode {
                        endpoint: path.to_string(),
                        message: e.to_string(),
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = ChainError::RpcStatus {
                        endpoint: path.to_string(),
                        status: status.as_u16(),
                        body,
                    };
                    (is_transient_status(status), error)
                }
                Err(e) => (
                    is_transient_error(&e),
                    ChainError::Rpc {
                        endpoint: path.to_string(),
                        message: e.to_string(),
                    },
                ),
            };

            let (transient, error) = outcome;
            if !transient || attempt >= self.config.retry.retries {
                return Err(error);
            }

            attempt += 1;
            let delay = self.config.retry.delay_for(attempt);
            warn!(
                "⚠️ RPC {} failed ({}), retry {}/{} in {:?}",
                path, error, attempt, self.config.retry.retries, delay
            );
            time::sleep(delay).await;
        }
    }

    async fn rpc_post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ChainError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc {
                endpoint: path.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::RpcStatus {
                endpoint: path.to_string(),
                status,
                body,
            });
        }

        response.json::<T>().await.map_err(|e| ChainError::Decode {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn head_header(&self) -> Result<BlockHeader, ChainError> {
        self.rpc_get("/chains/main/blocks/head/header").await
    }

    async fn operation_hashes_at(&self, level: i64) -> Result<Vec<Vec<String>>, ChainError> {
        self.rpc_get(&format!("/chains/main/blocks/{}/operation_hashes", level))
            .await
    }

    async fn next_counter(&self, address: &str) -> Result<u64, ChainError> {
        let path = format!("/chains/main/blocks/head/context/contracts/{}/counter", address);
        let counter: String = self.rpc_get(&path).await?;
        let current = counter.parse::<u64>().map_err(|e| ChainError::Decode {
            endpoint: path,
            message: format!("counter '{}': {}", counter, e),
        })?;
        Ok(current + 1)
    }
}

#[async_trait]
impl ChainClient for TezosRpcClient {
    #[instrument(skip(self))]
    async fn contract_at(&self, address: &str) -> Result<ContractHandle, ChainError> {
        let response: EntrypointsResponse = self
            .rpc_get(&format!(
                "/chains/main/blocks/head/context/contracts/{}/entrypoints",
                address
            ))
            .await?;

        if !response.entrypoints.contains_key(TRANSFER_ENTRYPOINT) {
            return Err(ChainError::MissingEntrypoint {
                address: address.to_string(),
                entrypoint: TRANSFER_ENTRYPOINT.to_string(),
            });
        }

        debug!("Resolved token contract {}", address);
        Ok(ContractHandle {
            address: address.to_string(),
        })
    }

    #[instrument(skip(self, contract), fields(contract = %contract.address))]
    async fn submit_transfer(
        &self,
        contract: &ContractHandle,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<OperationHandle, ChainError> {
        let signer = self.signer.as_ref().ok_or(ChainError::MissingSigner)?;
        let source = signer.public_key_hash();
        if from != source {
            return Err(ChainError::InvalidKey(format!(
                "transfer source {} does not match signing key {}",
                from, source
            )));
        }

        let head = self.head_header().await?;
        let counter = self.next_counter(source).await?;

        let request = ForgeRequest {
            branch: &head.hash,
            contents: vec![TransactionContent {
                kind: "transaction",
                source,
                fee: self.config.fee_mutez.to_string(),
                counter: counter.to_string(),
                gas_limit: self.config.gas_limit.to_string(),
                storage_limit: self.config.storage_limit.to_string(),
                amount: "0",
                destination: &contract.address,
                parameters: TransactionParameters {
                    entrypoint: TRANSFER_ENTRYPOINT,
                    value: fa12_transfer_value(from, to, amount),
                },
            }],
        };

        let forged_hex: String = self
            .rpc_post("/chains/main/blocks/head/helpers/forge/operations", &request)
            .await?;
        let forged = hex::decode(&forged_hex).map_err(|e| ChainError::Decode {
            endpoint: "helpers/forge/operations".to_string(),
            message: format!("forged bytes are not hex: {}", e),
        })?;

        let signature = signer.sign_operation(&forged);
        debug!("Signed with {}", InMemorySigner::encode_signature(&signature));
        let signed_hex = format!("{}{}", forged_hex, hex::encode(signature));

        let hash: String = self
            .rpc_post("/injection/operation?chain=main", &signed_hex)
            .await?;

        info!("Injected {} at level {} (counter {})", hash, head.level, counter);
        Ok(OperationHandle {
            hash,
            injected_at_level: head.level,
        })
    }

    #[instrument(skip(self, operation), fields(operation = %operation.hash))]
    async fn await_confirmation(
        &self,
        operation: &OperationHandle,
        confirmations: u32,
    ) -> Result<(), ChainError> {
        let start = Instant::now();
        let mut next_level = operation.injected_at_level + 1;
        let mut included_at: Option<i64> = None;

        loop {
            let head = self.head_header().await?;

            while included_at.is_none() && next_level <= head.level {
                let hashes = self.operation_hashes_at(next_level).await?;
                if hashes.iter().flatten().any(|h| h == &operation.hash) {
                    debug!("Operation {} included at level {}", operation.hash, next_level);
                    included_at = Some(next_level);
                }
                next_level += 1;
            }

            if let Some(level) = included_at {
                let depth = head.level - level + 1;
                if depth >= i64::from(confirmations) {
                    return Ok(());
                }
            }

            if start.elapsed() >= self.config.confirmation_timeout {
                return Err(ChainError::ConfirmationTimeout {
                    operation_hash: operation.hash.clone(),
                    waited_secs: start.elapsed().as_secs(),
                });
            }

            time::sleep(self.config.poll_interval).await;
        }
    }

    async fn get_balance(&self, address: &str) -> Result<u64, ChainError> {
        let path = format!("/chains/main/blocks/head/context/contracts/{}/balance", address);
        let balance: String = self.rpc_get(&path).await?;
        balance.parse::<u64>().map_err(|e| ChainError::Decode {
            endpoint: path,
            message: format!("balance '{}': {}", balance, e),
        })
    }
}
