use async_trait::async_trait;

use crate::error::ChainError;

/// A resolved token contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub address: String,
}

/// An injected operation that may not be included yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub hash: String,
    /// Head level when the operation was injected; inclusion is searched
    /// for from the next block onwards.
    pub injected_at_level: i64,
}

/// Chain client - everything the distribution and reconciliation
/// workflows need from a node.
///
/// Implementations must not retry `submit_transfer`: no idempotency key is
/// attached to a transfer, so a retried submission can double-send.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Resolve a token contract and check it exposes `transfer`
    async fn contract_at(&self, address: &str) -> Result<ContractHandle, ChainError>;

    /// Sign and inject `transfer(from, to, amount)` on the token contract
    async fn submit_transfer(
        &self,
        contract: &ContractHandle,
        from: &str,
        to: &str,
        amount: &str,
    ) -> Result<OperationHandle, ChainError>;

    /// Block until the operation is included and `confirmations` blocks deep
    async fn await_confirmation(
        &self,
        operation: &OperationHandle,
        confirmations: u32,
    ) -> Result<(), ChainError>;

    /// Spendable balance in mutez
    async fn get_balance(&self, address: &str) -> Result<u64, ChainError>;
}
