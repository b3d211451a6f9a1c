use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ChainError;

/// A requested, not yet executed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Recipient, passed through to the chain client unvalidated
    pub address: String,
    /// Amount in the token's base unit, digits only
    pub amount: String,
}

impl TransferIntent {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }

    /// Amount as an exact decimal. Input parsing guarantees the string is
    /// all digits, so this only fails for hand-built intents.
    pub fn amount_value(&self) -> Option<BigDecimal> {
        self.amount.parse::<BigDecimal>().ok()
    }
}

/// A transfer that was submitted and confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTransfer {
    pub address: String,
    pub amount: String,
    pub operation_hash: String,
}

impl CompletedTransfer {
    pub fn from_intent(intent: &TransferIntent, operation_hash: impl Into<String>) -> Self {
        Self {
            address: intent.address.clone(),
            amount: intent.amount.clone(),
            operation_hash: operation_hash.into(),
        }
    }
}

/// Where a single transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    Submission,
    Confirmation,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Submission => write!(f, "submission"),
            FailureStage::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// A transfer that did not make it into the ledger
#[derive(Debug)]
pub struct TransferFailure {
    /// Zero-based position in the input list
    pub index: usize,
    pub intent: TransferIntent,
    pub stage: FailureStage,
    /// Set when the operation was injected but never confirmed. The
    /// operation may still land; check it before re-sending.
    pub operation_hash: Option<String>,
    pub error: ChainError,
}

/// Outcome of one distribution run
#[derive(Debug)]
pub struct DisbursementReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: BigDecimal,
    pub completed: Vec<CompletedTransfer>,
    pub failed: Vec<TransferFailure>,
}

impl DisbursementReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One big-map entry: oven address -> owner address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigMapEntry {
    pub key: String,
    pub value: String,
}

/// An oven enriched with its live balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvenRecord {
    pub oven_address: String,
    pub owner_address: String,
    /// Balance in mutez
    pub balance: u64,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Sorted, cross-checked voter addresses
    pub voters: Vec<String>,
    /// Ovens in snapshot order
    pub ovens: Vec<OvenRecord>,
}
