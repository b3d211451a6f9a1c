pub mod config;
pub mod distribution;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod providers;
pub mod reconcile;
pub mod retry;
