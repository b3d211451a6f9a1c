pub mod client;
pub mod signer;
pub mod tezos;

pub use client::{ChainClient, ContractHandle, OperationHandle};
pub use signer::InMemorySigner;
pub use tezos::{TezosConfig, TezosRpcClient};
