//! Staking contract calls, abstracted away from how they reach the chain.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::StakeDetails;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{call} rejected with HTTP {status}: {body}")]
    Rejected {
        call: &'static str,
        status: u16,
        body: String,
    },
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    #[error("Invalid response to {call}: {reason}")]
    InvalidResponse { call: &'static str, reason: String },
}

/// What the relayer reported for an `exitTrade` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReceipt {
    pub success: bool,
    pub tx_hash: Option<String>,
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait StakingContract: Send + Sync {
    async fn health(&self) -> Result<(), ContractError>;

    async fn get_stake_count(&self, owner: &str) -> Result<u64, ContractError>;

    async fn get_stake_details(&self, owner: &str, index: u64)
    -> Result<StakeDetails, ContractError>;

    /// Returns the hash of the confirmed transaction.
    async fn update_trade_value(
        &self,
        owner: &str,
        index: u64,
        new_value: u128,
    ) -> Result<String, ContractError>;

    async fn exit_trade(
        &self,
        owner: &str,
        index: u64,
        final_value: u128,
    ) -> Result<ExitReceipt, ContractError>;
}
