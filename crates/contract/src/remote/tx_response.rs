use common::chain::{ContractError, ExitReceipt};
use serde::Deserialize;

use crate::traits::RelayerResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Reverted,
}

/// Result of a submitted `updateTradeValue` transaction, returned once the
/// relayer has seen it mined.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub tx_hash: Option<String>,
    pub status: TxStatus,
}

impl RelayerResponse<String> for TransactionResponse {
    fn to_domain(self) -> Result<String, ContractError> {
        match (self.status, self.tx_hash) {
            (TxStatus::Confirmed, Some(hash)) => Ok(hash),
            (TxStatus::Confirmed, None) => Err(ContractError::InvalidResponse {
                call: "updateTradeValue",
                reason: "confirmed transaction without a hash".to_string(),
            }),
            (TxStatus::Reverted, hash) => Err(ContractError::Reverted(
                hash.unwrap_or_else(|| "<unknown>".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitTradeResponse {
    pub success: bool,
    pub tx_hash: Option<String>,
}

impl RelayerResponse<ExitReceipt> for ExitTradeResponse {
    fn to_domain(self) -> Result<ExitReceipt, ContractError> {
        Ok(ExitReceipt {
            success: self.success,
            tx_hash: self.tx_hash.filter(|hash| !hash.trim().is_empty()),
        })
    }
}
