use common::chain::ContractError;
use common::models::StakeDetails;
use serde::Deserialize;

use crate::traits::{RelayerResponse, parse_amount};

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(rename(deserialize = "chainId"))]
    pub chain_id: Option<u64>,
}

impl RelayerResponse<()> for HealthResponse {
    fn to_domain(self) -> Result<(), ContractError> {
        if self.status.eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(ContractError::InvalidResponse {
                call: "health",
                reason: format!("relayer reports status {:?}", self.status),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StakeCountResponse {
    pub count: u64,
}

impl RelayerResponse<u64> for StakeCountResponse {
    fn to_domain(self) -> Result<u64, ContractError> {
        Ok(self.count)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeDetailsResponse {
    pub stake_amount: String,
    pub trading_amount: String,
    pub active: bool,
    pub trade_active: bool,
}

impl RelayerResponse<StakeDetails> for StakeDetailsResponse {
    fn to_domain(self) -> Result<StakeDetails, ContractError> {
        Ok(StakeDetails {
            stake_amount: parse_amount("getStakeDetails", "stakeAmount", &self.stake_amount)?,
            trading_amount: parse_amount("getStakeDetails", "tradingAmount", &self.trading_amount)?,
            active: self.active,
            trade_active: self.trade_active,
        })
    }
}
