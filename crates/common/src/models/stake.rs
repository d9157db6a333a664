use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A staked position as mirrored from the staking contract.
/// Amounts are in the token's minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    pub owner_address: String,
    pub index: u64,
    pub stake_amount: u128,
    pub trading_amount: u128,
    pub opened_at: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
}

impl Stake {
    pub fn is_ready_to_exit(&self, now: DateTime<Utc>) -> bool {
        now >= self.exit_timestamp
    }
}

/// Live view of a stake as reported by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeDetails {
    pub stake_amount: u128,
    pub trading_amount: u128,
    pub active: bool,
    pub trade_active: bool,
}
