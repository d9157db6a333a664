use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Periodic application of newly counted signals to a live trade.
    Periodic,
    /// One-shot settlement when a stake reaches its exit timestamp.
    Exit,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Periodic => "PERIODIC",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERIODIC" => Ok(Self::Periodic),
            "EXIT" => Ok(Self::Exit),
            other => Err(format!("unknown update kind: {other}")),
        }
    }
}

/// Audit row written after every confirmed on-chain value change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTradeValueUpdate {
    pub kind: UpdateKind,
    pub subscriber_address: String,
    pub stake_index: u64,
    pub original_trading_amount: u128,
    pub new_trade_value: u128,
    pub pnl_percentage: String,
    pub updated_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_kind_parses_its_own_label() {
        for kind in [UpdateKind::Periodic, UpdateKind::Exit] {
            assert_eq!(kind.as_str().parse::<UpdateKind>(), Ok(kind));
        }
        assert!("periodic".parse::<UpdateKind>().is_err());
    }
}
