use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marks one signal as counted for one subscriber. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSignalRecord {
    pub subscriber_address: String,
    pub signal_id: String,
    pub influencer_name: String,
    pub final_pnl: String,
    pub signal_generated_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

/// Running totals per subscriber. Only ever moved forward by a `SummaryIncrement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSignalSummary {
    pub subscriber_address: String,
    pub total_signals_processed: u64,
    pub total_pnl_percentage: f64,
    pub last_processed_at: DateTime<Utc>,
    pub last_signal_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryIncrement {
    pub subscriber_address: String,
    pub signals_processed: u64,
    pub pnl_percentage: f64,
    pub processed_at: DateTime<Utc>,
    pub last_signal_date: DateTime<Utc>,
}
