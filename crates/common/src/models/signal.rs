use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A backtested trade outcome published by an influencer account.
///
/// `final_pnl` is kept exactly as the backtester wrote it (e.g. `"+12.34%"`);
/// interpreting it is left to the aggregation code so that a malformed value
/// only ever costs that one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub account: String,
    pub generated_at: DateTime<Utc>,
    pub final_pnl: Option<String>,
    pub backtest_done: bool,
}

/// Signals decoded from storage, plus the number of rows that could not be
/// decoded and were left out.
#[derive(Debug, Clone, Default)]
pub struct SignalBatch {
    pub signals: Vec<Signal>,
    pub quarantined: usize,
}
