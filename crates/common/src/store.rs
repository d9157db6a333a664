//! Narrow storage interfaces, one per collection the reconciler touches.
//!
//! Components receive these as trait objects; the concrete store and its
//! connection lifecycle are owned by whoever starts the run.

use std::collections::HashSet;
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Influencer, ProcessedSignalRecord, SignalBatch, Stake, SummaryIncrement, UserSignalSummary,
    UserTradeValueUpdate,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Signal {signal_id} already recorded as processed for {subscriber}")]
    Duplicate {
        subscriber: String,
        signal_id: String,
    },
    #[error("Failed to decode {entity}: {reason}")]
    Decode {
        entity: &'static str,
        reason: String,
    },
}

impl StoreError {
    pub fn database(err: impl Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait InfluencerStore: Send + Sync {
    async fn influencers(&self) -> Result<Vec<Influencer>, StoreError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Backtested signals with a non-empty P&L published by `account` with a
    /// generation time in `[from, to]`.
    async fn signals_for_account(
        &self,
        account: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SignalBatch, StoreError>;
}

/// The set of (subscriber, signal) pairs already counted, plus the running
/// per-subscriber summary derived from it.
///
/// Uniqueness of (subscriber, signal) holds only while runs do not overlap;
/// callers must hold the run lease before writing.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait SignalLedger: Send + Sync {
    async fn already_processed(&self, subscriber: &str) -> Result<HashSet<String>, StoreError>;

    /// All-or-nothing. An empty batch is a no-op.
    async fn record_processed(
        &self,
        subscriber: &str,
        records: &[ProcessedSignalRecord],
    ) -> Result<(), StoreError>;

    async fn current_summary(&self, subscriber: &str)
    -> Result<Option<UserSignalSummary>, StoreError>;

    async fn apply_summary_increment(&self, increment: &SummaryIncrement) -> Result<(), StoreError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait StakeStore: Send + Sync {
    /// Every stake that has not been settled through an exit yet.
    async fn unexited_stakes(&self) -> Result<Vec<Stake>, StoreError>;

    async fn mark_exited(
        &self,
        owner: &str,
        index: u64,
        exited_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait TradeUpdateAudit: Send + Sync {
    async fn append_update(&self, update: &UserTradeValueUpdate) -> Result<(), StoreError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Everything a full reconciliation run needs from storage.
pub trait Store:
    InfluencerStore + SignalStore + SignalLedger + StakeStore + TradeUpdateAudit + StoreHealth
{
}

impl<T> Store for T where
    T: InfluencerStore + SignalStore + SignalLedger + StakeStore + TradeUpdateAudit + StoreHealth
{
}
