use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{
    Influencer, ProcessedSignalRecord, Signal, SignalBatch, Stake, Subscriber, SummaryIncrement,
    UserSignalSummary, UserTradeValueUpdate,
};
use common::store::{
    InfluencerStore, SignalLedger, SignalStore, StakeStore, StoreError, StoreHealth,
    TradeUpdateAudit,
};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::decode_timestamp;
use crate::repositories::ledger_repo::SummaryRow;
use crate::repositories::{
    InfluencerRepository, ProcessedSignalRepository, SignalRepository, SignalSummaryRepository,
    StakeRepository, TradeUpdateRepository,
};

/// SQLite-backed implementation of every store interface.
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn save_influencer(&self, influencer: &Influencer) -> Result<(), StoreError> {
        InfluencerRepository::upsert(&self.pool, &influencer.name)
            .await
            .map_err(StoreError::database)?;
        InfluencerRepository::insert_subscribers(&self.pool, &influencer.name, &influencer.subscribers)
            .await
            .map_err(StoreError::database)
    }

    pub async fn save_signals(&self, signals: &[Signal]) -> Result<(), StoreError> {
        SignalRepository::insert_batch(&self.pool, signals)
            .await
            .map_err(StoreError::database)
    }

    pub async fn save_stakes(&self, stakes: &[Stake]) -> Result<(), StoreError> {
        StakeRepository::insert_batch(&self.pool, stakes)
            .await
            .map_err(StoreError::database)
    }
}

#[async_trait]
impl InfluencerStore for SqliteStore {
    async fn influencers(&self) -> Result<Vec<Influencer>, StoreError> {
        let rows = InfluencerRepository::fetch_all(&self.pool)
            .await
            .map_err(StoreError::database)?;

        let mut influencers: Vec<Influencer> = Vec::new();
        for row in rows {
            if influencers.last().map(|i| i.name.as_str()) != Some(row.name.as_str()) {
                influencers.push(Influencer {
                    name: row.name.clone(),
                    subscribers: Vec::new(),
                });
            }

            let (Some(address), Some(username), Some(subscribed_at)) =
                (row.address, row.username, row.subscribed_at)
            else {
                continue;
            };

            let subscribed_at = match decode_timestamp(&subscribed_at, "subscriber") {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("Skipping subscriber {} of {}: {}", address, row.name, e);
                    continue;
                }
            };

            if let Some(influencer) = influencers.last_mut() {
                influencer.subscribers.push(Subscriber {
                    address,
                    username,
                    subscribed_at,
                });
            }
        }

        Ok(influencers)
    }
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn signals_for_account(
        &self,
        account: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SignalBatch, StoreError> {
        let rows = SignalRepository::for_account_between(&self.pool, account, from, to)
            .await
            .map_err(StoreError::database)?;

        let mut batch = SignalBatch::default();
        for row in rows {
            let id = row.id.clone();
            match Signal::try_from(row) {
                Ok(signal) if signal.generated_at < from || signal.generated_at > to => {}
                Ok(signal) => batch.signals.push(signal),
                Err(e) => {
                    warn!("Quarantined signal {:?} of {}: {}", id, account, e);
                    batch.quarantined += 1;
                }
            }
        }

        batch
            .signals
            .sort_by(|a, b| a.generated_at.cmp(&b.generated_at).then(a.id.cmp(&b.id)));

        debug!(
            "Loaded {} signals for {} ({} quarantined)",
            batch.signals.len(),
            account,
            batch.quarantined
        );
        Ok(batch)
    }
}

#[async_trait]
impl SignalLedger for SqliteStore {
    async fn already_processed(&self, subscriber: &str) -> Result<HashSet<String>, StoreError> {
        let ids = ProcessedSignalRepository::signal_ids_for(&self.pool, subscriber)
            .await
            .map_err(StoreError::database)?;
        Ok(ids.into_iter().collect())
    }

    async fn record_processed(
        &self,
        subscriber: &str,
        records: &[ProcessedSignalRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        ProcessedSignalRepository::insert_batch(&self.pool, records)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate {
                    subscriber: subscriber.to_string(),
                    signal_id: duplicate_hint(records),
                },
                other => StoreError::database(other),
            })
    }

    async fn current_summary(
        &self,
        subscriber: &str,
    ) -> Result<Option<UserSignalSummary>, StoreError> {
        SignalSummaryRepository::fetch(&self.pool, subscriber)
            .await
            .map_err(StoreError::database)?
            .map(summary_from_row)
            .transpose()
    }

    async fn apply_summary_increment(&self, increment: &SummaryIncrement) -> Result<(), StoreError> {
        SignalSummaryRepository::increment(&self.pool, increment)
            .await
            .map_err(StoreError::database)
    }
}

#[async_trait]
impl StakeStore for SqliteStore {
    async fn unexited_stakes(&self) -> Result<Vec<Stake>, StoreError> {
        let rows = StakeRepository::unexited(&self.pool)
            .await
            .map_err(StoreError::database)?;

        let mut stakes = Vec::with_capacity(rows.len());
        for row in rows {
            let key = format!("{}#{}", row.owner_address, row.stake_index);
            match Stake::try_from(row) {
                Ok(stake) => stakes.push(stake),
                Err(e) => warn!("Skipping undecodable stake {}: {}", key, e),
            }
        }
        Ok(stakes)
    }

    async fn mark_exited(
        &self,
        owner: &str,
        index: u64,
        exited_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let index = i64::try_from(index).map_err(StoreError::database)?;
        let updated = StakeRepository::mark_exited(&self.pool, owner, index, exited_at)
            .await
            .map_err(StoreError::database)?;

        if updated == 0 {
            warn!("Stake {}#{} was not pending exit", owner, index);
        }
        Ok(())
    }
}

#[async_trait]
impl TradeUpdateAudit for SqliteStore {
    async fn append_update(&self, update: &UserTradeValueUpdate) -> Result<(), StoreError> {
        TradeUpdateRepository::insert(&self.pool, update)
            .await
            .map_err(StoreError::database)
    }
}

#[async_trait]
impl StoreHealth for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(StoreError::database)
    }
}

fn summary_from_row(row: SummaryRow) -> Result<UserSignalSummary, StoreError> {
    Ok(UserSignalSummary {
        total_signals_processed: u64::try_from(row.total_signals_processed).map_err(|_| {
            StoreError::Decode {
                entity: "signal summary",
                reason: format!(
                    "negative signal count {} for {}",
                    row.total_signals_processed, row.subscriber_address
                ),
            }
        })?,
        total_pnl_percentage: row.total_pnl_percentage,
        last_processed_at: decode_timestamp(&row.last_processed_at, "signal summary")?,
        last_signal_date: decode_timestamp(&row.last_signal_date, "signal summary")?,
        subscriber_address: row.subscriber_address,
    })
}

/// SQLite does not say which row tripped the constraint; name the batch instead.
fn duplicate_hint(records: &[ProcessedSignalRecord]) -> String {
    match records {
        [single] => single.signal_id.clone(),
        _ => records
            .iter()
            .map(|r| r.signal_id.as_str())
            .collect::<Vec<_>>()
            .join(","),
    }
}
