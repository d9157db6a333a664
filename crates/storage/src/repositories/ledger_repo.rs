use common::models::{ProcessedSignalRecord, SummaryIncrement};
use sqlx::SqlitePool;

use crate::db::encode_timestamp;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRow {
    pub subscriber_address: String,
    pub total_signals_processed: i64,
    pub total_pnl_percentage: f64,
    pub last_processed_at: String,
    pub last_signal_date: String,
}

pub struct ProcessedSignalRepository;

impl ProcessedSignalRepository {
    pub async fn signal_ids_for(
        pool: &SqlitePool,
        subscriber: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT signal_id FROM processed_signals WHERE subscriber_address = ?",
        )
        .bind(subscriber)
        .fetch_all(pool)
        .await
    }

    /// Inserts the whole batch in one transaction. A (subscriber, signal) pair
    /// that already exists violates the unique index and rolls everything back.
    pub async fn insert_batch(
        pool: &SqlitePool,
        records: &[ProcessedSignalRecord],
    ) -> Result<(), sqlx::Error> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;

        for r in records {
            sqlx::query(
                r#"
                    INSERT INTO processed_signals (
                        subscriber_address, signal_id, influencer_name, final_pnl,
                        signal_generated_at, processed_at
                    ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.subscriber_address)
            .bind(&r.signal_id)
            .bind(&r.influencer_name)
            .bind(&r.final_pnl)
            .bind(encode_timestamp(r.signal_generated_at))
            .bind(encode_timestamp(r.processed_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn count_for(pool: &SqlitePool, subscriber: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM processed_signals WHERE subscriber_address = ?",
        )
        .bind(subscriber)
        .fetch_one(pool)
        .await
    }
}

pub struct SignalSummaryRepository;

impl SignalSummaryRepository {
    pub async fn fetch(
        pool: &SqlitePool,
        subscriber: &str,
    ) -> Result<Option<SummaryRow>, sqlx::Error> {
        sqlx::query_as::<_, SummaryRow>(
            r#"
                SELECT subscriber_address, total_signals_processed, total_pnl_percentage,
                    last_processed_at, last_signal_date
                FROM user_signal_summary
                WHERE subscriber_address = ?
            "#,
        )
        .bind(subscriber)
        .fetch_optional(pool)
        .await
    }

    /// Adds the increment onto the existing totals, creating the row on first use.
    pub async fn increment(pool: &SqlitePool, inc: &SummaryIncrement) -> Result<(), sqlx::Error> {
        let signals_processed = i64::try_from(inc.signals_processed).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
                INSERT INTO user_signal_summary (
                    subscriber_address, total_signals_processed, total_pnl_percentage,
                    last_processed_at, last_signal_date
                ) VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(subscriber_address) DO UPDATE SET
                    total_signals_processed = total_signals_processed + excluded.total_signals_processed,
                    total_pnl_percentage = total_pnl_percentage + excluded.total_pnl_percentage,
                    last_processed_at = excluded.last_processed_at,
                    last_signal_date = excluded.last_signal_date
            "#,
        )
        .bind(&inc.subscriber_address)
        .bind(signals_processed)
        .bind(inc.pnl_percentage)
        .bind(encode_timestamp(inc.processed_at))
        .bind(encode_timestamp(inc.last_signal_date))
        .execute(pool)
        .await?;
        Ok(())
    }
}
