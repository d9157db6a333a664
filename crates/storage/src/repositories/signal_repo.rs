use chrono::{DateTime, Utc};
use common::models::Signal;
use common::store::StoreError;
use sqlx::SqlitePool;

use crate::db::{SQL_INSTANT_FORMAT, decode_timestamp, encode_timestamp, sql_range_bounds};

/// Signal as written by the backtester. Decoded into `Signal` exactly once,
/// right after it leaves the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalRow {
    pub id: String,
    pub account: String,
    pub generated_at: String,
    pub final_pnl: Option<String>,
    pub backtest_done: bool,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        if row.id.trim().is_empty() {
            return Err(StoreError::Decode {
                entity: "signal",
                reason: format!("empty id for account {}", row.account),
            });
        }
        let generated_at = decode_timestamp(&row.generated_at, "signal")?;
        let final_pnl = row.final_pnl.filter(|pnl| !pnl.trim().is_empty());

        Ok(Signal {
            id: row.id,
            account: row.account,
            generated_at,
            final_pnl,
            backtest_done: row.backtest_done,
        })
    }
}

pub struct SignalRepository;

impl SignalRepository {
    /// Candidate rows for `[from, to]`. The filter runs on normalised instants
    /// and is slightly wider than the range; rows whose timestamp SQLite cannot
    /// read are returned too, so the caller can decode and either window or
    /// quarantine them.
    pub async fn for_account_between(
        pool: &SqlitePool,
        account: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRow>, sqlx::Error> {
        let (low, high) = sql_range_bounds(from, to);
        sqlx::query_as::<_, SignalRow>(
            r#"
                SELECT id, account, generated_at, final_pnl, backtest_done
                FROM signals
                WHERE account = ?1
                    AND (
                        strftime(?2, generated_at) IS NULL
                        OR strftime(?2, generated_at) BETWEEN ?3 AND ?4
                    )
                    AND backtest_done = 1
                    AND final_pnl IS NOT NULL
                    AND TRIM(final_pnl) != ''
                ORDER BY strftime(?2, generated_at), id
            "#,
        )
        .bind(account)
        .bind(SQL_INSTANT_FORMAT)
        .bind(low)
        .bind(high)
        .fetch_all(pool)
        .await
    }

    pub async fn insert_batch(pool: &SqlitePool, signals: &[Signal]) -> Result<(), sqlx::Error> {
        if signals.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;

        for signal in signals {
            sqlx::query(
                r#"
                    INSERT OR REPLACE INTO signals (
                        id, account, generated_at, final_pnl, backtest_done
                    ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&signal.id)
            .bind(&signal.account)
            .bind(encode_timestamp(signal.generated_at))
            .bind(&signal.final_pnl)
            .bind(signal.backtest_done)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
