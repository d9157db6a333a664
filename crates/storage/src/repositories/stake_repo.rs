use chrono::{DateTime, Utc};
use common::models::Stake;
use common::store::StoreError;
use sqlx::SqlitePool;

use crate::db::{decode_amount, decode_timestamp, encode_timestamp};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StakeRow {
    pub owner_address: String,
    pub stake_index: i64,
    pub stake_amount: String,
    pub trading_amount: String,
    pub opened_at: String,
    pub exit_timestamp: String,
}

impl TryFrom<StakeRow> for Stake {
    type Error = StoreError;

    fn try_from(row: StakeRow) -> Result<Self, Self::Error> {
        let index = u64::try_from(row.stake_index).map_err(|_| StoreError::Decode {
            entity: "stake",
            reason: format!("negative stake index {}", row.stake_index),
        })?;

        Ok(Stake {
            owner_address: row.owner_address,
            index,
            stake_amount: decode_amount(&row.stake_amount, "stake")?,
            trading_amount: decode_amount(&row.trading_amount, "stake")?,
            opened_at: decode_timestamp(&row.opened_at, "stake")?,
            exit_timestamp: decode_timestamp(&row.exit_timestamp, "stake")?,
        })
    }
}

pub struct StakeRepository;

impl StakeRepository {
    pub async fn unexited(pool: &SqlitePool) -> Result<Vec<StakeRow>, sqlx::Error> {
        sqlx::query_as::<_, StakeRow>(
            r#"
                SELECT owner_address, stake_index, stake_amount, trading_amount,
                    opened_at, exit_timestamp
                FROM stakes
                WHERE exited_at IS NULL
                ORDER BY exit_timestamp, owner_address, stake_index
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn mark_exited(
        pool: &SqlitePool,
        owner: &str,
        index: i64,
        exited_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stakes SET exited_at = ? WHERE owner_address = ? AND stake_index = ? AND exited_at IS NULL",
        )
        .bind(encode_timestamp(exited_at))
        .bind(owner)
        .bind(index)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_batch(pool: &SqlitePool, stakes: &[Stake]) -> Result<(), sqlx::Error> {
        if stakes.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;

        for s in stakes {
            sqlx::query(
                r#"
                    INSERT INTO stakes (
                        owner_address, stake_index, stake_amount, trading_amount,
                        opened_at, exit_timestamp
                    ) VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(owner_address, stake_index) DO UPDATE SET
                        stake_amount = excluded.stake_amount,
                        trading_amount = excluded.trading_amount,
                        opened_at = excluded.opened_at,
                        exit_timestamp = excluded.exit_timestamp
                "#,
            )
            .bind(&s.owner_address)
            .bind(i64::try_from(s.index).unwrap_or(i64::MAX))
            .bind(s.stake_amount.to_string())
            .bind(s.trading_amount.to_string())
            .bind(encode_timestamp(s.opened_at))
            .bind(encode_timestamp(s.exit_timestamp))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
