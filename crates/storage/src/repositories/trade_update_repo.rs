use common::models::UserTradeValueUpdate;
use sqlx::SqlitePool;

use crate::db::encode_timestamp;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TradeUpdateRow {
    pub kind: String,
    pub subscriber_address: String,
    pub stake_index: i64,
    pub original_trading_amount: String,
    pub new_trade_value: String,
    pub pnl_percentage: String,
    pub updated_at: String,
    pub tx_hash: Option<String>,
}

pub struct TradeUpdateRepository;

impl TradeUpdateRepository {
    pub async fn insert(pool: &SqlitePool, u: &UserTradeValueUpdate) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
                INSERT INTO trade_value_updates (
                    kind, subscriber_address, stake_index, original_trading_amount,
                    new_trade_value, pnl_percentage, updated_at, tx_hash
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(u.kind.as_str())
        .bind(&u.subscriber_address)
        .bind(i64::try_from(u.stake_index).unwrap_or(i64::MAX))
        .bind(u.original_trading_amount.to_string())
        .bind(u.new_trade_value.to_string())
        .bind(&u.pnl_percentage)
        .bind(encode_timestamp(u.updated_at))
        .bind(&u.tx_hash)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn for_subscriber(
        pool: &SqlitePool,
        subscriber: &str,
    ) -> Result<Vec<TradeUpdateRow>, sqlx::Error> {
        sqlx::query_as::<_, TradeUpdateRow>(
            r#"
                SELECT kind, subscriber_address, stake_index, original_trading_amount,
                    new_trade_value, pnl_percentage, updated_at, tx_hash
                FROM trade_value_updates
                WHERE subscriber_address = ?
                ORDER BY id
            "#,
        )
        .bind(subscriber)
        .fetch_all(pool)
        .await
    }
}
