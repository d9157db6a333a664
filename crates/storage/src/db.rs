use chrono::{DateTime, Duration as TimeDelta, SecondsFormat, Utc};
use common::store::StoreError;
use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Owns the connection pool for one reconciler process. Opened and closed by
/// the executor; everything else borrows the pool.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .statement_cache_capacity(100)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        apply_schema(&pool).await?;
        info!("Opened database at {}", database_url);
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every connection to `:memory:`
    /// is its own database, so the pool must never open a second one.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Database closed");
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema = include_str!("../../../sql/schema.sql");
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}

/// Timestamps are written as RFC 3339 UTC text with microsecond resolution.
/// Other producers (the backtester) may write any RFC 3339 form, so SQL never
/// compares the raw text; range filters normalise it with [`SQL_INSTANT_FORMAT`].
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `strftime` format that turns any timestamp SQLite can read into
/// millisecond UTC text. Yields NULL for text it cannot read.
pub const SQL_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%f";

/// Bounds for a SQL range filter over normalised timestamps, one millisecond
/// wider on each side than `[from, to]`. The exact bounds are applied after
/// decoding.
pub fn sql_range_bounds(from: DateTime<Utc>, to: DateTime<Utc>) -> (String, String) {
    let pad = TimeDelta::milliseconds(1);
    let format = |ts: DateTime<Utc>| ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
    (format(from - pad), format(to + pad))
}

pub fn decode_timestamp(raw: &str, entity: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode {
            entity,
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

/// Minor-unit amounts exceed i64, so they travel as decimal text.
pub fn decode_amount(raw: &str, entity: &'static str) -> Result<u128, StoreError> {
    raw.trim().parse::<u128>().map_err(|e| StoreError::Decode {
        entity,
        reason: format!("bad amount {raw:?}: {e}"),
    })
}
