use common::models::Subscriber;
use sqlx::SqlitePool;

use crate::db::encode_timestamp;

/// One row per (influencer, subscriber). Influencers without subscribers come
/// back once with the subscriber columns NULL.
#[derive(Debug, sqlx::FromRow)]
pub struct InfluencerSubscriberRow {
    pub name: String,
    pub address: Option<String>,
    pub username: Option<String>,
    pub subscribed_at: Option<String>,
}

pub struct InfluencerRepository;

impl InfluencerRepository {
    pub async fn fetch_all(pool: &SqlitePool) -> Result<Vec<InfluencerSubscriberRow>, sqlx::Error> {
        sqlx::query_as::<_, InfluencerSubscriberRow>(
            r#"
                SELECT i.name, s.address, s.username, s.subscribed_at
                FROM influencers i
                LEFT JOIN subscribers s ON s.influencer_name = i.name
                ORDER BY i.name, s.subscribed_at, s.address
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn upsert(pool: &SqlitePool, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO influencers(name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn insert_subscribers(
        pool: &SqlitePool,
        influencer: &str,
        subscribers: &[Subscriber],
    ) -> Result<(), sqlx::Error> {
        if subscribers.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;

        for s in subscribers {
            sqlx::query(
                r#"
                    INSERT INTO subscribers(influencer_name, address, username, subscribed_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(influencer_name, address) DO UPDATE SET
                        username = excluded.username,
                        subscribed_at = excluded.subscribed_at
                "#,
            )
            .bind(influencer)
            .bind(&s.address)
            .bind(&s.username)
            .bind(encode_timestamp(s.subscribed_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
