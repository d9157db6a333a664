use sqlx::SqlitePool;
use tracing::{info, warn};

/// Name of the lease every reconciliation run must hold.
pub const RECONCILE_LEASE: &str = "reconcile";

/// Atomically acquires the named run lease for `holder`.
/// Returns true if the lease was acquired, false if another run holds it.
/// Leases older than `timeout_minutes` are considered abandoned and cleared first.
pub async fn try_acquire_run_lease(
    pool: &SqlitePool,
    name: &str,
    holder: &str,
    timeout_minutes: u32,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let timeout_param = format!("-{timeout_minutes} minutes");
    let cleanup_result =
        sqlx::query("DELETE FROM run_locks WHERE name = ?1 AND locked_at < datetime('now', ?2)")
            .bind(name)
            .bind(timeout_param)
            .execute(&mut *tx)
            .await?;

    if cleanup_result.rows_affected() > 0 {
        warn!(
            "Cleared stale {} lease older than {} minutes",
            name, timeout_minutes
        );
    }

    let result = sqlx::query("INSERT OR IGNORE INTO run_locks (name, holder) VALUES (?1, ?2)")
        .bind(name)
        .bind(holder)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let acquired = result.rows_affected() > 0;
    if acquired {
        info!("Acquired {} lease as {}", name, holder);
    } else {
        warn!("Failed to acquire {} lease (already held)", name);
    }

    Ok(acquired)
}

/// Releases the lease only if `holder` still owns it.
pub async fn release_run_lease(
    pool: &SqlitePool,
    name: &str,
    holder: &str,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query("DELETE FROM run_locks WHERE name = ?1 AND holder = ?2")
        .bind(name)
        .bind(holder)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        info!("Released {} lease held by {}", name, holder);
    } else {
        warn!("{} lease was no longer held by {}", name, holder);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_acquire_lease_success() {
        let db = Database::open_in_memory().await.unwrap();

        let acquired = try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-a", 30)
            .await
            .unwrap();
        assert!(acquired);
    }

    #[tokio::test]
    async fn test_acquire_lease_conflict() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(
            try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-a", 30)
                .await
                .unwrap()
        );
        assert!(
            !try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-b", 30)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_release_then_reacquire() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(
            try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-a", 30)
                .await
                .unwrap()
        );
        release_run_lease(db.pool(), RECONCILE_LEASE, "run-a")
            .await
            .unwrap();
        assert!(
            try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-b", 30)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_release_by_other_holder_keeps_lease() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(
            try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-a", 30)
                .await
                .unwrap()
        );
        release_run_lease(db.pool(), RECONCILE_LEASE, "run-b")
            .await
            .unwrap();
        assert!(
            !try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-c", 30)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_stale_lease_is_cleared() {
        let db = Database::open_in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO run_locks (name, holder, locked_at) VALUES (?1, 'crashed', datetime('now', '-2 hours'))",
        )
        .bind(RECONCILE_LEASE)
        .execute(db.pool())
        .await
        .unwrap();

        assert!(
            try_acquire_run_lease(db.pool(), RECONCILE_LEASE, "run-a", 30)
                .await
                .unwrap()
        );
    }
}
