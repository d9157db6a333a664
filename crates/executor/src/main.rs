use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::logger;
use contract::RelayerClient;
use pnl::{Reconciler, RunError, RunReport};
use storage::lock::{self, RECONCILE_LEASE};
use storage::{Database, SqliteStore};

use crate::config::ReconcilerConfig;
use crate::services::telegram_service::{self, TelegramService};

mod config;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    debug!("Reconciler starting up...");

    let config = ReconcilerConfig::from_env().context("invalid configuration")?;
    let notifier = config.telegram.as_ref().map(TelegramService::new);

    let outcome = run(&config).await;

    match &outcome {
        Ok(report) => {
            for line in report.to_string().lines() {
                info!("{}", line);
            }
            if let Some(notifier) = &notifier {
                notifier
                    .send(telegram_service::report_message(config.mode, report))
                    .await;
            }
        }
        Err(e) => {
            error!("Run aborted: {:#}", e);
            if let Some(notifier) = &notifier {
                notifier
                    .send(telegram_service::failure_message(config.mode, e))
                    .await;
            }
        }
    }

    outcome.map(|_| ())
}

/// Owns the database and the run lease for the duration of one run. The lease
/// is released and the pool closed whatever the run's outcome.
async fn run(config: &ReconcilerConfig) -> anyhow::Result<RunReport> {
    let db = Database::open(&config.database_url)
        .await
        .context("failed to open database")?;

    let holder = Uuid::new_v4().to_string();
    let acquired =
        match lock::try_acquire_run_lease(db.pool(), RECONCILE_LEASE, &holder, config.lease_minutes)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                db.close().await;
                return Err(e).context("failed to acquire run lease");
            }
        };
    if !acquired {
        warn!("Another run holds the {} lease, nothing to do", RECONCILE_LEASE);
        db.close().await;
        return Err(RunError::LeaseHeld(RECONCILE_LEASE.to_string()).into());
    }

    let result = reconcile(&db, config).await;

    if let Err(e) = lock::release_run_lease(db.pool(), RECONCILE_LEASE, &holder).await {
        error!("Failed to release {} lease: {}", RECONCILE_LEASE, e);
    }
    db.close().await;

    result
}

async fn reconcile(db: &Database, config: &ReconcilerConfig) -> anyhow::Result<RunReport> {
    let store = Arc::new(SqliteStore::new(db.pool().clone()));
    let contract = Arc::new(
        RelayerClient::new(
            &config.relayer_url,
            config.relayer_api_key.clone(),
            config.relayer_secret_key.clone(),
        )
        .context("failed to create relayer client")?,
    );

    let reconciler = Reconciler::new(store, contract, config.run_settings());
    Ok(reconciler.run(Utc::now()).await?)
}
