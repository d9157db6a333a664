//! One reconciliation run: health checks, then the periodic and exit phases in
//! order, each item to completion before the next.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::chain::{ContractError, StakingContract};
use common::models::{Influencer, Stake};
use common::store::{Store, StoreError};
use thiserror::Error;
use tracing::{error, info};

use crate::aggregation::AggregationEngine;
use crate::orchestrator::TradeValueOrchestrator;
use crate::report::RunReport;
use crate::valuation::StakeExitValuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    Periodic,
    Exit,
    #[default]
    All,
}

impl RunMode {
    pub fn includes_periodic(self) -> bool {
        matches!(self, RunMode::Periodic | RunMode::All)
    }

    pub fn includes_exit(self) -> bool {
        matches!(self, RunMode::Exit | RunMode::All)
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "periodic" => Ok(RunMode::Periodic),
            "exit" => Ok(RunMode::Exit),
            "all" => Ok(RunMode::All),
            other => Err(format!(
                "unknown run mode {other:?}, expected periodic, exit or all"
            )),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Periodic => "periodic",
            RunMode::Exit => "exit",
            RunMode::All => "all",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Health check failed: {0}")]
    HealthCheck(String),
    #[error("Run lease {0:?} is held by another run")]
    LeaseHeld(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<ContractError> for RunError {
    fn from(err: ContractError) -> Self {
        RunError::HealthCheck(format!("staking contract: {err}"))
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    pub call_delay: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::All,
            call_delay: Duration::from_millis(1000),
        }
    }
}

pub struct Reconciler<S: Store + 'static> {
    store: Arc<S>,
    contract: Arc<dyn StakingContract>,
    settings: RunSettings,
}

impl<S: Store + 'static> Reconciler<S> {
    pub fn new(store: Arc<S>, contract: Arc<dyn StakingContract>, settings: RunSettings) -> Self {
        Self {
            store,
            contract,
            settings,
        }
    }

    /// Everything that can abort the run happens before the first ledger
    /// write or contract mutation.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        info!("Starting {} run at {}", self.settings.mode, now);

        self.store
            .ping()
            .await
            .map_err(|e| RunError::HealthCheck(format!("storage: {e}")))?;
        self.contract.health().await?;

        let influencers = self.store.influencers().await?;
        let stakes = if self.settings.mode.includes_exit() {
            self.store.unexited_stakes().await?
        } else {
            Vec::new()
        };

        let mut report = RunReport {
            influencers: influencers.len(),
            ..RunReport::default()
        };
        let mut orchestrator = TradeValueOrchestrator::new(
            self.contract.clone(),
            self.store.clone(),
            self.store.clone(),
            self.settings.call_delay,
        );

        if self.settings.mode.includes_periodic() {
            self.run_periodic(&influencers, now, &mut orchestrator, &mut report)
                .await;
        }
        if self.settings.mode.includes_exit() {
            self.run_exits(&influencers, &stakes, now, &mut orchestrator, &mut report)
                .await;
        }

        info!(
            "Run finished with {} errors after {} contract calls",
            report.error_count(),
            orchestrator.calls_made()
        );
        Ok(report)
    }

    async fn run_periodic(
        &self,
        influencers: &[Influencer],
        now: DateTime<Utc>,
        orchestrator: &mut TradeValueOrchestrator,
        report: &mut RunReport,
    ) {
        let engine = AggregationEngine::new(self.store.clone(), self.store.clone());

        for influencer in influencers {
            info!(
                "Aggregating {} subscribers of {}",
                influencer.subscribers.len(),
                influencer.name
            );
            for subscriber in &influencer.subscribers {
                report.subscribers += 1;
                match engine
                    .aggregate_subscriber(&influencer.name, subscriber, now)
                    .await
                {
                    Ok(aggregation) => {
                        report.signals_quarantined += aggregation.quarantined;
                        if aggregation.summary_lagging {
                            report.summary_failures += 1;
                        }
                        match aggregation.result {
                            Some(pnl) => {
                                report.subscribers_aggregated += 1;
                                report.signals_processed += pnl.new_signals_count;
                                orchestrator.apply_subscriber_pnl(&pnl, now, report).await;
                            }
                            None => report.subscribers_up_to_date += 1,
                        }
                    }
                    Err(e) => {
                        error!("Skipping {}: {}", subscriber.address, e);
                        report.subscriber_errors += 1;
                    }
                }
            }
        }
    }

    async fn run_exits(
        &self,
        influencers: &[Influencer],
        stakes: &[Stake],
        now: DateTime<Utc>,
        orchestrator: &mut TradeValueOrchestrator,
        report: &mut RunReport,
    ) {
        let valuator = StakeExitValuator::new(self.store.clone());
        let names: Vec<String> = influencers.iter().map(|i| i.name.clone()).collect();

        let ready: Vec<&Stake> = stakes.iter().filter(|s| s.is_ready_to_exit(now)).collect();
        info!("{} of {} open stakes are ready to exit", ready.len(), stakes.len());

        for stake in ready {
            report.stakes_ready += 1;
            match valuator.value(stake, &names).await {
                Ok(valued) => {
                    report.signals_quarantined += valued.quarantined;
                    orchestrator.settle_exit(&valued.exit, now, report).await;
                }
                Err(e) => {
                    error!(
                        "Cannot value stake {}#{}: {}",
                        stake.owner_address, stake.index, e
                    );
                    report.stake_exit_failures += 1;
                }
            }
        }
    }
}
