//! Drives the staking contract from aggregation and exit results.
//!
//! Calls are strictly one at a time with a fixed pause between consecutive
//! contract calls. A failed call is counted and the loop moves on; ledger
//! writes that preceded it stay in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::chain::{ExitReceipt, StakingContract};
use common::models::{UpdateKind, UserTradeValueUpdate};
use common::store::{StakeStore, TradeUpdateAudit};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::aggregation::SubscriberPnl;
use crate::report::RunReport;
use crate::valuation::{StakeExitData, apply_pnl};

/// Sole writer of the trade value audit trail.
pub struct TradeValueOrchestrator {
    contract: Arc<dyn StakingContract>,
    audit: Arc<dyn TradeUpdateAudit>,
    stakes: Arc<dyn StakeStore>,
    call_delay: Duration,
    calls_made: u64,
}

impl TradeValueOrchestrator {
    pub fn new(
        contract: Arc<dyn StakingContract>,
        audit: Arc<dyn TradeUpdateAudit>,
        stakes: Arc<dyn StakeStore>,
        call_delay: Duration,
    ) -> Self {
        Self {
            contract,
            audit,
            stakes,
            call_delay,
            calls_made: 0,
        }
    }

    pub fn calls_made(&self) -> u64 {
        self.calls_made
    }

    async fn pace(&mut self) {
        if self.calls_made > 0 && !self.call_delay.is_zero() {
            sleep(self.call_delay).await;
        }
        self.calls_made += 1;
    }

    /// Periodic flow: applies the batch's new P&L to every trading stake the
    /// subscriber holds on-chain.
    pub async fn apply_subscriber_pnl(
        &mut self,
        pnl: &SubscriberPnl,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let owner = pnl.subscriber_address.as_str();

        self.pace().await;
        let count = match self.contract.get_stake_count(owner).await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to read stake count of {}: {}", owner, e);
                report.trade_updates_failed += 1;
                return;
            }
        };

        if count == 0 {
            debug!("{} has no stakes on-chain", owner);
            report.subscribers_without_stakes += 1;
            return;
        }

        for index in 0..count {
            self.pace().await;
            let details = match self.contract.get_stake_details(owner, index).await {
                Ok(details) => details,
                Err(e) => {
                    error!("Failed to read stake {}#{}: {}", owner, index, e);
                    report.trade_updates_failed += 1;
                    continue;
                }
            };

            if !details.active || !details.trade_active {
                debug!(
                    "Stake {}#{} not trading (active={}, trade_active={})",
                    owner, index, details.active, details.trade_active
                );
                report.stakes_not_trading += 1;
                continue;
            }

            let new_value = match apply_pnl(details.trading_amount, &pnl.new_pnl) {
                Ok(value) => value,
                Err(e) => {
                    error!("Cannot value stake {}#{}: {}", owner, index, e);
                    report.trade_updates_failed += 1;
                    continue;
                }
            };

            self.pace().await;
            match self
                .contract
                .update_trade_value(owner, index, new_value)
                .await
            {
                Ok(tx_hash) => {
                    info!(
                        "Trade value of {}#{}: {} -> {} ({}) tx {}",
                        owner, index, details.trading_amount, new_value, pnl.new_pnl, tx_hash
                    );
                    report.trade_updates_succeeded += 1;
                    let update = UserTradeValueUpdate {
                        kind: UpdateKind::Periodic,
                        subscriber_address: owner.to_string(),
                        stake_index: index,
                        original_trading_amount: details.trading_amount,
                        new_trade_value: new_value,
                        pnl_percentage: pnl.new_pnl.clone(),
                        updated_at: now,
                        tx_hash: Some(tx_hash),
                    };
                    self.record(&update, report).await;
                }
                Err(e) => {
                    error!("updateTradeValue failed for {}#{}: {}", owner, index, e);
                    report.trade_updates_failed += 1;
                }
            }
        }
    }

    /// Exit flow: settles one matured stake that is still active on-chain.
    pub async fn settle_exit(
        &mut self,
        exit: &StakeExitData,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let owner = exit.owner_address.as_str();
        let index = exit.stake_index;

        self.pace().await;
        let details = match self.contract.get_stake_details(owner, index).await {
            Ok(details) => details,
            Err(e) => {
                error!("Failed to read stake {}#{} before exit: {}", owner, index, e);
                report.stake_exit_failures += 1;
                return;
            }
        };

        if !details.active {
            info!("Stake {}#{} already exited on-chain", owner, index);
            report.stakes_already_exited += 1;
            self.mark_exited(owner, index, now, report).await;
            return;
        }

        self.pace().await;
        match self
            .contract
            .exit_trade(owner, index, exit.final_trade_value)
            .await
        {
            Ok(ExitReceipt {
                success: true,
                tx_hash,
            }) => {
                info!(
                    "Exited stake {}#{}: {} -> {} ({}) tx {}",
                    owner,
                    index,
                    exit.trading_amount,
                    exit.final_trade_value,
                    exit.total_pnl,
                    tx_hash.as_deref().unwrap_or("<none>")
                );
                report.stakes_exited += 1;
                let update = UserTradeValueUpdate {
                    kind: UpdateKind::Exit,
                    subscriber_address: owner.to_string(),
                    stake_index: index,
                    original_trading_amount: exit.trading_amount,
                    new_trade_value: exit.final_trade_value,
                    pnl_percentage: exit.total_pnl.clone(),
                    updated_at: now,
                    tx_hash,
                };
                self.record(&update, report).await;
                self.mark_exited(owner, index, now, report).await;
            }
            Ok(ExitReceipt { success: false, .. }) => {
                warn!("exitTrade for {}#{} did not succeed", owner, index);
                report.stake_exit_failures += 1;
            }
            Err(e) => {
                error!("exitTrade failed for {}#{}: {}", owner, index, e);
                report.stake_exit_failures += 1;
            }
        }
    }

    async fn record(&self, update: &UserTradeValueUpdate, report: &mut RunReport) {
        if let Err(e) = self.audit.append_update(update).await {
            error!(
                "Failed to audit {} update of {}#{}: {}",
                update.kind, update.subscriber_address, update.stake_index, e
            );
            report.audit_failures += 1;
        }
    }

    async fn mark_exited(
        &self,
        owner: &str,
        index: u64,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        if let Err(e) = self.stakes.mark_exited(owner, index, now).await {
            error!("Failed to mark stake {}#{} exited: {}", owner, index, e);
            report.local_update_failures += 1;
        }
    }
}
