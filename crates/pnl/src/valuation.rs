//! Money side of the P&L: trading allocation and trade value after a return.

use std::sync::Arc;

use common::models::{Signal, SignalBatch, Stake};
use common::store::{SignalStore, StoreError};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use thiserror::Error;
use tracing::debug;

use crate::percent::{is_valid_signal, percent_to_decimal, sum_signals};
use crate::window::in_stake_window;

/// Share of a stake that is traded, in percent.
pub const TRADING_ALLOCATION_PERCENT: u128 = 2;

#[derive(Error, Debug, PartialEq)]
pub enum ValuationError {
    #[error("P&L {0:?} is not a decimal percentage")]
    InvalidPercent(String),
    #[error("Trade value overflow applying {pnl} to {amount}")]
    Overflow { amount: u128, pnl: String },
}

#[derive(Error, Debug)]
pub enum ExitValuationError {
    #[error("Failed to load signals of {account}: {source}")]
    SignalLoad {
        account: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Valuation(#[from] ValuationError),
}

/// `stake_amount * 2 / 100`, truncated to whole minor units.
pub fn trading_amount_for_stake(stake_amount: u128) -> u128 {
    match stake_amount.checked_mul(TRADING_ALLOCATION_PERCENT) {
        Some(scaled) => scaled / 100,
        None => stake_amount / 100 * TRADING_ALLOCATION_PERCENT,
    }
}

/// `max(0, floor(amount + amount * pnl / 100))`, computed on the exact
/// two-decimal percentage.
pub fn apply_pnl(trading_amount: u128, pnl: &str) -> Result<u128, ValuationError> {
    let overflow = || ValuationError::Overflow {
        amount: trading_amount,
        pnl: pnl.to_string(),
    };

    let percent =
        percent_to_decimal(pnl).ok_or_else(|| ValuationError::InvalidPercent(pnl.to_string()))?;
    let base = Decimal::from_u128(trading_amount).ok_or_else(overflow)?;

    let value = base
        .checked_mul(percent)
        .and_then(|delta| delta.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|delta| base.checked_add(delta))
        .ok_or_else(overflow)?
        .floor();

    if value <= Decimal::ZERO {
        return Ok(0);
    }
    value.to_u128().ok_or_else(overflow)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StakeExitData {
    pub owner_address: String,
    pub stake_index: u64,
    pub signals: Vec<Signal>,
    pub total_pnl: String,
    pub trading_amount: u128,
    pub final_trade_value: u128,
}

/// Values one stake from whichever candidate signals fall in its window.
pub fn value_stake_exit(
    stake: &Stake,
    candidates: &[Signal],
) -> Result<StakeExitData, ValuationError> {
    let mut signals: Vec<Signal> = candidates
        .iter()
        .filter(|s| in_stake_window(s, stake))
        .filter(|s| is_valid_signal(s))
        .cloned()
        .collect();
    signals.sort_by(|a, b| a.generated_at.cmp(&b.generated_at).then(a.id.cmp(&b.id)));
    signals.dedup_by(|a, b| a.id == b.id);

    let total_pnl = sum_signals(&signals);
    let trading_amount = trading_amount_for_stake(stake.stake_amount);
    let final_trade_value = apply_pnl(trading_amount, &total_pnl)?;

    Ok(StakeExitData {
        owner_address: stake.owner_address.clone(),
        stake_index: stake.index,
        signals,
        total_pnl,
        trading_amount,
        final_trade_value,
    })
}

#[derive(Debug, Clone)]
pub struct ValuedExit {
    pub exit: StakeExitData,
    pub quarantined: usize,
}

/// Gathers every influencer's signals over a stake's lifetime and values the
/// exit. Keeps no ledger: a stake exits once.
pub struct StakeExitValuator {
    signals: Arc<dyn SignalStore>,
}

impl StakeExitValuator {
    pub fn new(signals: Arc<dyn SignalStore>) -> Self {
        Self { signals }
    }

    pub async fn value(
        &self,
        stake: &Stake,
        influencer_names: &[String],
    ) -> Result<ValuedExit, ExitValuationError> {
        let mut batch = SignalBatch::default();
        for name in influencer_names {
            let found = self
                .signals
                .signals_for_account(name, stake.opened_at, stake.exit_timestamp)
                .await
                .map_err(|source| ExitValuationError::SignalLoad {
                    account: name.clone(),
                    source,
                })?;
            batch.quarantined += found.quarantined;
            batch.signals.extend(found.signals);
        }

        let exit = value_stake_exit(stake, &batch.signals)?;
        debug!(
            "Stake {}#{}: {} signals, P&L {}, {} -> {}",
            exit.owner_address,
            exit.stake_index,
            exit.signals.len(),
            exit.total_pnl,
            exit.trading_amount,
            exit.final_trade_value
        );

        Ok(ValuedExit {
            exit,
            quarantined: batch.quarantined,
        })
    }
}
