//! Percentage strings as written by the backtester (`"+12.34%"`).
//!
//! The two-decimal string produced by [`format_percent`] is also what gets
//! stored and added onto in later runs, so `parse_percent(format_percent(x))`
//! must equal `x` rounded to two decimals.

use std::str::FromStr;

use common::models::Signal;
use rust_decimal::Decimal;
use tracing::debug;

/// Returned by [`sum_signals`] when nothing valid was summed.
pub const ZERO_PERCENT: &str = "0%";

/// Parses `"12.34%"`, `"-3%"`, `"+0.5"`. Returns `None` for empty, non-numeric
/// or non-finite input.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    if number.is_empty() {
        return None;
    }

    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rounds to two decimals and appends `%`. Negative zero prints as `0.00%`.
pub fn format_percent(value: f64) -> String {
    let rounded = round_cents(value);
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.2}%")
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The signal's P&L, if the signal counts at all: backtest finished and the
/// P&L parses.
pub fn signal_pnl(signal: &Signal) -> Option<f64> {
    if !signal.backtest_done {
        return None;
    }

    let parsed = signal.final_pnl.as_deref().and_then(parse_percent);
    if parsed.is_none() {
        debug!(
            "Skipping signal {} with unusable P&L {:?}",
            signal.id, signal.final_pnl
        );
    }
    parsed
}

pub fn is_valid_signal(signal: &Signal) -> bool {
    signal_pnl(signal).is_some()
}

/// Sums the P&L of every valid signal. `"0%"` when there is none.
pub fn sum_signals<'a, I>(signals: I) -> String
where
    I: IntoIterator<Item = &'a Signal>,
{
    let mut total = 0.0;
    let mut counted = 0usize;
    for pnl in signals.into_iter().filter_map(signal_pnl) {
        total += pnl;
        counted += 1;
    }

    if counted == 0 {
        ZERO_PERCENT.to_string()
    } else {
        format_percent(total)
    }
}

/// Exact decimal view of a formatted percentage, for money arithmetic.
pub fn percent_to_decimal(formatted: &str) -> Option<Decimal> {
    let trimmed = formatted.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let number = number.strip_prefix('+').unwrap_or(number);
    Decimal::from_str(number).ok()
}
