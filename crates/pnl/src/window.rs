//! Which signals count toward a subscription or a stake.
//!
//! The two windows differ at their lower edge and are kept as separate
//! functions on purpose: a subscription window opens strictly after the
//! subscription instant, a stake window includes its opening instant.

use chrono::{DateTime, Duration, Utc};
use common::models::{Signal, Stake};

pub const SUBSCRIPTION_WINDOW_DAYS: i64 = 7;

pub fn subscription_window_end(subscribed_at: DateTime<Utc>) -> DateTime<Utc> {
    subscribed_at + Duration::days(SUBSCRIPTION_WINDOW_DAYS)
}

/// `(subscribed_at, subscribed_at + 7 days]`
pub fn in_subscription_window(signal: &Signal, subscribed_at: DateTime<Utc>) -> bool {
    signal.generated_at > subscribed_at
        && signal.generated_at <= subscription_window_end(subscribed_at)
}

/// `[opened_at, exit_timestamp]`
pub fn in_stake_window(signal: &Signal, stake: &Stake) -> bool {
    signal.generated_at >= stake.opened_at && signal.generated_at <= stake.exit_timestamp
}
