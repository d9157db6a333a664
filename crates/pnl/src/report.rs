use std::fmt;

/// Counts for one reconciliation run. Every item the run looked at lands in
/// exactly one of the outcome buckets of its phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub influencers: usize,
    pub subscribers: usize,
    pub subscribers_aggregated: usize,
    pub subscribers_up_to_date: usize,
    pub subscriber_errors: usize,
    pub signals_processed: usize,
    pub signals_quarantined: usize,
    pub summary_failures: usize,

    pub subscribers_without_stakes: usize,
    pub stakes_not_trading: usize,
    pub trade_updates_succeeded: usize,
    pub trade_updates_failed: usize,

    pub stakes_ready: usize,
    pub stakes_exited: usize,
    pub stakes_already_exited: usize,
    pub stake_exit_failures: usize,

    pub audit_failures: usize,
    pub local_update_failures: usize,
}

impl RunReport {
    pub fn error_count(&self) -> usize {
        self.subscriber_errors
            + self.summary_failures
            + self.trade_updates_failed
            + self.stake_exit_failures
            + self.audit_failures
            + self.local_update_failures
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "subscribers: {} across {} influencers ({} aggregated, {} up to date, {} failed)",
            self.subscribers,
            self.influencers,
            self.subscribers_aggregated,
            self.subscribers_up_to_date,
            self.subscriber_errors
        )?;
        writeln!(
            f,
            "signals: {} processed, {} quarantined",
            self.signals_processed, self.signals_quarantined
        )?;
        writeln!(
            f,
            "trade updates: {} ok, {} failed ({} stakes not trading, {} subscribers without stakes)",
            self.trade_updates_succeeded,
            self.trade_updates_failed,
            self.stakes_not_trading,
            self.subscribers_without_stakes
        )?;
        writeln!(
            f,
            "exits: {} of {} ready ({} already exited, {} failed)",
            self.stakes_exited,
            self.stakes_ready,
            self.stakes_already_exited,
            self.stake_exit_failures
        )?;
        write!(
            f,
            "bookkeeping failures: {} summary, {} audit, {} local stake",
            self.summary_failures, self.audit_failures, self.local_update_failures
        )
    }
}
