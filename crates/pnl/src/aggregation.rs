//! Per-subscriber aggregation: window, dedup against the ledger, sum, and
//! write the batch back so it is never counted again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::models::{
    ProcessedSignalRecord, Signal, Subscriber, SummaryIncrement, UserSignalSummary,
};
use common::store::{SignalLedger, SignalStore, StoreError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::percent::{format_percent, is_valid_signal, parse_percent, sum_signals};
use crate::window::{in_subscription_window, subscription_window_end};

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Failed to load signals of {account}: {source}")]
    SignalLoad {
        account: String,
        #[source]
        source: StoreError,
    },
    #[error("Failed to read signal summary of {subscriber}: {source}")]
    SummaryRead {
        subscriber: String,
        #[source]
        source: StoreError,
    },
    #[error("Failed to record processed signals of {subscriber}: {source}")]
    LedgerWrite {
        subscriber: String,
        #[source]
        source: StoreError,
    },
}

/// What one subscriber gained from the signals not yet counted for them.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberPnl {
    pub influencer_name: String,
    pub subscriber_address: String,
    pub signals: Vec<Signal>,
    pub new_signals_count: usize,
    /// Sum of this batch only.
    pub new_pnl: String,
    /// Summary total before this batch plus `new_pnl`.
    pub cumulative_total: String,
}

/// Everything a batch writes, computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub result: SubscriberPnl,
    pub records: Vec<ProcessedSignalRecord>,
    pub increment: SummaryIncrement,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// `None` when there was nothing new to count.
    pub result: Option<SubscriberPnl>,
    pub quarantined: usize,
    /// Ledger written but the summary increment failed; the totals catch up
    /// only by manual repair.
    pub summary_lagging: bool,
}

/// Valid signals inside the subscription window that the ledger has not seen
/// for this subscriber, in generation order, without repeated ids.
pub fn select_unprocessed(
    candidates: &[Signal],
    subscriber: &Subscriber,
    processed: &HashSet<String>,
) -> Vec<Signal> {
    let mut seen = HashSet::new();
    let mut remaining: Vec<Signal> = candidates
        .iter()
        .filter(|s| is_valid_signal(s))
        .filter(|s| in_subscription_window(s, subscriber.subscribed_at))
        .filter(|s| !processed.contains(&s.id))
        .filter(|s| seen.insert(s.id.clone()))
        .cloned()
        .collect();
    remaining.sort_by(|a, b| a.generated_at.cmp(&b.generated_at).then(a.id.cmp(&b.id)));
    remaining
}

/// Turns the unprocessed signals into ledger records, a summary increment and
/// the result handed to the orchestrator. Pure apart from `now`.
pub fn plan_batch(
    influencer_name: &str,
    subscriber_address: &str,
    remaining: Vec<Signal>,
    existing: Option<&UserSignalSummary>,
    now: DateTime<Utc>,
) -> Option<BatchPlan> {
    let last_signal_date = remaining.iter().map(|s| s.generated_at).max()?;

    let new_pnl = sum_signals(&remaining);
    let new_pnl_value = parse_percent(&new_pnl).unwrap_or(0.0);
    let existing_total = existing.map(|s| s.total_pnl_percentage).unwrap_or(0.0);
    let cumulative_total = format_percent(existing_total + new_pnl_value);

    let records = remaining
        .iter()
        .map(|s| ProcessedSignalRecord {
            subscriber_address: subscriber_address.to_string(),
            signal_id: s.id.clone(),
            influencer_name: influencer_name.to_string(),
            final_pnl: s.final_pnl.clone().unwrap_or_default(),
            signal_generated_at: s.generated_at,
            processed_at: now,
        })
        .collect::<Vec<_>>();

    let increment = SummaryIncrement {
        subscriber_address: subscriber_address.to_string(),
        signals_processed: records.len() as u64,
        pnl_percentage: new_pnl_value,
        processed_at: now,
        last_signal_date,
    };

    Some(BatchPlan {
        result: SubscriberPnl {
            influencer_name: influencer_name.to_string(),
            subscriber_address: subscriber_address.to_string(),
            new_signals_count: remaining.len(),
            signals: remaining,
            new_pnl,
            cumulative_total,
        },
        records,
        increment,
    })
}

/// Sole writer of the processed-signal ledger and the signal summaries.
pub struct AggregationEngine {
    signals: Arc<dyn SignalStore>,
    ledger: Arc<dyn SignalLedger>,
}

impl AggregationEngine {
    pub fn new(signals: Arc<dyn SignalStore>, ledger: Arc<dyn SignalLedger>) -> Self {
        Self { signals, ledger }
    }

    pub async fn aggregate_subscriber(
        &self,
        influencer_name: &str,
        subscriber: &Subscriber,
        now: DateTime<Utc>,
    ) -> Result<Aggregation, AggregationError> {
        let address = subscriber.address.as_str();

        let batch = self
            .signals
            .signals_for_account(
                influencer_name,
                subscriber.subscribed_at,
                subscription_window_end(subscriber.subscribed_at),
            )
            .await
            .map_err(|source| AggregationError::SignalLoad {
                account: influencer_name.to_string(),
                source,
            })?;

        let mut aggregation = Aggregation {
            quarantined: batch.quarantined,
            ..Aggregation::default()
        };

        let processed = match self.ledger.already_processed(address).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    "Ledger lookup failed for {}, treating all signals as new: {}",
                    address, e
                );
                HashSet::new()
            }
        };

        let remaining = select_unprocessed(&batch.signals, subscriber, &processed);
        if remaining.is_empty() {
            debug!(
                "No new signals of {} for {} ({} already processed)",
                influencer_name,
                address,
                processed.len()
            );
            return Ok(aggregation);
        }

        let existing = self
            .ledger
            .current_summary(address)
            .await
            .map_err(|source| AggregationError::SummaryRead {
                subscriber: address.to_string(),
                source,
            })?;

        let Some(plan) = plan_batch(influencer_name, address, remaining, existing.as_ref(), now)
        else {
            return Ok(aggregation);
        };

        self.ledger
            .record_processed(address, &plan.records)
            .await
            .map_err(|source| AggregationError::LedgerWrite {
                subscriber: address.to_string(),
                source,
            })?;

        if let Err(e) = self.ledger.apply_summary_increment(&plan.increment).await {
            error!(
                "Recorded {} signals for {} but failed to update the summary: {}",
                plan.records.len(),
                address,
                e
            );
            aggregation.summary_lagging = true;
        }

        info!(
            "{} <- {}: {} new signals, new P&L {}, cumulative {}",
            address,
            influencer_name,
            plan.result.new_signals_count,
            plan.result.new_pnl,
            plan.result.cumulative_total
        );
        aggregation.result = Some(plan.result);
        Ok(aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::models::SignalBatch;
    use common::store::{MockSignalLedger, MockSignalStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    fn subscriber() -> Subscriber {
        Subscriber {
            address: "0xsub".to_string(),
            username: "sub".to_string(),
            subscribed_at: t0(),
        }
    }

    fn signal(id: &str, at: DateTime<Utc>, pnl: &str) -> Signal {
        Signal {
            id: id.to_string(),
            account: "alpha".to_string(),
            generated_at: at,
            final_pnl: Some(pnl.to_string()),
            backtest_done: true,
        }
    }

    fn summary(total: f64) -> UserSignalSummary {
        UserSignalSummary {
            subscriber_address: "0xsub".to_string(),
            total_signals_processed: 4,
            total_pnl_percentage: total,
            last_processed_at: t0(),
            last_signal_date: t0(),
        }
    }

    fn store_returning(signals: Vec<Signal>) -> MockSignalStore {
        let mut store = MockSignalStore::new();
        store
            .expect_signals_for_account()
            .returning(move |_, _, _| {
                Ok(SignalBatch {
                    signals: signals.clone(),
                    quarantined: 0,
                })
            });
        store
    }

    #[test]
    fn test_select_unprocessed_windows_validates_and_dedups() {
        let mut not_backtested = signal("d", t0() + Duration::days(2), "4%");
        not_backtested.backtest_done = false;
        let candidates = vec![
            signal("c", t0() + Duration::days(3), "3%"),
            signal("a", t0() + Duration::days(1), "1%"),
            signal("b", t0() + Duration::days(2), "2%"),
            not_backtested,
            signal("e", t0() + Duration::days(2), "broken"),
            signal("f", t0(), "5%"),
            signal("a", t0() + Duration::days(1), "1%"),
        ];
        let processed = HashSet::from(["b".to_string()]);

        let remaining = select_unprocessed(&candidates, &subscriber(), &processed);

        let ids: Vec<&str> = remaining.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_plan_batch_adds_onto_existing_total() {
        let remaining = vec![
            signal("a", t0() + Duration::days(1), "-3.00%"),
            signal("b", t0() + Duration::days(2), "+0.50%"),
        ];
        let existing = summary(5.0);

        let plan = plan_batch("alpha", "0xsub", remaining, Some(&existing), now()).unwrap();

        assert_eq!(plan.result.new_pnl, "-2.50%");
        assert_eq!(plan.result.cumulative_total, "2.50%");
        assert_eq!(plan.result.new_signals_count, 2);
        assert_eq!(plan.records.len(), 2);
        assert_eq!(plan.records[1].final_pnl, "+0.50%");
        assert_eq!(plan.records[1].processed_at, now());
        assert_eq!(plan.increment.signals_processed, 2);
        assert_eq!(plan.increment.pnl_percentage, -2.5);
        assert_eq!(plan.increment.last_signal_date, t0() + Duration::days(2));
    }

    #[test]
    fn test_plan_batch_without_summary_starts_from_zero() {
        let plan = plan_batch(
            "alpha",
            "0xsub",
            vec![signal("a", t0() + Duration::days(1), "+10.00%")],
            None,
            now(),
        )
        .unwrap();

        assert_eq!(plan.result.new_pnl, "10.00%");
        assert_eq!(plan.result.cumulative_total, "10.00%");
    }

    #[test]
    fn test_plan_batch_of_nothing_is_none() {
        assert!(plan_batch("alpha", "0xsub", vec![], None, now()).is_none());
    }

    #[test]
    fn test_plan_batch_is_deterministic() {
        let remaining = vec![
            signal("a", t0() + Duration::days(1), "1.25%"),
            signal("b", t0() + Duration::days(4), "2%"),
        ];
        let first = plan_batch("alpha", "0xsub", remaining.clone(), Some(&summary(1.0)), now());
        let second = plan_batch("alpha", "0xsub", remaining, Some(&summary(1.0)), now());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_ledger_read_failure_treats_everything_as_new() {
        let store = store_returning(vec![signal("a", t0() + Duration::days(1), "2%")]);
        let mut ledger = MockSignalLedger::new();
        ledger
            .expect_already_processed()
            .returning(|_| Err(StoreError::Database("disk I/O error".to_string())));
        ledger.expect_current_summary().returning(|_| Ok(None));
        ledger
            .expect_record_processed()
            .withf(|_, records| records.len() == 1 && records[0].signal_id == "a")
            .times(1)
            .returning(|_, _| Ok(()));
        ledger
            .expect_apply_summary_increment()
            .times(1)
            .returning(|_| Ok(()));

        let engine = AggregationEngine::new(Arc::new(store), Arc::new(ledger));
        let aggregation = engine
            .aggregate_subscriber("alpha", &subscriber(), now())
            .await
            .unwrap();

        assert_eq!(aggregation.result.unwrap().new_pnl, "2.00%");
    }

    #[tokio::test]
    async fn test_nothing_new_has_no_side_effects() {
        let store = store_returning(vec![signal("a", t0() + Duration::days(1), "2%")]);
        let mut ledger = MockSignalLedger::new();
        ledger
            .expect_already_processed()
            .returning(|_| Ok(HashSet::from(["a".to_string()])));
        ledger.expect_current_summary().never();
        ledger.expect_record_processed().never();
        ledger.expect_apply_summary_increment().never();

        let engine = AggregationEngine::new(Arc::new(store), Arc::new(ledger));
        let aggregation = engine
            .aggregate_subscriber("alpha", &subscriber(), now())
            .await
            .unwrap();

        assert!(aggregation.result.is_none());
    }

    #[tokio::test]
    async fn test_ledger_write_failure_skips_summary_and_result() {
        let store = store_returning(vec![signal("a", t0() + Duration::days(1), "2%")]);
        let mut ledger = MockSignalLedger::new();
        ledger
            .expect_already_processed()
            .returning(|_| Ok(HashSet::new()));
        ledger
            .expect_current_summary()
            .returning(|_| Ok(Some(summary(1.0))));
        ledger.expect_record_processed().returning(|subscriber, _| {
            Err(StoreError::Duplicate {
                subscriber: subscriber.to_string(),
                signal_id: "a".to_string(),
            })
        });
        ledger.expect_apply_summary_increment().never();

        let engine = AggregationEngine::new(Arc::new(store), Arc::new(ledger));
        let err = engine
            .aggregate_subscriber("alpha", &subscriber(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AggregationError::LedgerWrite { .. }));
    }

    #[tokio::test]
    async fn test_summary_write_failure_still_emits_result() {
        let store = store_returning(vec![signal("a", t0() + Duration::days(1), "2%")]);
        let mut ledger = MockSignalLedger::new();
        ledger
            .expect_already_processed()
            .returning(|_| Ok(HashSet::new()));
        ledger.expect_current_summary().returning(|_| Ok(None));
        ledger.expect_record_processed().returning(|_, _| Ok(()));
        ledger
            .expect_apply_summary_increment()
            .returning(|_| Err(StoreError::Database("locked".to_string())));

        let engine = AggregationEngine::new(Arc::new(store), Arc::new(ledger));
        let aggregation = engine
            .aggregate_subscriber("alpha", &subscriber(), now())
            .await
            .unwrap();

        assert!(aggregation.summary_lagging);
        assert!(aggregation.result.is_some());
    }

    #[tokio::test]
    async fn test_signal_load_failure_is_an_error() {
        let mut store = MockSignalStore::new();
        store
            .expect_signals_for_account()
            .returning(|_, _, _| Err(StoreError::Database("gone".to_string())));
        let mut ledger = MockSignalLedger::new();
        ledger.expect_already_processed().never();

        let engine = AggregationEngine::new(Arc::new(store), Arc::new(ledger));
        let err = engine
            .aggregate_subscriber("alpha", &subscriber(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, AggregationError::SignalLoad { .. }));
    }
}
