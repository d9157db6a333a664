use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::chain::{ContractError, ExitReceipt, MockStakingContract};
use common::models::{Influencer, Signal, Stake, StakeDetails, Subscriber};
use common::store::{SignalLedger, StakeStore};
use mockall::predicate::eq;
use pnl::{Reconciler, RunError, RunMode, RunSettings};
use storage::repositories::{ProcessedSignalRepository, TradeUpdateRepository};
use storage::{Database, SqliteStore};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn signal(id: &str, account: &str, generated_at: DateTime<Utc>, pnl: &str) -> Signal {
    Signal {
        id: id.to_string(),
        account: account.to_string(),
        generated_at,
        final_pnl: Some(pnl.to_string()),
        backtest_done: true,
    }
}

fn settings(mode: RunMode) -> RunSettings {
    RunSettings {
        mode,
        call_delay: Duration::ZERO,
    }
}

fn trading(amount: u128) -> StakeDetails {
    StakeDetails {
        stake_amount: amount * 50,
        trading_amount: amount,
        active: true,
        trade_active: true,
    }
}

async fn store() -> SqliteStore {
    let db = Database::open_in_memory().await.unwrap();
    SqliteStore::new(db.pool().clone())
}

async fn seed_subscription(store: &SqliteStore) {
    store
        .save_influencer(&Influencer {
            name: "alpha".to_string(),
            subscribers: vec![Subscriber {
                address: "0xsub".to_string(),
                username: "sub".to_string(),
                subscribed_at: at(2025, 1, 1, 0, 0, 0),
            }],
        })
        .await
        .unwrap();
    store
        .save_signals(&[
            signal("s1", "alpha", at(2025, 1, 2, 0, 0, 0), "+10.00%"),
            signal("s2", "alpha", at(2025, 1, 9, 0, 0, 1), "+5.00%"),
        ])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_periodic_run_counts_window_signals_once() {
    let store = store().await;
    seed_subscription(&store).await;
    let now = at(2025, 1, 10, 0, 0, 0);

    let mut contract = MockStakingContract::new();
    contract.expect_health().returning(|| Ok(()));
    contract
        .expect_get_stake_count()
        .with(eq("0xsub"))
        .returning(|_| Ok(1));
    contract
        .expect_get_stake_details()
        .returning(|_, _| Ok(trading(1_000)));
    contract
        .expect_update_trade_value()
        .with(eq("0xsub"), eq(0u64), eq(1_100u128))
        .times(1)
        .returning(|_, _, _| Ok("0xfeed".to_string()));

    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(contract),
        settings(RunMode::Periodic),
    );
    let report = reconciler.run(now).await.unwrap();

    assert_eq!(report.subscribers_aggregated, 1);
    assert_eq!(report.signals_processed, 1);
    assert_eq!(report.trade_updates_succeeded, 1);
    assert!(!report.has_errors());

    let processed = store.already_processed("0xsub").await.unwrap();
    assert_eq!(processed.len(), 1);
    assert!(processed.contains("s1"));

    let summary = store.current_summary("0xsub").await.unwrap().unwrap();
    assert_eq!(summary.total_signals_processed, 1);
    assert_eq!(summary.total_pnl_percentage, 10.0);
    assert_eq!(summary.last_processed_at, now);
    assert_eq!(summary.last_signal_date, at(2025, 1, 2, 0, 0, 0));

    let audit = TradeUpdateRepository::for_subscriber(store.pool(), "0xsub")
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, "PERIODIC");
    assert_eq!(audit[0].original_trading_amount, "1000");
    assert_eq!(audit[0].new_trade_value, "1100");
    assert_eq!(audit[0].pnl_percentage, "10.00%");
    assert_eq!(audit[0].tx_hash.as_deref(), Some("0xfeed"));
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let store = store().await;
    seed_subscription(&store).await;

    let mut first = MockStakingContract::new();
    first.expect_health().returning(|| Ok(()));
    first.expect_get_stake_count().returning(|_| Ok(1));
    first
        .expect_get_stake_details()
        .returning(|_, _| Ok(trading(1_000)));
    first
        .expect_update_trade_value()
        .returning(|_, _, _| Ok("0x01".to_string()));
    Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(first),
        settings(RunMode::Periodic),
    )
    .run(at(2025, 1, 10, 0, 0, 0))
    .await
    .unwrap();

    let mut second = MockStakingContract::new();
    second.expect_health().returning(|| Ok(()));
    second.expect_get_stake_count().never();
    second.expect_update_trade_value().never();
    let report = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(second),
        settings(RunMode::Periodic),
    )
    .run(at(2025, 1, 11, 0, 0, 0))
    .await
    .unwrap();

    assert_eq!(report.subscribers_up_to_date, 1);
    assert_eq!(report.signals_processed, 0);

    let count = ProcessedSignalRepository::count_for(store.pool(), "0xsub")
        .await
        .unwrap();
    assert_eq!(count, 1);
    let summary = store.current_summary("0xsub").await.unwrap().unwrap();
    assert_eq!(summary.total_pnl_percentage, 10.0);
    assert_eq!(summary.last_processed_at, at(2025, 1, 10, 0, 0, 0));
}

#[tokio::test]
async fn test_failed_update_keeps_ledger_mark() {
    let store = store().await;
    seed_subscription(&store).await;

    let mut contract = MockStakingContract::new();
    contract.expect_health().returning(|| Ok(()));
    contract.expect_get_stake_count().returning(|_| Ok(1));
    contract
        .expect_get_stake_details()
        .returning(|_, _| Ok(trading(1_000)));
    contract
        .expect_update_trade_value()
        .returning(|_, _, _| Err(ContractError::Reverted("out of gas".to_string())));

    let report = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(contract),
        settings(RunMode::Periodic),
    )
    .run(at(2025, 1, 10, 0, 0, 0))
    .await
    .unwrap();

    assert_eq!(report.trade_updates_failed, 1);
    assert_eq!(store.already_processed("0xsub").await.unwrap().len(), 1);
    let audit = TradeUpdateRepository::for_subscriber(store.pool(), "0xsub")
        .await
        .unwrap();
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_exit_run_settles_matured_stake_once() {
    let store = store().await;
    store
        .save_influencer(&Influencer {
            name: "alpha".to_string(),
            subscribers: vec![],
        })
        .await
        .unwrap();
    store
        .save_influencer(&Influencer {
            name: "beta".to_string(),
            subscribers: vec![],
        })
        .await
        .unwrap();
    store
        .save_signals(&[
            signal("a1", "alpha", at(2025, 1, 5, 0, 0, 0), "-100.00%"),
            signal("b1", "beta", at(2025, 1, 20, 0, 0, 0), "-50.00%"),
            signal("b2", "beta", at(2025, 2, 5, 0, 0, 0), "+90.00%"),
        ])
        .await
        .unwrap();
    store
        .save_stakes(&[
            Stake {
                owner_address: "0xowner".to_string(),
                index: 0,
                stake_amount: 100,
                trading_amount: 2,
                opened_at: at(2025, 1, 1, 0, 0, 0),
                exit_timestamp: at(2025, 1, 31, 0, 0, 0),
            },
            Stake {
                owner_address: "0xowner".to_string(),
                index: 1,
                stake_amount: 100,
                trading_amount: 2,
                opened_at: at(2025, 1, 15, 0, 0, 0),
                exit_timestamp: at(2025, 3, 1, 0, 0, 0),
            },
        ])
        .await
        .unwrap();
    let now = at(2025, 2, 1, 0, 0, 0);

    let mut contract = MockStakingContract::new();
    contract.expect_health().returning(|| Ok(()));
    contract
        .expect_get_stake_details()
        .with(eq("0xowner"), eq(0u64))
        .returning(|_, _| Ok(trading(2)));
    contract
        .expect_exit_trade()
        .with(eq("0xowner"), eq(0u64), eq(0u128))
        .times(1)
        .returning(|_, _, _| {
            Ok(ExitReceipt {
                success: true,
                tx_hash: Some("0xexit".to_string()),
            })
        });

    let report = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(contract),
        settings(RunMode::Exit),
    )
    .run(now)
    .await
    .unwrap();

    assert_eq!(report.stakes_ready, 1);
    assert_eq!(report.stakes_exited, 1);
    assert!(!report.has_errors());

    let open = store.unexited_stakes().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].index, 1);

    let audit = TradeUpdateRepository::for_subscriber(store.pool(), "0xowner")
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, "EXIT");
    assert_eq!(audit[0].original_trading_amount, "2");
    assert_eq!(audit[0].new_trade_value, "0");
    assert_eq!(audit[0].pnl_percentage, "-150.00%");
    assert_eq!(audit[0].tx_hash.as_deref(), Some("0xexit"));

    let mut again = MockStakingContract::new();
    again.expect_health().returning(|| Ok(()));
    again.expect_exit_trade().never();
    let report = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(again),
        settings(RunMode::Exit),
    )
    .run(at(2025, 2, 2, 0, 0, 0))
    .await
    .unwrap();
    assert_eq!(report.stakes_ready, 0);
}

#[tokio::test]
async fn test_unhealthy_contract_aborts_before_any_write() {
    let store = store().await;
    seed_subscription(&store).await;

    let mut contract = MockStakingContract::new();
    contract
        .expect_health()
        .returning(|| Err(ContractError::Transport("connection refused".to_string())));
    contract.expect_get_stake_count().never();
    contract.expect_update_trade_value().never();
    contract.expect_exit_trade().never();

    let err = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(contract),
        settings(RunMode::All),
    )
    .run(at(2025, 1, 10, 0, 0, 0))
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::HealthCheck(_)));
    assert!(store.already_processed("0xsub").await.unwrap().is_empty());
    assert!(store.current_summary("0xsub").await.unwrap().is_none());
}
