//! End-to-end reconciliation scenarios: lost-fill replay, duplicate
//! executions across a restart, and checkpoint-driven recovery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use object_store::memory::InMemory;
use rust_decimal::Decimal;

use gridarb::{
    BaselineOutcome, PairManager,
    clock::FixedClock,
    data::{
        domain::{
            ExecutionId, GridLevelType, Market, SecurityType, SpreadDirection, Symbol,
        },
        event::ExecutionRecord,
        security::{Security, SecurityRegistry},
    },
    grid::{
        level::{GridLevel, GridLevelPair},
        pair::PairKey,
        tag,
    },
    provider::{StaticHistoryProvider, StaticLedger},
};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn t0() -> DateTime<Utc> {
    ts("2026-04-01T12:00:00Z")
}

fn leg_a() -> Symbol {
    Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
}

fn leg_b() -> Symbol {
    Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Bybit).unwrap()
}

fn level_pair() -> GridLevelPair {
    let direction = SpreadDirection::LongSpread;
    GridLevelPair::new(
        GridLevel::new(dec("0.01"), direction, GridLevelType::Entry, dec("0.5")).unwrap(),
        GridLevel::new(dec("0.001"), direction, GridLevelType::Exit, dec("0.5")).unwrap(),
    )
    .unwrap()
}

fn registry() -> SecurityRegistry {
    let registry = SecurityRegistry::new();
    registry.upsert(Security::new(leg_a(), "BTC", "USDT"));
    registry.upsert(Security::new(leg_b(), "BTC", "USDT"));
    registry
}

fn execution(id: &str, quantity: &str, price: &str, time: DateTime<Utc>) -> ExecutionRecord {
    ExecutionRecord {
        execution_id: ExecutionId::from(id),
        symbol: leg_a(),
        quantity: dec(quantity),
        price: dec(price),
        time,
        tag: Some(tag::encode(&leg_a(), &leg_b(), &level_pair())),
        fee: Decimal::ZERO,
        fee_currency: None,
    }
}

fn build_manager(
    store: Arc<InMemory>,
    provider: Arc<StaticHistoryProvider>,
    clock: Arc<FixedClock>,
) -> PairManager {
    PairManager::new(registry(), clock)
        .with_history_provider(provider)
        .with_object_store(store)
}

#[tokio::test]
async fn lost_fill_is_recovered_by_baseline_comparison() {
    let store = Arc::new(InMemory::new());
    let provider = Arc::new(StaticHistoryProvider::new());
    let clock = Arc::new(FixedClock::new(t0()));

    let manager = build_manager(store, provider.clone(), clock);
    manager.add_pair(leg_a(), leg_b(), None).await.unwrap();

    // Bootstrap with a flat ledger: baseline is empty.
    let ledger = StaticLedger::new();
    assert_eq!(
        manager.compare_baseline(&ledger).await.unwrap(),
        BaselineOutcome::Initialized
    );

    // A fill happens at the broker but the event never reaches us.
    provider.push(execution("lost", "1", "100", t0() - Duration::minutes(10)));
    ledger.set(leg_a(), dec("1"));

    // First sweep: discrepancy detected, history replayed.
    let outcome = manager.compare_baseline(&ledger).await.unwrap();
    assert_eq!(
        outcome,
        BaselineOutcome::Discrepancy {
            symbols: vec![leg_a()],
            replayed: 1,
        }
    );
    assert_eq!(manager.grid_quantity(&leg_a()).await, dec("1"));

    let key = PairKey::new(leg_a(), leg_b());
    let pair = manager.pair(&key).await.unwrap();
    let position = pair.position(&level_pair().tag_key()).unwrap();
    assert_eq!(position.leg1_quantity, dec("1"));
    assert_eq!(position.leg1_avg_cost, dec("100"));

    // Second sweep: converged.
    assert_eq!(
        manager.compare_baseline(&ledger).await.unwrap(),
        BaselineOutcome::Consistent
    );
}

#[tokio::test]
async fn duplicate_execution_across_restart_is_applied_once() {
    let store = Arc::new(InMemory::new());
    let provider = Arc::new(StaticHistoryProvider::new());
    let clock = Arc::new(FixedClock::new(t0()));

    // Process one execution live, checkpoint, and "crash".
    let first = build_manager(store.clone(), provider.clone(), clock.clone());
    first.add_pair(leg_a(), leg_b(), None).await.unwrap();
    provider.push(execution("X", "1", "100", t0() - Duration::minutes(1)));
    assert_eq!(first.reconcile().await, 1);
    assert_eq!(first.grid_quantity(&leg_a()).await, dec("1"));
    first.persist_state().await.unwrap();
    drop(first);

    // Restart from the checkpoint.
    clock.advance(Duration::minutes(2));
    let second = build_manager(store, provider, clock);
    assert!(second.restore_state().await.unwrap());

    assert_eq!(second.grid_quantity(&leg_a()).await, dec("1"));
    assert!(second.is_execution_processed(&ExecutionId::from("X")).await);

    // A later sweep's window reaches back past "X"; the provider returns it
    // again and the persisted dedup cache drops it.
    assert_eq!(second.reconcile().await, 0);
    assert_eq!(second.grid_quantity(&leg_a()).await, dec("1"));
    assert!(second.is_execution_processed(&ExecutionId::from("X")).await);
}

#[tokio::test]
async fn interleaved_live_and_replayed_fills_stay_exactly_once() {
    let store = Arc::new(InMemory::new());
    let provider = Arc::new(StaticHistoryProvider::new());
    let clock = Arc::new(FixedClock::new(t0()));

    let manager = build_manager(store, provider.clone(), clock);
    manager.add_pair(leg_a(), leg_b(), None).await.unwrap();

    // Three executions at the broker; replay applies them in time order.
    provider.push(execution("e-2", "1", "101", t0() - Duration::minutes(2)));
    provider.push(execution("e-1", "1", "100", t0() - Duration::minutes(3)));
    provider.push(execution("e-3", "-2", "102", t0() - Duration::minutes(1)));

    assert_eq!(manager.reconcile().await, 3);

    // Net flat: +1 +1 -2; the position was opened and fully closed.
    assert_eq!(manager.grid_quantity(&leg_a()).await, Decimal::ZERO);
    let key = PairKey::new(leg_a(), leg_b());
    assert_eq!(manager.pair(&key).await.unwrap().position_count(), 0);

    // Replaying the same history again changes nothing.
    assert_eq!(manager.reconcile().await, 0);
}

#[tokio::test]
async fn provider_outage_leaves_state_intact_and_retries_later() {
    let store = Arc::new(InMemory::new());
    let provider = Arc::new(StaticHistoryProvider::new());
    let clock = Arc::new(FixedClock::new(t0()));

    let manager = build_manager(store, provider.clone(), clock);
    manager.add_pair(leg_a(), leg_b(), None).await.unwrap();

    let ledger = StaticLedger::new();
    assert_eq!(
        manager.compare_baseline(&ledger).await.unwrap(),
        BaselineOutcome::Initialized
    );

    provider.push(execution("late", "1", "100", t0() - Duration::minutes(5)));
    ledger.set(leg_a(), dec("1"));
    provider.set_unavailable(true);

    // Outage: the sweep is abandoned, nothing replayed.
    let outcome = manager.compare_baseline(&ledger).await.unwrap();
    assert!(matches!(
        outcome,
        BaselineOutcome::Discrepancy { replayed: 0, .. }
    ));
    assert_eq!(manager.grid_quantity(&leg_a()).await, Decimal::ZERO);

    // Next tick, the provider is back and the state converges.
    provider.set_unavailable(false);
    let outcome = manager.compare_baseline(&ledger).await.unwrap();
    assert!(matches!(
        outcome,
        BaselineOutcome::Discrepancy { replayed: 1, .. }
    ));
    assert_eq!(
        manager.compare_baseline(&ledger).await.unwrap(),
        BaselineOutcome::Consistent
    );
}
