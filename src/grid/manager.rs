use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::{
    clock::Clock,
    data::{
        domain::{ExecutionId, Market, OrderStatus, PairType, Symbol},
        event::{ExecutionSnapshot, OrderEvent},
        security::SecurityRegistry,
    },
    error::{DataError, GridArbResult},
    grid::{
        level::GridLevel,
        pair::{PairKey, TradingPair},
        tag,
    },
    provider::ExecutionHistoryProvider,
    sorted_vec_map::SortedVecMap,
    spread::SpreadSnapshot,
};

// ================================================================================================
// Change Notifications
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairChange {
    Added,
    Removed,
}

/// Broadcast whenever the set of managed pairs changes.
#[derive(Debug, Clone)]
pub struct PairSetEvent {
    pub change: PairChange,
    pub leg1: Symbol,
    pub leg2: Symbol,
}

// ================================================================================================
// Manager State
// ================================================================================================

/// Everything the manager mutates, guarded by one coarse mutex.
///
/// The single lock covers pairs, grid positions, the execution dedup cache,
/// per-market fill times and the baseline, so a reconciliation sweep and a
/// live order event can never interleave partially.
#[derive(Debug, Default)]
pub(crate) struct ManagerState {
    pub pairs: HashMap<PairKey, TradingPair>,
    pub processed_executions: HashMap<ExecutionId, ExecutionSnapshot>,
    pub last_fill_time_by_market: HashMap<Market, DateTime<Utc>>,
    pub baseline: SortedVecMap<Symbol, Decimal>,
    /// Set once the baseline has been computed for this process; initialization
    /// must not repeat and absorb later divergence.
    pub baseline_initialized: bool,
}

impl ManagerState {
    /// Aggregate grid quantity in `symbol` across every pair and rung.
    pub fn grid_quantity(&self, symbol: &Symbol) -> Decimal {
        self.pairs
            .values()
            .map(|pair| pair.aggregate_quantity(symbol))
            .sum()
    }

    /// All symbols any managed pair trades.
    pub fn grid_symbols(&self) -> BTreeSet<Symbol> {
        self.pairs
            .values()
            .flat_map(|pair| [pair.leg1().clone(), pair.leg2().clone()])
            .collect()
    }
}

// ================================================================================================
// Pair Manager
// ================================================================================================

/// Owns the trading pairs, their grid positions and the reconciliation
/// state.
///
/// `process_grid_order_event` is the single authoritative entry point for
/// fill-driven state changes; reconciliation replays route through the same
/// path, which is what makes the exactly-once guarantee compositional.
pub struct PairManager {
    pub(crate) state: Mutex<ManagerState>,
    pub(crate) registry: SecurityRegistry,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) history: Option<Arc<dyn ExecutionHistoryProvider>>,
    pub(crate) store: Option<Arc<dyn ObjectStore>>,
    changes: broadcast::Sender<PairSetEvent>,
}

impl PairManager {
    pub fn new(registry: SecurityRegistry, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(ManagerState::default()),
            registry,
            clock,
            history: None,
            store: None,
            changes,
        }
    }

    pub fn with_history_provider(mut self, provider: Arc<dyn ExecutionHistoryProvider>) -> Self {
        self.history = Some(provider);
        self
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &SecurityRegistry {
        &self.registry
    }

    /// Subscribe to pair added/removed notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PairSetEvent> {
        self.changes.subscribe()
    }

    // ============================================================================================
    // Pair Set
    // ============================================================================================

    /// Adds a pair, idempotently. Both legs must be known to the security
    /// registry.
    pub async fn add_pair(
        &self,
        leg1: Symbol,
        leg2: Symbol,
        pair_type: Option<PairType>,
    ) -> GridArbResult<PairKey> {
        for leg in [&leg1, &leg2] {
            if !self.registry.contains(leg) {
                return Err(DataError::UnknownSymbol(leg.to_string()).into());
            }
        }

        let key = PairKey::new(leg1.clone(), leg2.clone());
        let mut state = self.state.lock().await;
        if state.pairs.contains_key(&key) {
            return Ok(key);
        }

        state.pairs.insert(
            key.clone(),
            TradingPair::new(leg1.clone(), leg2.clone(), pair_type.unwrap_or_default()),
        );
        drop(state);

        let _ = self.changes.send(PairSetEvent {
            change: PairChange::Added,
            leg1,
            leg2,
        });
        Ok(key)
    }

    /// Removes a pair and all its positions. Returns whether it existed.
    pub async fn remove_pair(&self, key: &PairKey) -> bool {
        let removed = self.state.lock().await.pairs.remove(key);
        if let Some(pair) = removed {
            let _ = self.changes.send(PairSetEvent {
                change: PairChange::Removed,
                leg1: pair.leg1().clone(),
                leg2: pair.leg2().clone(),
            });
            true
        } else {
            false
        }
    }

    pub async fn pair_count(&self) -> usize {
        self.state.lock().await.pairs.len()
    }

    pub async fn pair_keys(&self) -> Vec<PairKey> {
        self.state.lock().await.pairs.keys().cloned().collect()
    }

    /// A point-in-time copy of one pair, for observers and tests.
    pub async fn pair(&self, key: &PairKey) -> Option<TradingPair> {
        self.state.lock().await.pairs.get(key).cloned()
    }

    pub async fn set_grid_levels(&self, key: &PairKey, levels: Vec<GridLevel>) -> GridArbResult<()> {
        let mut state = self.state.lock().await;
        let pair = state.pairs.get_mut(key).ok_or_else(|| DataError::UnknownPair {
            leg1: key.leg1.to_string(),
            leg2: key.leg2.to_string(),
        })?;
        pair.set_grid_levels(levels);
        Ok(())
    }

    // ============================================================================================
    // Quotes
    // ============================================================================================

    /// Applies a quote tick and re-evaluates every pair trading the symbol.
    ///
    /// Readers of pair snapshots always observe a complete evaluation; the
    /// lock is held across the refresh.
    pub async fn on_quote(&self, symbol: &Symbol, bid: Decimal, ask: Decimal, last: Decimal) {
        self.registry.update_quotes(symbol, bid, ask, last);
        let now = self.clock.utc_now();

        let mut state = self.state.lock().await;
        let keys: Vec<PairKey> = state
            .pairs
            .values()
            .filter(|pair| pair.contains_symbol(symbol))
            .map(TradingPair::key)
            .collect();

        for key in keys {
            let (Some(sec1), Some(sec2)) = (self.registry.get(&key.leg1), self.registry.get(&key.leg2))
            else {
                continue;
            };
            if let Some(pair) = state.pairs.get_mut(&key) {
                pair.update(&sec1, &sec2, now);
            }
        }
    }

    /// Spread snapshot of one pair, if managed.
    pub async fn pair_snapshot(&self, key: &PairKey) -> Option<SpreadSnapshot> {
        self.state
            .lock()
            .await
            .pairs
            .get(key)
            .map(|pair| *pair.snapshot())
    }

    // ============================================================================================
    // Order Events
    // ============================================================================================

    /// The single authoritative entry point for fill-driven state changes.
    #[tracing::instrument(skip(self, event), fields(order = %event.order_id, status = %event.status, symbol = %event.symbol))]
    pub async fn process_grid_order_event(&self, event: &OrderEvent) {
        let mut state = self.state.lock().await;
        Self::process_event_locked(&mut state, event);
    }

    /// Event-application core, shared by the live path and history replay.
    /// Caller holds the manager mutex.
    pub(crate) fn process_event_locked(state: &mut ManagerState, event: &OrderEvent) {
        // Exactly-once: drop events whose execution was already applied.
        if let Some(execution_id) = effective_execution_id(event) {
            if state.processed_executions.contains_key(execution_id) {
                debug!(execution = %execution_id, "Duplicate execution dropped");
                return;
            }
        }

        // Not every order is a grid order; silence is the correct response.
        let Some(raw_tag) = event.tag() else {
            return;
        };
        let Some((leg1, leg2, level_pair)) = tag::decode(raw_tag) else {
            return;
        };

        let key = PairKey::new(leg1, leg2);
        let Some(pair) = state.pairs.get_mut(&key) else {
            debug!(leg1 = %key.leg1, leg2 = %key.leg2, "Event for unmanaged pair ignored");
            return;
        };

        match event.status {
            OrderStatus::PartiallyFilled => {
                let position = pair.get_or_create_position(&level_pair, event.time);
                position.process_fill(event);
            }
            OrderStatus::Filled => {
                let position = pair.get_or_create_position(&level_pair, event.time);
                position.process_fill(event);
                if !position.invested() {
                    pair.remove_position(&level_pair.tag_key());
                }
            }
            OrderStatus::Canceled | OrderStatus::Invalid => {
                let removable = pair
                    .position(&level_pair.tag_key())
                    .is_some_and(|position| !position.invested());
                if removable {
                    pair.remove_position(&level_pair.tag_key());
                }
            }
            OrderStatus::None
            | OrderStatus::New
            | OrderStatus::Submitted
            | OrderStatus::UpdateSubmitted => {
                // Non-actionable lifecycle noise.
                return;
            }
        }

        if let Some(snapshot) = ExecutionSnapshot::from_event(event) {
            if !snapshot.execution_id.as_str().is_empty() {
                state
                    .processed_executions
                    .insert(snapshot.execution_id.clone(), snapshot);
            }
        }

        let market = event.symbol.market();
        state
            .last_fill_time_by_market
            .entry(market)
            .and_modify(|existing| {
                if event.time > *existing {
                    *existing = event.time;
                }
            })
            .or_insert(event.time);
    }

    // ============================================================================================
    // Observers
    // ============================================================================================

    /// Aggregate grid quantity for a symbol across all pairs (GP).
    pub async fn grid_quantity(&self, symbol: &Symbol) -> Decimal {
        self.state.lock().await.grid_quantity(symbol)
    }

    pub async fn last_fill_time(&self, market: Market) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .last_fill_time_by_market
            .get(&market)
            .copied()
    }

    pub async fn processed_execution_count(&self) -> usize {
        self.state.lock().await.processed_executions.len()
    }

    pub async fn is_execution_processed(&self, execution_id: &ExecutionId) -> bool {
        self.state
            .lock()
            .await
            .processed_executions
            .contains_key(execution_id)
    }

    pub async fn baseline(&self) -> Vec<(Symbol, Decimal)> {
        self.state
            .lock()
            .await
            .baseline
            .iter()
            .map(|(s, d)| (s.clone(), *d))
            .collect()
    }
}

/// The dedup key, when the event carries a usable one. Brokers occasionally
/// deliver empty execution ids on synthetic events; those cannot be
/// deduplicated and are treated as absent.
fn effective_execution_id(event: &OrderEvent) -> Option<&ExecutionId> {
    event
        .execution_id
        .as_ref()
        .filter(|id| !id.as_str().is_empty())
}
