use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::{
    data::{
        domain::{OrderId, OrderStatus, Symbol},
        event::{ExecutionRecord, OrderEvent, OrderTicket},
    },
    error::GridArbResult,
    grid::manager::{ManagerState, PairManager},
    provider::LedgerView,
    sorted_vec_map::SortedVecMap,
};

/// Replay windows reach this many minutes behind the oldest per-market fill
/// time.
const REPLAY_LOOKBACK_MINUTES: i64 = 5;

/// Window, in minutes, used when no fill has ever been seen.
const DEFAULT_REPLAY_WINDOW_MINUTES: i64 = 30;

// ================================================================================================
// Virtual Order Ids
// ================================================================================================

/// Process-wide counter for replayed fills.
///
/// Strictly decreasing and negative, so virtual ids can never collide with
/// live broker order ids. Lives for the whole process; it is only reset by a
/// restart, which is safe because no reconciliation is in flight across one.
static VIRTUAL_ORDER_ID: AtomicI64 = AtomicI64::new(0);

pub(crate) fn next_virtual_order_id() -> OrderId {
    OrderId(VIRTUAL_ORDER_ID.fetch_sub(1, Ordering::Relaxed) - 1)
}

// ================================================================================================
// Outcome
// ================================================================================================

/// Result of one baseline comparison sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineOutcome {
    /// Fresh start: the baseline was computed for the first time.
    Initialized,
    /// Every symbol's ledger-minus-grid difference matched the baseline.
    Consistent,
    /// At least one symbol diverged; a history replay was attempted.
    Discrepancy {
        symbols: Vec<Symbol>,
        replayed: usize,
    },
}

// ================================================================================================
// Reconciliation
// ================================================================================================

impl PairManager {
    /// Periodic/reconnect sweep: verify `LP - GP == Baseline` for every
    /// symbol, replay missed executions on divergence, prune the dedup cache
    /// on convergence, and checkpoint either way.
    #[tracing::instrument(skip(self, ledger))]
    pub async fn compare_baseline(&self, ledger: &dyn LedgerView) -> GridArbResult<BaselineOutcome> {
        let mut state = self.state.lock().await;

        // A never-filled manager is a fresh start; recognize the current
        // difference instead of chasing it. Runs at most once per process.
        if state.last_fill_time_by_market.is_empty() && !state.baseline_initialized {
            Self::initialize_baseline_locked(&mut state, ledger);
            self.checkpoint_quietly(&state).await;
            return Ok(BaselineOutcome::Initialized);
        }

        let discrepancies = Self::baseline_discrepancies(&state, ledger);
        let outcome = if discrepancies.is_empty() {
            Self::cleanup_processed_executions_locked(&mut state);
            BaselineOutcome::Consistent
        } else {
            warn!(
                symbols = ?discrepancies.iter().map(Symbol::to_string).collect::<Vec<_>>(),
                "Baseline discrepancy detected, replaying execution history"
            );
            let replayed = self.replay_missed_executions(&mut state).await;
            BaselineOutcome::Discrepancy {
                symbols: discrepancies,
                replayed,
            }
        };

        self.checkpoint_quietly(&state).await;
        Ok(outcome)
    }

    /// Manually triggered replay over the standard window (reconnect hook).
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> usize {
        let mut state = self.state.lock().await;
        self.replay_missed_executions(&mut state).await
    }

    /// Explicit bootstrap hook: recognize the current ledger/grid difference
    /// as the baseline. No-op when fills have already been observed.
    pub async fn initialize_baseline(&self, ledger: &dyn LedgerView) {
        let mut state = self.state.lock().await;
        if state.last_fill_time_by_market.is_empty() {
            Self::initialize_baseline_locked(&mut state, ledger);
        }
    }

    /// Fresh-start baseline: every symbol whose ledger position differs from
    /// the grid aggregate gets its difference recognized.
    pub(crate) fn initialize_baseline_locked(state: &mut ManagerState, ledger: &dyn LedgerView) {
        let mut baseline = SortedVecMap::new();
        for symbol in Self::observed_symbols(state, ledger) {
            let difference = ledger.ledger_position(&symbol) - state.grid_quantity(&symbol);
            if !difference.is_zero() {
                baseline.insert(symbol, difference);
            }
        }
        info!(entries = baseline.len(), "Baseline initialized");
        state.baseline = baseline;
        state.baseline_initialized = true;
    }

    /// Symbols whose current `LP - GP` no longer equals the baseline.
    pub(crate) fn baseline_discrepancies(
        state: &ManagerState,
        ledger: &dyn LedgerView,
    ) -> Vec<Symbol> {
        let mut symbols = Self::observed_symbols(state, ledger);
        symbols.extend(state.baseline.keys().cloned());

        symbols
            .into_iter()
            .unique()
            .filter(|symbol| {
                let difference = ledger.ledger_position(symbol) - state.grid_quantity(symbol);
                let recognized = state
                    .baseline
                    .get(symbol)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                difference != recognized
            })
            .collect()
    }

    /// Queries the history provider over the replay window and routes every
    /// record that survives filtering through the regular event path.
    ///
    /// Provider absence or failure abandons the sweep: the baseline is
    /// untouched and the next tick retries.
    pub(crate) async fn replay_missed_executions(&self, state: &mut ManagerState) -> usize {
        let Some(provider) = self.history.as_ref() else {
            warn!("No execution history provider; replay skipped");
            return 0;
        };

        let end = self.clock.utc_now();
        let start = state
            .last_fill_time_by_market
            .values()
            .min()
            .map(|earliest| *earliest - Duration::minutes(REPLAY_LOOKBACK_MINUTES))
            .unwrap_or(end - Duration::minutes(DEFAULT_REPLAY_WINDOW_MINUTES));

        self.replay_window_locked(state, provider.as_ref(), start, end)
            .await
    }

    pub(crate) async fn replay_window_locked(
        &self,
        state: &mut ManagerState,
        provider: &dyn crate::provider::ExecutionHistoryProvider,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> usize {
        let records = match provider.execution_history(start, end).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Execution history unavailable, abandoning sweep");
                return 0;
            }
        };
        if records.is_empty() {
            return 0;
        }

        let replayable: Vec<ExecutionRecord> = records
            .into_iter()
            .filter(|record| Self::should_process_execution(state, record))
            .sorted_by_key(|record| record.time)
            .collect();

        let replayed = replayable.len();
        for record in replayable {
            let event = synthesize_fill_event(record);
            Self::process_event_locked(state, &event);
        }
        if replayed > 0 {
            info!(replayed, "Replayed executions from broker history");
        }
        replayed
    }

    /// Keep an execution if it was never applied and is not older than the
    /// market's last known fill. Equal timestamps are kept to tolerate
    /// concurrent orders sharing a fill time.
    pub(crate) fn should_process_execution(state: &ManagerState, record: &ExecutionRecord) -> bool {
        if state.processed_executions.contains_key(&record.execution_id) {
            return false;
        }
        match state.last_fill_time_by_market.get(&record.symbol.market()) {
            Some(last_fill) => record.time >= *last_fill,
            None => true,
        }
    }

    /// Prunes dedup snapshots that have aged behind their market's last fill
    /// time. Only runs after a sweep that found no discrepancy.
    pub(crate) fn cleanup_processed_executions_locked(state: &mut ManagerState) {
        let last_fill = state.last_fill_time_by_market.clone();
        let before = state.processed_executions.len();
        state.processed_executions.retain(|_, snapshot| {
            match last_fill.get(&snapshot.market) {
                Some(watermark) => snapshot.time_utc >= *watermark,
                None => true,
            }
        });
        let pruned = before - state.processed_executions.len();
        if pruned > 0 {
            debug!(pruned, "Pruned processed-execution snapshots");
        }
    }

    fn observed_symbols(state: &ManagerState, ledger: &dyn LedgerView) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = state.grid_symbols().into_iter().collect();
        symbols.extend(ledger.ledger_positions().into_iter().map(|(s, _)| s));
        symbols.into_iter().unique().collect()
    }

    /// Persist with failures logged and swallowed; an unwritable store must
    /// not fail the sweep.
    async fn checkpoint_quietly(&self, state: &ManagerState) {
        if self.store.is_none() {
            debug!("No object store configured; checkpoint skipped");
            return;
        }
        if let Err(e) = self.persist_locked(state).await {
            error!(error = %e, "Checkpoint write failed; state kept in memory");
        }
    }
}

/// Wraps a replayed execution as a filled order event with a virtual order
/// id, so it flows through the exact same path as a live fill.
fn synthesize_fill_event(record: ExecutionRecord) -> OrderEvent {
    let order_id = next_virtual_order_id();
    let direction = record.direction();
    OrderEvent {
        order_id,
        symbol: record.symbol,
        time: record.time,
        status: OrderStatus::Filled,
        direction,
        fill_price: record.price,
        fill_quantity: record.quantity.abs(),
        fee: record.fee,
        fee_currency: record.fee_currency,
        execution_id: Some(record.execution_id),
        ticket: record.tag.map(|tag| OrderTicket::new(order_id, tag)),
    }
}
