use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    data::{domain::Symbol, event::ExecutionRecord},
    error::{GridArbResult, ProviderError},
};

// ================================================================================================
// Execution History
// ================================================================================================

/// Query interface to the broker's execution history.
///
/// Contract:
/// - `execution_id` values are globally unique and stable across queries.
/// - Records outside `[start, end]` are never returned.
/// - Genuine unavailability is an error, not an empty list.
#[async_trait]
pub trait ExecutionHistoryProvider: Send + Sync {
    async fn execution_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GridArbResult<Vec<ExecutionRecord>>;
}

/// Ledger positions as reported by the hosting portfolio (LP).
///
/// The reconciliation baseline is defined against this view: for every
/// symbol, `LP(s) - GP(s)` must equal the recognized baseline at each
/// consistency point.
pub trait LedgerView: Send + Sync {
    /// All symbols with a non-zero ledger position, with their signed
    /// quantities.
    fn ledger_positions(&self) -> Vec<(Symbol, Decimal)>;

    fn ledger_position(&self, symbol: &Symbol) -> Decimal {
        self.ledger_positions()
            .into_iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, q)| q)
            .unwrap_or(Decimal::ZERO)
    }
}

// ================================================================================================
// In-Memory Provider (tests, offline runs)
// ================================================================================================

/// History provider backed by a mutable in-memory record list.
///
/// Used by the test suite and by offline/backtest hosts that feed recorded
/// fills. Can be switched into a failing mode to exercise the
/// abandon-and-retry path of reconciliation sweeps.
#[derive(Default)]
pub struct StaticHistoryProvider {
    records: RwLock<Vec<ExecutionRecord>>,
    unavailable: RwLock<bool>,
}

impl StaticHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ExecutionRecord) {
        self.records.write().unwrap().push(record);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }
}

#[async_trait]
impl ExecutionHistoryProvider for StaticHistoryProvider {
    async fn execution_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GridArbResult<Vec<ExecutionRecord>> {
        if *self.unavailable.read().unwrap() {
            return Err(ProviderError::HistoryUnavailable(
                "static provider switched off".to_string(),
            )
            .into());
        }
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.time >= start && r.time <= end)
            .cloned()
            .collect())
    }
}

/// Static ledger view over a fixed position list.
#[derive(Debug, Default)]
pub struct StaticLedger {
    positions: RwLock<Vec<(Symbol, Decimal)>>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: Symbol, quantity: Decimal) {
        let mut positions = self.positions.write().unwrap();
        positions.retain(|(s, _)| *s != symbol);
        if !quantity.is_zero() {
            positions.push((symbol, quantity));
        }
    }
}

impl LedgerView for StaticLedger {
    fn ledger_positions(&self) -> Vec<(Symbol, Decimal)> {
        self.positions.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::data::domain::{ExecutionId, Market, SecurityType};

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn record(id: &str, time: &str) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: ExecutionId::from(id),
            symbol: Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap(),
            quantity: Decimal::ONE,
            price: Decimal::ONE_HUNDRED,
            time: ts(time),
            tag: None,
            fee: Decimal::ZERO,
            fee_currency: None,
        }
    }

    #[tokio::test]
    async fn static_provider_filters_by_window_inclusively() {
        let provider = StaticHistoryProvider::new();
        provider.push(record("a", "2026-04-01T00:00:00Z"));
        provider.push(record("b", "2026-04-01T00:05:00Z"));
        provider.push(record("c", "2026-04-01T00:10:00Z"));

        let records = provider
            .execution_history(ts("2026-04-01T00:00:00Z"), ts("2026-04-01T00:05:00Z"))
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.execution_id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn static_provider_signals_unavailability_as_error() {
        let provider = StaticHistoryProvider::new();
        provider.set_unavailable(true);
        assert!(
            provider
                .execution_history(ts("2026-04-01T00:00:00Z"), ts("2026-04-02T00:00:00Z"))
                .await
                .is_err()
        );
    }

    #[test]
    fn static_ledger_drops_zero_positions() {
        let ledger = StaticLedger::new();
        let symbol = Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap();
        ledger.set(symbol.clone(), Decimal::ONE);
        assert_eq!(ledger.ledger_position(&symbol), Decimal::ONE);

        ledger.set(symbol.clone(), Decimal::ZERO);
        assert!(ledger.ledger_positions().is_empty());
    }
}
