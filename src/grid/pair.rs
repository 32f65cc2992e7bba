use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    data::{
        domain::{MarketState, PairType, SpreadDirection, Symbol},
        security::Security,
    },
    grid::{level::GridLevel, level::GridLevelPair, position::GridPosition},
    spread::{self, SpreadSnapshot},
};

/// Identity of a managed pair: the ordered leg symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub leg1: Symbol,
    pub leg2: Symbol,
}

impl PairKey {
    pub fn new(leg1: Symbol, leg2: Symbol) -> Self {
        Self { leg1, leg2 }
    }
}

/// One managed trading pair: its legs, its grid, its open positions and the
/// latest spread evaluation.
///
/// All mutation happens behind the owning manager's mutex; the pair itself
/// carries no locking.
#[derive(Debug, Clone)]
pub struct TradingPair {
    leg1: Symbol,
    leg2: Symbol,
    pair_type: PairType,
    grid_levels: Vec<GridLevel>,
    positions: HashMap<String, GridPosition>,
    snapshot: SpreadSnapshot,
    last_update: Option<DateTime<Utc>>,
}

impl TradingPair {
    pub fn new(leg1: Symbol, leg2: Symbol, pair_type: PairType) -> Self {
        Self {
            leg1,
            leg2,
            pair_type,
            grid_levels: Vec::new(),
            positions: HashMap::new(),
            snapshot: SpreadSnapshot::invalid(),
            last_update: None,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.leg1.clone(), self.leg2.clone())
    }

    pub fn leg1(&self) -> &Symbol {
        &self.leg1
    }

    pub fn leg2(&self) -> &Symbol {
        &self.leg2
    }

    pub fn pair_type(&self) -> PairType {
        self.pair_type
    }

    pub fn contains_symbol(&self, symbol: &Symbol) -> bool {
        *symbol == self.leg1 || *symbol == self.leg2
    }

    // ============================================================================================
    // Spread State
    // ============================================================================================

    /// Re-evaluates the spread from the legs' current quotes.
    ///
    /// The snapshot is replaced wholesale so concurrent readers (through the
    /// manager) never observe a torn update.
    pub fn update(&mut self, leg1: &Security, leg2: &Security, now: DateTime<Utc>) {
        self.snapshot = spread::evaluate(leg1.bid, leg1.ask, leg2.bid, leg2.ask);
        self.last_update = Some(now);
    }

    pub fn snapshot(&self) -> &SpreadSnapshot {
        &self.snapshot
    }

    pub fn market_state(&self) -> MarketState {
        self.snapshot.market_state
    }

    pub fn direction(&self) -> Option<SpreadDirection> {
        self.snapshot.direction
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    // ============================================================================================
    // Grid Levels
    // ============================================================================================

    /// Replaces the pair's grid, kept ordered by spread percentage.
    pub fn set_grid_levels(&mut self, mut levels: Vec<GridLevel>) {
        levels.sort_by(|a, b| a.spread_pct.cmp(&b.spread_pct));
        self.grid_levels = levels;
    }

    pub fn grid_levels(&self) -> &[GridLevel] {
        &self.grid_levels
    }

    // ============================================================================================
    // Positions
    // ============================================================================================

    /// Returns the position for the level pair's entry key, creating a flat
    /// one on first sight. Idempotent per key.
    pub fn get_or_create_position(
        &mut self,
        level_pair: &GridLevelPair,
        time: DateTime<Utc>,
    ) -> &mut GridPosition {
        self.positions
            .entry(level_pair.tag_key())
            .or_insert_with(|| {
                GridPosition::new(
                    self.leg1.clone(),
                    self.leg2.clone(),
                    level_pair.clone(),
                    time,
                )
            })
    }

    pub fn position(&self, tag_key: &str) -> Option<&GridPosition> {
        self.positions.get(tag_key)
    }

    pub fn remove_position(&mut self, tag_key: &str) -> Option<GridPosition> {
        self.positions.remove(tag_key)
    }

    /// Reinserts a restored position. Used by checkpoint restore only.
    pub(crate) fn insert_position(&mut self, position: GridPosition) {
        self.positions.insert(position.tag_key(), position);
    }

    pub fn positions(&self) -> impl Iterator<Item = &GridPosition> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Signed quantity this pair's positions hold in `symbol`, summed across
    /// all grid rungs.
    pub fn aggregate_quantity(&self, symbol: &Symbol) -> Decimal {
        self.positions
            .values()
            .map(|p| p.quantity_for(symbol))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::data::domain::{GridLevelType, Market, SecurityType};

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn leg1() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
    }

    fn leg2() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Bybit).unwrap()
    }

    fn level_pair(entry: &str) -> GridLevelPair {
        let direction = SpreadDirection::ShortSpread;
        GridLevelPair::new(
            GridLevel::new(dec(entry), direction, GridLevelType::Entry, dec("0.25")).unwrap(),
            GridLevel::new(dec("0.0"), direction, GridLevelType::Exit, dec("0.25")).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn update_refreshes_snapshot_atomically() {
        let mut pair = TradingPair::new(leg1(), leg2(), PairType::SpotFuture);
        assert_eq!(pair.market_state(), MarketState::Unknown);

        let sec1 = Security::new(leg1(), "BTC", "USDT").with_quotes(
            dec("101"),
            dec("102"),
            dec("101.5"),
        );
        let sec2 = Security::new(leg2(), "BTC", "USDT").with_quotes(
            dec("99"),
            dec("100"),
            dec("99.5"),
        );

        pair.update(&sec1, &sec2, ts("2026-04-01T00:00:00Z"));
        assert_eq!(pair.market_state(), MarketState::Crossed);
        assert_eq!(pair.direction(), Some(SpreadDirection::ShortSpread));
        assert_eq!(pair.last_update(), Some(ts("2026-04-01T00:00:00Z")));
    }

    #[test]
    fn get_or_create_is_idempotent_per_key() {
        let mut pair = TradingPair::new(leg1(), leg2(), PairType::SpotFuture);
        let lp = level_pair("0.005");

        pair.get_or_create_position(&lp, ts("2026-04-01T00:00:00Z"))
            .leg1_quantity = dec("1");
        assert_eq!(pair.position_count(), 1);

        // Same key: returns the existing position untouched.
        let existing = pair.get_or_create_position(&lp, ts("2026-04-02T00:00:00Z"));
        assert_eq!(existing.leg1_quantity, dec("1"));
        assert_eq!(existing.first_fill_time, ts("2026-04-01T00:00:00Z"));
        assert_eq!(pair.position_count(), 1);

        // Different rung: a second position.
        pair.get_or_create_position(&level_pair("0.01"), ts("2026-04-02T00:00:00Z"));
        assert_eq!(pair.position_count(), 2);
    }

    #[test]
    fn aggregate_quantity_sums_across_rungs() {
        let mut pair = TradingPair::new(leg1(), leg2(), PairType::SpotFuture);
        pair.get_or_create_position(&level_pair("0.005"), ts("2026-04-01T00:00:00Z"))
            .leg1_quantity = dec("-1");
        pair.get_or_create_position(&level_pair("0.01"), ts("2026-04-01T00:00:00Z"))
            .leg1_quantity = dec("-2");

        assert_eq!(pair.aggregate_quantity(&leg1()), dec("-3"));
        assert_eq!(pair.aggregate_quantity(&leg2()), Decimal::ZERO);
    }

    #[test]
    fn grid_levels_are_kept_sorted() {
        let mut pair = TradingPair::new(leg1(), leg2(), PairType::SpotFuture);
        let direction = SpreadDirection::LongSpread;
        let mk = |spread: &str, lt| GridLevel::new(dec(spread), direction, lt, dec("0.5")).unwrap();

        pair.set_grid_levels(vec![
            mk("0.02", GridLevelType::Entry),
            mk("-0.01", GridLevelType::Exit),
            mk("0.005", GridLevelType::Entry),
        ]);

        let spreads: Vec<_> = pair.grid_levels().iter().map(|l| l.spread_pct).collect();
        assert_eq!(spreads, vec![dec("-0.01"), dec("0.005"), dec("0.02")]);
    }
}
