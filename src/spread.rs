use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::domain::{MarketState, SpreadDirection};

/// Quotes at or below this are treated as absent.
const MIN_QUOTE: Decimal = Decimal::from_parts(1, 0, 0, false, 10);

// ================================================================================================
// Snapshot
// ================================================================================================

/// One atomic evaluation of a pair's quote constellation.
///
/// Produced by [`evaluate`] and stored on the owning pair; readers always see
/// a complete snapshot, never a half-updated set of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadSnapshot {
    pub has_valid_prices: bool,
    pub market_state: MarketState,
    pub direction: Option<SpreadDirection>,
    /// `(leg1_bid - leg2_ask) / leg1_bid` — profit of selling leg 1, buying leg 2.
    pub short_spread: Decimal,
    /// `(leg1_ask - leg2_bid) / leg1_ask` — profit of buying leg 1, selling leg 2.
    pub long_spread: Decimal,
    /// Whichever of the two spreads is larger in magnitude, sign kept.
    pub theoretical_spread: Decimal,
    /// Spread capturable right now, when the state admits one.
    pub executable_spread: Option<Decimal>,
}

impl Default for SpreadSnapshot {
    fn default() -> Self {
        Self::invalid()
    }
}

impl SpreadSnapshot {
    /// Snapshot for quote constellations that cannot be priced.
    pub fn invalid() -> Self {
        Self {
            has_valid_prices: false,
            market_state: MarketState::Unknown,
            direction: None,
            short_spread: Decimal::ZERO,
            long_spread: Decimal::ZERO,
            theoretical_spread: Decimal::ZERO,
            executable_spread: None,
        }
    }
}

// ================================================================================================
// Evaluator
// ================================================================================================

/// Derives the pair's market state, arbitrage direction and spread metrics
/// from the current quotes of both legs.
///
/// Pure function: no side effects, total over all decimal inputs. Quote sets
/// with a missing side (≤ 1e-10) or an inverted book on either leg yield
/// [`SpreadSnapshot::invalid`].
pub fn evaluate(
    leg1_bid: Decimal,
    leg1_ask: Decimal,
    leg2_bid: Decimal,
    leg2_ask: Decimal,
) -> SpreadSnapshot {
    let valid = [leg1_bid, leg1_ask, leg2_bid, leg2_ask]
        .iter()
        .all(|q| *q > MIN_QUOTE)
        && leg1_bid <= leg1_ask
        && leg2_bid <= leg2_ask;
    if !valid {
        return SpreadSnapshot::invalid();
    }

    let short_spread = (leg1_bid - leg2_ask) / leg1_bid;
    let long_spread = (leg1_ask - leg2_bid) / leg1_ask;
    let theoretical_spread = if short_spread.abs() >= long_spread.abs() {
        short_spread
    } else {
        long_spread
    };

    let (market_state, direction, executable_spread) = if leg1_bid > leg2_ask {
        (
            MarketState::Crossed,
            Some(SpreadDirection::ShortSpread),
            Some(short_spread),
        )
    } else if leg2_bid > leg1_ask {
        (
            MarketState::Crossed,
            Some(SpreadDirection::LongSpread),
            Some(long_spread),
        )
    } else if leg1_ask > leg2_ask && leg2_ask > leg1_bid && leg1_bid > leg2_bid {
        // Strict interleave, leg 1 shifted above leg 2.
        let executable = ((leg1_ask - leg2_ask) / leg1_ask).max((leg1_bid - leg2_bid) / leg1_bid);
        (
            MarketState::LimitOpportunity,
            Some(SpreadDirection::ShortSpread),
            Some(executable),
        )
    } else if leg2_ask > leg1_ask && leg1_ask > leg2_bid && leg2_bid > leg1_bid {
        // Strict interleave, leg 2 shifted above leg 1.
        let executable = ((leg1_ask - leg2_bid) / leg1_ask).min((leg1_bid - leg2_ask) / leg1_bid);
        (
            MarketState::LimitOpportunity,
            Some(SpreadDirection::LongSpread),
            Some(executable),
        )
    } else {
        (MarketState::NoOpportunity, None, None)
    };

    SpreadSnapshot {
        has_valid_prices: true,
        market_state,
        direction,
        short_spread,
        long_spread,
        theoretical_spread,
        executable_spread,
    }
}
