use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    data::{domain::Symbol, event::OrderEvent},
    grid::level::GridLevelPair,
};

/// A multi-leg position at one grid rung.
///
/// Quantities are signed and must stay direction-consistent with the level
/// pair: a LONG_SPREAD position holds leg 1 >= 0 and leg 2 <= 0, a
/// SHORT_SPREAD position the mirror. Both legs at zero means the position is
/// not invested and may be dropped by its owning manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPosition {
    pub leg1_symbol: Symbol,
    pub leg2_symbol: Symbol,
    pub level_pair: GridLevelPair,
    pub leg1_quantity: Decimal,
    pub leg2_quantity: Decimal,
    pub leg1_avg_cost: Decimal,
    pub leg2_avg_cost: Decimal,
    pub first_fill_time: DateTime<Utc>,
}

impl GridPosition {
    pub fn new(
        leg1_symbol: Symbol,
        leg2_symbol: Symbol,
        level_pair: GridLevelPair,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            leg1_symbol,
            leg2_symbol,
            level_pair,
            leg1_quantity: Decimal::ZERO,
            leg2_quantity: Decimal::ZERO,
            leg1_avg_cost: Decimal::ZERO,
            leg2_avg_cost: Decimal::ZERO,
            first_fill_time: time,
        }
    }

    /// Identity under which the owning pair stores this position.
    pub fn tag_key(&self) -> String {
        self.level_pair.tag_key()
    }

    /// False exactly when both legs are flat.
    pub fn invested(&self) -> bool {
        !(self.leg1_quantity.is_zero() && self.leg2_quantity.is_zero())
    }

    /// Signed quantity this position holds in `symbol`, zero for strangers.
    pub fn quantity_for(&self, symbol: &Symbol) -> Decimal {
        if *symbol == self.leg1_symbol {
            self.leg1_quantity
        } else if *symbol == self.leg2_symbol {
            self.leg2_quantity
        } else {
            Decimal::ZERO
        }
    }

    /// Applies a fill event to the leg matching the event's symbol.
    ///
    /// Maintains the signed quantity and the weighted average cost: the
    /// average re-weights while the position grows, stays put while it
    /// shrinks, and resets to the fill price when the sign flips. Events for
    /// symbols that match neither leg are ignored with a warning; they
    /// indicate a mis-tagged order upstream.
    pub fn process_fill(&mut self, event: &OrderEvent) {
        let signed = event.signed_fill_quantity();
        if signed.is_zero() {
            return;
        }

        if event.symbol == self.leg1_symbol {
            let (quantity, avg_cost) = apply_fill(
                self.leg1_quantity,
                self.leg1_avg_cost,
                signed,
                event.fill_price,
            );
            self.leg1_quantity = quantity;
            self.leg1_avg_cost = avg_cost;
        } else if event.symbol == self.leg2_symbol {
            let (quantity, avg_cost) = apply_fill(
                self.leg2_quantity,
                self.leg2_avg_cost,
                signed,
                event.fill_price,
            );
            self.leg2_quantity = quantity;
            self.leg2_avg_cost = avg_cost;
        } else {
            warn!(
                symbol = %event.symbol,
                leg1 = %self.leg1_symbol,
                leg2 = %self.leg2_symbol,
                "Fill event symbol matches neither leg"
            );
        }
    }
}

/// Core quantity/average-cost transition for one leg.
fn apply_fill(
    quantity: Decimal,
    avg_cost: Decimal,
    signed_fill: Decimal,
    fill_price: Decimal,
) -> (Decimal, Decimal) {
    let new_quantity = quantity + signed_fill;

    let new_avg_cost = if new_quantity.is_zero() {
        Decimal::ZERO
    } else if quantity.is_zero() || quantity.signum() != new_quantity.signum() {
        // Opening fresh or flipping through zero: cost basis restarts.
        fill_price
    } else if new_quantity.abs() > quantity.abs() {
        (quantity.abs() * avg_cost + signed_fill.abs() * fill_price) / new_quantity.abs()
    } else {
        // Reducing: basis unchanged.
        avg_cost
    };

    (new_quantity, new_avg_cost)
}
