use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

use crate::data::domain::Symbol;

/// A signed holding in one instrument with its weighted average price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub average_price: Decimal,
}

impl Holding {
    pub fn flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Applies a signed fill, re-weighting the average while the position
    /// grows, keeping it while it shrinks, restarting it on a sign flip.
    pub fn apply_fill(&mut self, signed_quantity: Decimal, price: Decimal) {
        let new_quantity = self.quantity + signed_quantity;

        self.average_price = if new_quantity.is_zero() {
            Decimal::ZERO
        } else if self.quantity.is_zero() || self.quantity.signum() != new_quantity.signum() {
            price
        } else if new_quantity.abs() > self.quantity.abs() {
            (self.quantity.abs() * self.average_price + signed_quantity.abs() * price)
                / new_quantity.abs()
        } else {
            self.average_price
        };

        self.quantity = new_quantity;
    }
}
