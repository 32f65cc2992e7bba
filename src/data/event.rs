use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::data::{
    cash::Currency,
    domain::{ExecutionId, Market, OrderDirection, OrderId, OrderStatus, Symbol},
};

// ================================================================================================
// Orders
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// An order as seen by the routing and validation layers.
///
/// Quantities are positive magnitudes; the side lives in `direction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub direction: OrderDirection,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time: DateTime<Utc>,
}

impl Order {
    pub fn market(
        id: OrderId,
        symbol: Symbol,
        direction: OrderDirection,
        quantity: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol,
            direction,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            time,
        }
    }

    pub fn limit(
        id: OrderId,
        symbol: Symbol,
        direction: OrderDirection,
        quantity: Decimal,
        limit_price: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol,
            direction,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            time,
        }
    }

    /// Quantity signed by side.
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            OrderDirection::Buy => self.quantity,
            OrderDirection::Sell => -self.quantity,
        }
    }
}

/// Ticket attached to an order, carrying the opaque grid tag.
///
/// Only the tag matters to the core; everything else about the ticket stays
/// with the host's submission plumbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub order_id: OrderId,
    pub tag: String,
}

impl OrderTicket {
    pub fn new(order_id: OrderId, tag: impl Into<String>) -> Self {
        Self {
            order_id,
            tag: tag.into(),
        }
    }
}

// ================================================================================================
// Order Events
// ================================================================================================

/// A lifecycle event for one order, as delivered by the host's brokerage
/// plumbing or synthesized during history replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub status: OrderStatus,
    pub direction: OrderDirection,
    pub fill_price: Decimal,
    /// Positive magnitude of this event's fill; zero for non-fill statuses.
    pub fill_quantity: Decimal,
    pub fee: Decimal,
    pub fee_currency: Option<Currency>,
    pub execution_id: Option<ExecutionId>,
    pub ticket: Option<OrderTicket>,
}

impl OrderEvent {
    /// Fill quantity signed by side.
    pub fn signed_fill_quantity(&self) -> Decimal {
        match self.direction {
            OrderDirection::Buy => self.fill_quantity,
            OrderDirection::Sell => -self.fill_quantity,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.ticket.as_ref().map(|t| t.tag.as_str())
    }
}

// ================================================================================================
// Executions
// ================================================================================================

/// A broker-confirmed fill from the execution-history provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub symbol: Symbol,
    /// Signed: positive bought, negative sold.
    pub quantity: Decimal,
    pub price: Decimal,
    pub time: DateTime<Utc>,
    pub tag: Option<String>,
    pub fee: Decimal,
    pub fee_currency: Option<Currency>,
}

impl ExecutionRecord {
    pub fn direction(&self) -> OrderDirection {
        if self.quantity.is_sign_negative() {
            OrderDirection::Sell
        } else {
            OrderDirection::Buy
        }
    }
}

/// Dedup-cache entry for one processed execution.
///
/// Persisted with the checkpoint so the exactly-once guarantee survives
/// restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: ExecutionId,
    pub time_utc: DateTime<Utc>,
    pub market: Market,
}

impl ExecutionSnapshot {
    pub fn from_event(event: &OrderEvent) -> Option<Self> {
        event.execution_id.clone().map(|execution_id| Self {
            execution_id,
            time_utc: event.time,
            market: event.symbol.market(),
        })
    }
}
