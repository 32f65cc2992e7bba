use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::{
    data::{
        cash::{Cash, CashBook, Currency},
        domain::{ExecutionId, OrderId, Symbol},
        event::{Order, OrderEvent},
        security::{Security, SecurityRegistry},
    },
    margin::models::{BuyingPowerDecision, BuyingPowerModel, HoldingValuation, MarginAccount},
    portfolio::holdings::Holding,
};

// ================================================================================================
// Transaction Log
// ================================================================================================

/// One applied fill, kept for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRecord {
    pub order_id: OrderId,
    pub execution_id: Option<ExecutionId>,
    pub symbol: Symbol,
    /// Signed.
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
    pub applied_at: DateTime<Utc>,
}

/// Order-id allocation and the append-only fill audit trail of one
/// sub-account.
#[derive(Debug, Default)]
pub struct TransactionLog {
    next_order_id: AtomicI64,
    fills: Vec<FillRecord>,
}

impl TransactionLog {
    /// Allocates the next local order id. Atomic; safe under concurrent
    /// submission paths.
    pub fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn record(&mut self, fill: FillRecord) {
        self.fills.push(fill);
    }

    pub fn fills(&self) -> &[FillRecord] {
        &self.fills
    }
}

// ================================================================================================
// Sub-Account
// ================================================================================================

/// One venue-scoped account: its own cash book, its own holdings, a security
/// registry scoped to the symbols routed to it, and a buying-power model.
///
/// Sub-accounts are only ever written through the aggregating portfolio's
/// routed fill path, which is what keeps holdings isolated per account.
pub struct SubAccount {
    name: String,
    cash_book: CashBook,
    securities: SecurityRegistry,
    holdings: HashMap<Symbol, Holding>,
    transactions: TransactionLog,
    model: Arc<dyn BuyingPowerModel>,
}

impl SubAccount {
    pub fn new(
        name: impl Into<String>,
        account_currency: impl Into<Currency>,
        model: Arc<dyn BuyingPowerModel>,
    ) -> Self {
        Self {
            name: name.into(),
            cash_book: CashBook::new(account_currency),
            securities: SecurityRegistry::new(),
            holdings: HashMap::new(),
            transactions: TransactionLog::default(),
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn securities(&self) -> &SecurityRegistry {
        &self.securities
    }

    pub fn transactions(&self) -> &TransactionLog {
        &self.transactions
    }

    pub fn model(&self) -> &Arc<dyn BuyingPowerModel> {
        &self.model
    }

    /// Registers an instrument routed to this account.
    pub fn register_security(&mut self, security: Security) {
        self.securities.upsert(security);
    }

    pub fn deposit(&mut self, currency: &Currency, amount: Decimal) {
        self.cash_book.apply_delta(currency, amount);
    }

    pub fn set_cash(&mut self, cash: Cash) {
        self.cash_book.set(cash);
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    /// Signed position in `symbol`, zero when flat or unknown.
    pub fn position(&self, symbol: &Symbol) -> Decimal {
        self.holdings
            .get(symbol)
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Applies a fill event: updates the holding, debits/credits the quote
    /// currency, charges the fee. Fills for unregistered symbols are dropped
    /// with a warning; routing should have prevented them.
    pub fn process_fill(&mut self, event: &OrderEvent, applied_at: DateTime<Utc>) {
        let Some(security) = self.securities.get(&event.symbol) else {
            warn!(
                account = %self.name,
                symbol = %event.symbol,
                "Fill for unregistered security dropped"
            );
            return;
        };

        let signed = event.signed_fill_quantity();
        if signed.is_zero() && event.fee.is_zero() {
            return;
        }

        if !signed.is_zero() {
            let holding = self
                .holdings
                .entry(event.symbol.clone())
                .or_insert_with(|| Holding::flat(event.symbol.clone()));
            holding.apply_fill(signed, event.fill_price);
            if holding.is_flat() {
                self.holdings.remove(&event.symbol);
            }

            // Spot fills exchange notional against the quote currency.
            // Derivative fills move margin, not notional; settlement is the
            // venue's concern and reaches us as separate cash events.
            if !security.security_type().is_future() {
                let notional =
                    signed * event.fill_price * security.properties.contract_multiplier;
                self.cash_book
                    .apply_delta(&security.quote_currency, -notional);
            }
        }

        if !event.fee.is_zero() {
            let fee_currency = event
                .fee_currency
                .clone()
                .unwrap_or_else(|| security.quote_currency.clone());
            self.cash_book.apply_delta(&fee_currency, -event.fee);
        }

        self.transactions.record(FillRecord {
            order_id: event.order_id,
            execution_id: event.execution_id.clone(),
            symbol: event.symbol.clone(),
            quantity: signed,
            price: event.fill_price,
            fee: event.fee,
            time: event.time,
            applied_at,
        });
    }

    /// Affordability check through this account's buying-power model.
    pub fn buying_power_for_order(&self, order: &Order) -> BuyingPowerDecision {
        let Some(security) = self.securities.get(&order.symbol) else {
            return BuyingPowerDecision::insufficient(format!(
                "security '{}' not registered with account '{}'",
                order.symbol, self.name
            ));
        };
        self.model
            .has_sufficient_buying_power(self, &security, order)
    }

    /// Conversion rate from `currency` into the account currency, defaulting
    /// to 1 for the account currency itself and 0 for unknowns.
    fn conversion_rate(&self, currency: &Currency) -> Decimal {
        if currency == self.cash_book.account_currency() {
            return Decimal::ONE;
        }
        self.cash_book
            .get(currency)
            .map(|cash| cash.conversion_rate)
            .unwrap_or(Decimal::ZERO)
    }
}

impl MarginAccount for SubAccount {
    fn cash_book(&self) -> &CashBook {
        &self.cash_book
    }

    fn holdings(&self) -> Vec<HoldingValuation> {
        self.holdings
            .values()
            .filter(|holding| !holding.is_flat())
            .filter_map(|holding| {
                let security = self.securities.get(&holding.symbol)?;
                let price = security.market_price()
                    * self.conversion_rate(&security.quote_currency);
                Some(HoldingValuation {
                    symbol: holding.symbol.clone(),
                    quantity: holding.quantity,
                    price,
                    contract_multiplier: security.properties.contract_multiplier,
                    base_currency: security.base_currency.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        data::domain::{Market, OrderDirection, OrderStatus, SecurityType},
        margin::models::CashBuyingPowerModel,
    };

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn spot() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
    }

    fn spot_security() -> Security {
        Security::new(spot(), "BTC", "USDT").with_quotes(dec("49990"), dec("50010"), dec("50000"))
    }

    fn account() -> SubAccount {
        let mut account = SubAccount::new("spot", "USDT", Arc::new(CashBuyingPowerModel));
        account.register_security(spot_security());
        account.deposit(&Currency::new("USDT"), dec("100000"));
        account
    }

    fn fill(direction: OrderDirection, quantity: &str, price: &str, fee: &str) -> OrderEvent {
        OrderEvent {
            order_id: OrderId(1),
            symbol: spot(),
            time: ts("2026-04-01T00:00:00Z"),
            status: OrderStatus::Filled,
            direction,
            fill_price: dec(price),
            fill_quantity: dec(quantity),
            fee: dec(fee),
            fee_currency: Some(Currency::new("USDT")),
            execution_id: Some(ExecutionId::from("e-1")),
            ticket: None,
        }
    }

    #[test]
    fn fills_update_holdings_and_cash() {
        let mut account = account();
        account.process_fill(
            &fill(OrderDirection::Buy, "1", "50000", "10"),
            ts("2026-04-01T00:00:01Z"),
        );

        assert_eq!(account.position(&spot()), dec("1"));
        assert_eq!(account.holding(&spot()).unwrap().average_price, dec("50000"));
        let usdt = account
            .cash_book()
            .get(&Currency::new("USDT"))
            .unwrap()
            .amount;
        assert_eq!(usdt, dec("49990"));
        assert_eq!(account.transactions().fills().len(), 1);
    }

    #[test]
    fn selling_to_flat_drops_the_holding() {
        let mut account = account();
        account.process_fill(
            &fill(OrderDirection::Buy, "1", "50000", "0"),
            ts("2026-04-01T00:00:01Z"),
        );
        account.process_fill(
            &fill(OrderDirection::Sell, "1", "51000", "0"),
            ts("2026-04-01T00:00:02Z"),
        );

        assert!(account.holding(&spot()).is_none());
        let usdt = account
            .cash_book()
            .get(&Currency::new("USDT"))
            .unwrap()
            .amount;
        assert_eq!(usdt, dec("101000"));
    }

    #[test]
    fn unregistered_symbol_fills_are_dropped() {
        let mut account = account();
        let mut event = fill(OrderDirection::Buy, "1", "2000", "0");
        event.symbol = Symbol::new("ETHUSDT", SecurityType::Crypto, Market::Binance).unwrap();

        account.process_fill(&event, ts("2026-04-01T00:00:01Z"));
        assert!(account.transactions().fills().is_empty());
        assert_eq!(
            account
                .cash_book()
                .get(&Currency::new("USDT"))
                .unwrap()
                .amount,
            dec("100000")
        );
    }

    #[test]
    fn margin_view_values_holdings_at_market() {
        let mut account = account();
        account.process_fill(
            &fill(OrderDirection::Buy, "2", "48000", "0"),
            ts("2026-04-01T00:00:01Z"),
        );

        let holdings = account.holdings();
        assert_eq!(holdings.len(), 1);
        let valuation = &holdings[0];
        assert_eq!(valuation.quantity, dec("2"));
        // Valued at market (last = 50000), not at cost.
        assert_eq!(valuation.price, dec("50000"));
        assert_eq!(valuation.base_currency, Currency::new("BTC"));
    }

    #[test]
    fn order_ids_are_sequential() {
        let account = account();
        assert_eq!(account.transactions().next_order_id(), OrderId(1));
        assert_eq!(account.transactions().next_order_id(), OrderId(2));
    }

    #[test]
    fn buying_power_rejects_unregistered_securities() {
        let account = account();
        let order = Order::market(
            OrderId(9),
            Symbol::new("ETHUSDT", SecurityType::Crypto, Market::Binance).unwrap(),
            OrderDirection::Buy,
            dec("1"),
            ts("2026-04-01T00:00:00Z"),
        );
        let decision = account.buying_power_for_order(&order);
        assert!(!decision.is_sufficient);
        assert!(decision.reason.contains("not registered"));
    }
}
