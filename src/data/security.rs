use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{
    cash::Currency,
    domain::{Market, SecurityType, Symbol},
};

// ================================================================================================
// Symbol Properties
// ================================================================================================

/// Static instrument parameters supplied by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolProperties {
    /// Smallest tradable quantity step. Order quantities must be an exact
    /// multiple of this.
    pub lot_size: Decimal,
    /// Contract value per unit of quantity (1 for spot).
    pub contract_multiplier: Decimal,
}

impl Default for SymbolProperties {
    fn default() -> Self {
        Self {
            lot_size: Decimal::new(1, 8),
            contract_multiplier: Decimal::ONE,
        }
    }
}

// ================================================================================================
// Security
// ================================================================================================

/// Read-only bundle of everything the core observes about one instrument.
///
/// Quotes are updated externally through the registry; the core never writes
/// prices on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub properties: SymbolProperties,
    pub base_currency: Currency,
    pub quote_currency: Currency,
}

impl Security {
    pub fn new(
        symbol: Symbol,
        base_currency: impl Into<Currency>,
        quote_currency: impl Into<Currency>,
    ) -> Self {
        Self {
            symbol,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
            last: Decimal::ZERO,
            properties: SymbolProperties::default(),
            base_currency: base_currency.into(),
            quote_currency: quote_currency.into(),
        }
    }

    pub fn with_properties(mut self, properties: SymbolProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_quotes(mut self, bid: Decimal, ask: Decimal, last: Decimal) -> Self {
        self.bid = bid;
        self.ask = ask;
        self.last = last;
        self
    }

    pub fn security_type(&self) -> SecurityType {
        self.symbol.security_type()
    }

    pub fn market(&self) -> Market {
        self.symbol.market()
    }

    /// Best available reference price: last trade, falling back to the
    /// mid-quote, falling back to whichever side exists.
    pub fn market_price(&self) -> Decimal {
        if !self.last.is_zero() {
            return self.last;
        }
        let two = Decimal::TWO;
        match (self.bid.is_zero(), self.ask.is_zero()) {
            (false, false) => (self.bid + self.ask) / two,
            (false, true) => self.bid,
            (true, false) => self.ask,
            (true, true) => Decimal::ZERO,
        }
    }
}

// ================================================================================================
// Security Registry
// ================================================================================================

/// Shared, externally fed catalogue of known instruments and their quotes.
///
/// The pair manager checks pair legs against this registry, and sub-accounts
/// hold one scoped to the symbols routed to them. Cheap to clone: state is
/// behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SecurityRegistry {
    inner: Arc<RwLock<HashMap<Symbol, Security>>>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an instrument.
    pub fn upsert(&self, security: Security) {
        self.inner
            .write()
            .unwrap()
            .insert(security.symbol.clone(), security);
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.inner.read().unwrap().contains_key(symbol)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Security> {
        self.inner.read().unwrap().get(symbol).cloned()
    }

    /// Applies a quote tick. Unknown symbols are ignored; quote flow for
    /// instruments the host never registered is not an error.
    pub fn update_quotes(&self, symbol: &Symbol, bid: Decimal, ask: Decimal, last: Decimal) {
        if let Some(security) = self.inner.write().unwrap().get_mut(symbol) {
            security.bid = bid;
            security.ask = ask;
            security.last = last;
        }
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    pub fn securities(&self) -> Vec<Security> {
        self.inner.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn btc_spot() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
    }

    #[test]
    fn market_price_prefers_last_then_mid() {
        let mut sec = Security::new(btc_spot(), "BTC", "USDT");
        assert_eq!(sec.market_price(), Decimal::ZERO);

        sec.bid = dec("100");
        sec.ask = dec("102");
        assert_eq!(sec.market_price(), dec("101"));

        sec.last = dec("99");
        assert_eq!(sec.market_price(), dec("99"));
    }

    #[test]
    fn registry_updates_quotes_for_known_symbols_only() {
        let registry = SecurityRegistry::new();
        registry.upsert(Security::new(btc_spot(), "BTC", "USDT"));

        registry.update_quotes(&btc_spot(), dec("100"), dec("101"), dec("100.5"));
        assert_eq!(registry.get(&btc_spot()).unwrap().bid, dec("100"));

        let unknown = Symbol::new("ETHUSDT", SecurityType::Crypto, Market::Binance).unwrap();
        registry.update_quotes(&unknown, dec("1"), dec("2"), dec("1.5"));
        assert!(registry.get(&unknown).is_none());
    }
}
