use std::collections::HashMap;

use crate::data::domain::{SecurityType, Symbol};

/// Chooses the sub-account an instrument's orders and fills belong to.
///
/// Routers only name an account; whether the name resolves is the
/// portfolio's concern, so a misconfigured route surfaces as a rejected
/// order rather than a panic.
pub trait OrderRouter: Send + Sync {
    fn route(&self, symbol: &Symbol) -> &str;
}

/// Routes specific symbols to specific accounts, everything else to the
/// default.
#[derive(Debug, Clone)]
pub struct SymbolBasedRouter {
    routes: HashMap<Symbol, String>,
    default_account: String,
}

impl SymbolBasedRouter {
    pub fn new(routes: HashMap<Symbol, String>, default_account: impl Into<String>) -> Self {
        Self {
            routes,
            default_account: default_account.into(),
        }
    }
}

impl OrderRouter for SymbolBasedRouter {
    fn route(&self, symbol: &Symbol) -> &str {
        self.routes
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(&self.default_account)
    }
}

/// Routes by security type: e.g. spot to the exchange account, futures to
/// the derivatives account.
#[derive(Debug, Clone)]
pub struct SecurityTypeRouter {
    routes: HashMap<SecurityType, String>,
    default_account: String,
}

impl SecurityTypeRouter {
    pub fn new(routes: HashMap<SecurityType, String>, default_account: impl Into<String>) -> Self {
        Self {
            routes,
            default_account: default_account.into(),
        }
    }
}

impl OrderRouter for SecurityTypeRouter {
    fn route(&self, symbol: &Symbol) -> &str {
        self.routes
            .get(&symbol.security_type())
            .map(String::as_str)
            .unwrap_or(&self.default_account)
    }
}

#[cfg(test)]
mod tests {
    use crate::data::domain::Market;

    use super::*;

    fn spot() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
    }

    fn future() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Binance).unwrap()
    }

    #[test]
    fn symbol_router_falls_back_to_default() {
        let router = SymbolBasedRouter::new(
            HashMap::from([(spot(), "spot-main".to_string())]),
            "catch-all",
        );
        assert_eq!(router.route(&spot()), "spot-main");
        assert_eq!(router.route(&future()), "catch-all");
    }

    #[test]
    fn security_type_router_routes_by_kind() {
        let router = SecurityTypeRouter::new(
            HashMap::from([
                (SecurityType::Crypto, "spot".to_string()),
                (SecurityType::CryptoFuture, "derivatives".to_string()),
            ]),
            "spot",
        );
        assert_eq!(router.route(&spot()), "spot");
        assert_eq!(router.route(&future()), "derivatives");

        let equity = Symbol::new("AAPL", SecurityType::Equity, Market::Kraken).unwrap();
        assert_eq!(router.route(&equity), "spot");
    }
}
