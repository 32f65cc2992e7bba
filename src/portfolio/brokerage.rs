use std::{collections::HashMap, fmt, sync::Arc};

use rust_decimal::Decimal;

use crate::{
    data::{
        domain::SecurityType,
        event::{Order, OrderType},
        security::Security,
    },
    margin::models::effective_leverage,
};

// ================================================================================================
// Warnings
// ================================================================================================

/// Structured rejection for order validation.
///
/// Not an error type: a rejected order leaves all state untouched, and the
/// message is meant for the submitting host, not a `?` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerageWarning {
    pub code: String,
    pub text: String,
}

impl BrokerageWarning {
    pub fn new(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for BrokerageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning:{} {}", self.code, self.text)
    }
}

// ================================================================================================
// Brokerage Model
// ================================================================================================

/// Per-venue policy: leverage granted and which orders are acceptable.
pub trait BrokerageModel: Send + Sync {
    fn leverage(&self, security: &Security) -> Decimal;

    fn can_submit_order(&self, security: &Security, order: &Order)
    -> Result<(), BrokerageWarning>;

    /// Update validation defaults to the submission rules.
    fn can_update_order(
        &self,
        security: &Security,
        order: &Order,
    ) -> Result<(), BrokerageWarning> {
        self.can_submit_order(security, order)
    }
}

/// Generic venue policy: leverage for levered instruments, lot-size
/// divisibility, and a supported security-type and order-type whitelist.
#[derive(Debug, Clone)]
pub struct DefaultBrokerageModel {
    leverage: Decimal,
    supported_security_types: Vec<SecurityType>,
    supported_order_types: Vec<OrderType>,
}

impl Default for DefaultBrokerageModel {
    fn default() -> Self {
        Self {
            leverage: Decimal::new(5, 0),
            supported_security_types: vec![
                SecurityType::Crypto,
                SecurityType::CryptoFuture,
                SecurityType::Future,
                SecurityType::Equity,
            ],
            supported_order_types: vec![OrderType::Market, OrderType::Limit],
        }
    }
}

impl DefaultBrokerageModel {
    pub fn new(leverage: Decimal) -> Self {
        Self {
            leverage,
            ..Self::default()
        }
    }

    pub fn with_security_types(mut self, types: Vec<SecurityType>) -> Self {
        self.supported_security_types = types;
        self
    }
}

impl BrokerageModel for DefaultBrokerageModel {
    fn leverage(&self, security: &Security) -> Decimal {
        effective_leverage(security, self.leverage)
    }

    fn can_submit_order(
        &self,
        security: &Security,
        order: &Order,
    ) -> Result<(), BrokerageWarning> {
        if !self
            .supported_security_types
            .contains(&security.security_type())
        {
            return Err(BrokerageWarning::new(
                "UnsupportedSecurityType",
                format!(
                    "security type {} is not supported by this brokerage model",
                    security.security_type()
                ),
            ));
        }

        if !self.supported_order_types.contains(&order.order_type) {
            return Err(BrokerageWarning::new(
                "UnsupportedOrderType",
                format!("order type {} is not supported", order.order_type),
            ));
        }

        if order.quantity <= Decimal::ZERO {
            return Err(BrokerageWarning::new(
                "InvalidQuantity",
                format!("order quantity {} must be positive", order.quantity),
            ));
        }

        let lot_size = security.properties.lot_size;
        if !lot_size.is_zero() && !(order.quantity % lot_size).is_zero() {
            return Err(BrokerageWarning::new(
                "InvalidLotSize",
                format!(
                    "quantity {} is not a multiple of lot size {lot_size}",
                    order.quantity
                ),
            ));
        }

        Ok(())
    }
}

// ================================================================================================
// Routed Model
// ================================================================================================

/// Delegates per-security policy to the model registered for the security's
/// market (case-insensitive), falling back to a default model.
pub struct RoutedBrokerageModel {
    models: HashMap<String, Arc<dyn BrokerageModel>>,
    default_model: Arc<dyn BrokerageModel>,
}

impl RoutedBrokerageModel {
    pub fn new(default_model: Arc<dyn BrokerageModel>) -> Self {
        Self {
            models: HashMap::new(),
            default_model,
        }
    }

    pub fn register(
        mut self,
        market: impl AsRef<str>,
        model: Arc<dyn BrokerageModel>,
    ) -> Self {
        self.models
            .insert(market.as_ref().to_lowercase(), model);
        self
    }

    fn model_for(&self, security: &Security) -> &Arc<dyn BrokerageModel> {
        self.models
            .get(&security.market().to_string().to_lowercase())
            .unwrap_or(&self.default_model)
    }
}

impl BrokerageModel for RoutedBrokerageModel {
    fn leverage(&self, security: &Security) -> Decimal {
        self.model_for(security).leverage(security)
    }

    fn can_submit_order(
        &self,
        security: &Security,
        order: &Order,
    ) -> Result<(), BrokerageWarning> {
        self.model_for(security).can_submit_order(security, order)
    }

    fn can_update_order(
        &self,
        security: &Security,
        order: &Order,
    ) -> Result<(), BrokerageWarning> {
        self.model_for(security).can_update_order(security, order)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use crate::data::{
        domain::{Market, OrderDirection, OrderId, Symbol},
        security::SymbolProperties,
    };

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-04-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn security() -> Security {
        Security::new(
            Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Binance).unwrap(),
            "BTC",
            "USDT",
        )
        .with_properties(SymbolProperties {
            lot_size: dec("0.001"),
            contract_multiplier: Decimal::ONE,
        })
    }

    fn order(quantity: &str) -> Order {
        Order::market(
            OrderId(1),
            security().symbol,
            OrderDirection::Buy,
            dec(quantity),
            ts(),
        )
    }

    #[test]
    fn lot_size_violations_are_rejected_with_a_code() {
        let model = DefaultBrokerageModel::default();
        assert!(model.can_submit_order(&security(), &order("0.005")).is_ok());

        let warning = model
            .can_submit_order(&security(), &order("0.0015"))
            .unwrap_err();
        assert_eq!(warning.code, "InvalidLotSize");
    }

    #[test]
    fn unsupported_security_types_are_rejected() {
        let model = DefaultBrokerageModel::default()
            .with_security_types(vec![SecurityType::Crypto]);
        let warning = model
            .can_submit_order(&security(), &order("0.005"))
            .unwrap_err();
        assert_eq!(warning.code, "UnsupportedSecurityType");
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let model = DefaultBrokerageModel::default();
        let warning = model.can_submit_order(&security(), &order("0")).unwrap_err();
        assert_eq!(warning.code, "InvalidQuantity");
    }

    #[test]
    fn routed_model_delegates_by_market_with_default_fallback() {
        let strict: Arc<dyn BrokerageModel> = Arc::new(
            DefaultBrokerageModel::default().with_security_types(vec![SecurityType::Crypto]),
        );
        let permissive: Arc<dyn BrokerageModel> = Arc::new(DefaultBrokerageModel::default());

        let routed = RoutedBrokerageModel::new(permissive).register("BINANCE", strict);

        // binance (case-insensitive hit) -> strict model rejects the future.
        let warning = routed
            .can_submit_order(&security(), &order("0.005"))
            .unwrap_err();
        assert_eq!(warning.code, "UnsupportedSecurityType");

        // Other market -> default model accepts.
        let bybit_security = Security::new(
            Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Bybit).unwrap(),
            "BTC",
            "USDT",
        )
        .with_properties(SymbolProperties {
            lot_size: dec("0.001"),
            contract_multiplier: Decimal::ONE,
        });
        let bybit_order = Order::market(
            OrderId(2),
            bybit_security.symbol.clone(),
            OrderDirection::Buy,
            dec("0.005"),
            ts(),
        );
        assert!(routed.can_submit_order(&bybit_security, &bybit_order).is_ok());
    }
}
