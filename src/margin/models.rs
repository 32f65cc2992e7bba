use rust_decimal::Decimal;

use crate::{
    data::{
        cash::{CashBook, Currency},
        domain::{OrderDirection, SecurityType, Symbol},
        event::Order,
        security::Security,
    },
    margin::tiers::TierSchedule,
};

// ================================================================================================
// Account View
// ================================================================================================

/// One holding, valued for margin arithmetic.
///
/// `price` is expressed in the account currency; the owning account resolves
/// quote-currency conversion before handing valuations to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingValuation {
    pub symbol: Symbol,
    /// Signed: negative is short.
    pub quantity: Decimal,
    pub price: Decimal,
    pub contract_multiplier: Decimal,
    pub base_currency: Currency,
}

impl HoldingValuation {
    /// Signed position value in the account currency.
    pub fn value(&self) -> Decimal {
        self.quantity * self.price * self.contract_multiplier
    }

    pub fn absolute_value(&self) -> Decimal {
        self.value().abs()
    }

    pub fn security_type(&self) -> SecurityType {
        self.symbol.security_type()
    }
}

/// What a buying-power model is allowed to see of an account.
///
/// Models are pure over this view; they never mutate the account, which is
/// what makes buying-power queries side-effect free and repeatable.
pub trait MarginAccount {
    fn cash_book(&self) -> &CashBook;

    /// All holdings with non-zero quantity, valued in the account currency.
    fn holdings(&self) -> Vec<HoldingValuation>;

    fn holding_for(&self, symbol: &Symbol) -> Option<HoldingValuation> {
        self.holdings().into_iter().find(|h| h.symbol == *symbol)
    }
}

// ================================================================================================
// Model Trait
// ================================================================================================

/// Decision returned by order-affordability checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyingPowerDecision {
    pub is_sufficient: bool,
    pub reason: String,
}

impl BuyingPowerDecision {
    pub fn sufficient() -> Self {
        Self {
            is_sufficient: true,
            reason: String::new(),
        }
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self {
            is_sufficient: false,
            reason: reason.into(),
        }
    }
}

/// A per-account buying-power evaluator.
pub trait BuyingPowerModel: Send + Sync {
    /// Leverage granted for a security under this model.
    fn leverage(&self, security: &Security) -> Decimal;

    /// Available buying power for trading `security` in `direction`,
    /// expressed in the account currency.
    fn buying_power(
        &self,
        account: &dyn MarginAccount,
        security: &Security,
        direction: OrderDirection,
    ) -> Decimal;

    /// Whether `order` is affordable. The default compares the order's
    /// notional against the directional buying power.
    fn has_sufficient_buying_power(
        &self,
        account: &dyn MarginAccount,
        security: &Security,
        order: &Order,
    ) -> BuyingPowerDecision {
        let price = order.limit_price.unwrap_or_else(|| security.market_price());
        let notional = order.quantity * price * security.properties.contract_multiplier;
        let available = self.buying_power(account, security, order.direction);
        if notional <= available {
            BuyingPowerDecision::sufficient()
        } else {
            BuyingPowerDecision::insufficient(format!(
                "order notional {notional} exceeds buying power {available}"
            ))
        }
    }
}

/// Internal-feed and base-type securities never take leverage.
pub(crate) fn effective_leverage(security: &Security, configured: Decimal) -> Decimal {
    use crate::data::domain::Market;
    if security.market() == Market::InternalFeed
        || security.security_type() == SecurityType::Base
    {
        Decimal::ONE
    } else {
        configured
    }
}

// ================================================================================================
// Cash Model
// ================================================================================================

/// Unlevered model: buying power is settled positive cash, nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashBuyingPowerModel;

impl BuyingPowerModel for CashBuyingPowerModel {
    fn leverage(&self, _security: &Security) -> Decimal {
        Decimal::ONE
    }

    fn buying_power(
        &self,
        account: &dyn MarginAccount,
        _security: &Security,
        _direction: OrderDirection,
    ) -> Decimal {
        account
            .cash_book()
            .iter()
            .filter(|cash| cash.amount > Decimal::ZERO)
            .map(|cash| cash.value_in_account_currency())
            .sum()
    }
}

// ================================================================================================
// Futures Model
// ================================================================================================

/// Plain leveraged futures model without collateral haircuts.
///
/// Margin balance is the cash book total; initial margin is notional over
/// leverage; maintenance follows the tier ladder. The position-reversal
/// credit matches the unified engine's.
#[derive(Debug, Clone)]
pub struct FuturesMarginModel {
    leverage: Decimal,
    maintenance_tiers: TierSchedule,
}

impl FuturesMarginModel {
    pub fn new(leverage: Decimal, maintenance_tiers: TierSchedule) -> Self {
        Self {
            leverage,
            maintenance_tiers,
        }
    }

    fn initial_margin(&self, account: &dyn MarginAccount) -> Decimal {
        account
            .holdings()
            .iter()
            .filter(|h| h.security_type().is_future())
            .map(|h| h.absolute_value() / self.leverage)
            .sum()
    }
}

impl BuyingPowerModel for FuturesMarginModel {
    fn leverage(&self, security: &Security) -> Decimal {
        effective_leverage(security, self.leverage)
    }

    fn buying_power(
        &self,
        account: &dyn MarginAccount,
        security: &Security,
        direction: OrderDirection,
    ) -> Decimal {
        let margin_balance = account.cash_book().total_value_in_account_currency();
        let mut available = margin_balance - self.initial_margin(account);

        if let Some(holding) = account.holding_for(&security.symbol) {
            let reversing = (direction == OrderDirection::Sell
                && holding.quantity > Decimal::ZERO)
                || (direction == OrderDirection::Buy && holding.quantity < Decimal::ZERO);
            if reversing {
                let value = holding.absolute_value();
                available +=
                    self.maintenance_tiers.maintenance_margin(value) + value / self.leverage;
            }
        }

        (available * self.leverage(security)).max(Decimal::ZERO)
    }
}
