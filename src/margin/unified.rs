use rust_decimal::Decimal;

use crate::{
    data::{domain::OrderDirection, security::Security},
    error::GridArbResult,
    margin::{
        config::UnifiedMarginConfig,
        models::{BuyingPowerModel, MarginAccount, effective_leverage},
    },
};

/// Margin figures for one account under the unified model, all in the
/// account currency.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginStatus {
    pub margin_balance: Decimal,
    pub initial_margin: Decimal,
    pub maintenance_margin: Decimal,
    /// `margin_balance / maintenance_margin * 100`; `None` when no
    /// maintenance margin is required (infinitely healthy).
    pub risk_ratio: Option<Decimal>,
}

/// Unified cross-margin engine: spot holdings collateralize futures at a
/// haircut, borrowings consume margin, and maintenance follows the tier
/// ladders.
///
/// Every query is a pure function of the account view passed in; the engine
/// holds only validated configuration.
#[derive(Debug, Clone)]
pub struct UnifiedMarginEngine {
    config: UnifiedMarginConfig,
}

impl UnifiedMarginEngine {
    pub fn new(config: UnifiedMarginConfig) -> GridArbResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &UnifiedMarginConfig {
        &self.config
    }

    // ============================================================================================
    // Balances
    // ============================================================================================

    /// Collateral value of the account: cash (positive balances haircut per
    /// currency, debts at full value) plus spot crypto holdings at their
    /// haircut value.
    pub fn total_margin_balance(&self, account: &dyn MarginAccount) -> Decimal {
        let cash_value: Decimal = account
            .cash_book()
            .iter()
            .map(|cash| {
                let value = cash.value_in_account_currency();
                if cash.amount > Decimal::ZERO {
                    value * self.config.discount(&cash.currency)
                } else {
                    value
                }
            })
            .sum();

        let spot_value: Decimal = account
            .holdings()
            .iter()
            .filter(|h| h.security_type().is_spot_crypto())
            .map(|h| h.absolute_value() * self.config.discount(&h.base_currency))
            .sum();

        cash_value + spot_value
    }

    /// Initial margin locked by open futures positions.
    pub fn futures_initial_margin(&self, account: &dyn MarginAccount) -> Decimal {
        account
            .holdings()
            .iter()
            .filter(|h| h.security_type().is_future())
            .map(|h| h.absolute_value() / self.config.leverage)
            .sum()
    }

    /// Initial margin locked by borrowed balances.
    pub fn borrowing_initial_margin(&self, account: &dyn MarginAccount) -> Decimal {
        account
            .cash_book()
            .iter()
            .map(|cash| {
                let borrowed = cash.borrowed_amount() * cash.conversion_rate;
                if borrowed > Decimal::ZERO {
                    borrowed * self.config.borrowing_rate(&cash.currency)
                } else {
                    Decimal::ZERO
                }
            })
            .sum()
    }

    pub fn total_initial_margin(&self, account: &dyn MarginAccount) -> Decimal {
        self.futures_initial_margin(account) + self.borrowing_initial_margin(account)
    }

    // ============================================================================================
    // Maintenance
    // ============================================================================================

    /// Maintenance margin across futures positions, each at its marginal
    /// tier rate.
    pub fn futures_maintenance_margin(&self, account: &dyn MarginAccount) -> Decimal {
        account
            .holdings()
            .iter()
            .filter(|h| h.security_type().is_future())
            .map(|h| self.config.maintenance_tiers.maintenance_margin(h.absolute_value()))
            .sum()
    }

    /// Maintenance margin across borrowed balances. Currencies with a tier
    /// ladder use cumulative bracket arithmetic; the rest pay the flat rate.
    pub fn borrowing_maintenance_margin(&self, account: &dyn MarginAccount) -> Decimal {
        account
            .cash_book()
            .iter()
            .map(|cash| {
                let borrowed = cash.borrowed_amount() * cash.conversion_rate;
                if borrowed <= Decimal::ZERO {
                    return Decimal::ZERO;
                }
                match self.config.borrowing_tiers_for(&cash.currency) {
                    Some(schedule) => schedule.cumulative_margin(borrowed),
                    None => borrowed * self.config.borrowing_rate(&cash.currency),
                }
            })
            .sum()
    }

    pub fn total_maintenance_margin(&self, account: &dyn MarginAccount) -> Decimal {
        self.futures_maintenance_margin(account) + self.borrowing_maintenance_margin(account)
    }

    /// `margin balance / maintenance margin * 100`, `None` when nothing is
    /// at risk.
    pub fn account_risk_ratio(&self, account: &dyn MarginAccount) -> Option<Decimal> {
        let maintenance = self.total_maintenance_margin(account);
        if maintenance > Decimal::ZERO {
            Some(self.total_margin_balance(account) / maintenance * Decimal::ONE_HUNDRED)
        } else {
            None
        }
    }

    pub fn account_margin_status(&self, account: &dyn MarginAccount) -> MarginStatus {
        MarginStatus {
            margin_balance: self.total_margin_balance(account),
            initial_margin: self.total_initial_margin(account),
            maintenance_margin: self.total_maintenance_margin(account),
            risk_ratio: self.account_risk_ratio(account),
        }
    }
}

impl BuyingPowerModel for UnifiedMarginEngine {
    fn leverage(&self, security: &Security) -> Decimal {
        effective_leverage(security, self.config.leverage)
    }

    fn buying_power(
        &self,
        account: &dyn MarginAccount,
        security: &Security,
        direction: OrderDirection,
    ) -> Decimal {
        let margin_balance = self.total_margin_balance(account);
        let mut available = margin_balance - self.total_initial_margin(account);

        // Orders that reverse the current holding free its margin first.
        if let Some(holding) = account.holding_for(&security.symbol) {
            let reversing = (direction == OrderDirection::Sell
                && holding.quantity > Decimal::ZERO)
                || (direction == OrderDirection::Buy && holding.quantity < Decimal::ZERO);
            if reversing {
                let value = holding.absolute_value();
                available += self.config.maintenance_tiers.maintenance_margin(value)
                    + value / self.config.leverage;
            }
        }

        available -= margin_balance * self.config.required_free_buying_power_pct;

        (available * self.leverage(security)).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{
        cash::{Cash, CashBook, Currency},
        domain::{Market, SecurityType, Symbol},
    };
    use crate::margin::models::HoldingValuation;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct TestAccount {
        cash: CashBook,
        holdings: Vec<HoldingValuation>,
    }

    impl MarginAccount for TestAccount {
        fn cash_book(&self) -> &CashBook {
            &self.cash
        }

        fn holdings(&self) -> Vec<HoldingValuation> {
            self.holdings.clone()
        }
    }

    fn spot_symbol() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
    }

    fn future_symbol() -> Symbol {
        Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Binance).unwrap()
    }

    fn future_security() -> Security {
        Security::new(future_symbol(), "BTC", "USDT").with_quotes(
            dec("49990"),
            dec("50010"),
            dec("50000"),
        )
    }

    fn engine() -> UnifiedMarginEngine {
        UnifiedMarginEngine::new(UnifiedMarginConfig::default()).unwrap()
    }

    fn holding(symbol: Symbol, quantity: &str, price: &str, base: &str) -> HoldingValuation {
        HoldingValuation {
            symbol,
            quantity: dec(quantity),
            price: dec(price),
            contract_multiplier: Decimal::ONE,
            base_currency: Currency::new(base),
        }
    }

    fn usdt_account(amount: &str) -> TestAccount {
        let mut cash = CashBook::new("USDT");
        cash.apply_delta(&Currency::new("USDT"), dec(amount));
        TestAccount {
            cash,
            holdings: vec![],
        }
    }

    #[test]
    fn spot_collateral_is_discounted() {
        // Cash 10k USDT + 1 spot BTC at 50k with a 5% haircut.
        let mut account = usdt_account("10000");
        account
            .holdings
            .push(holding(spot_symbol(), "1", "50000", "BTC"));

        let engine = engine();
        assert_eq!(engine.total_margin_balance(&account), dec("57500"));
        assert_eq!(engine.total_initial_margin(&account), Decimal::ZERO);

        // Flat futures book: full balance levered.
        let bp = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
        assert_eq!(bp, dec("287500"));
    }

    #[test]
    fn position_reversal_credit() {
        // Cash 50k, long 2 BTC futures at 50k, leverage 5.
        let mut account = usdt_account("50000");
        account
            .holdings
            .push(holding(future_symbol(), "2", "50000", "BTC"));

        let engine = engine();
        assert_eq!(engine.futures_initial_margin(&account), dec("20000"));
        assert_eq!(engine.futures_maintenance_margin(&account), dec("2000"));

        let sell = engine.buying_power(&account, &future_security(), OrderDirection::Sell);
        assert_eq!(sell, dec("260000"));

        let buy = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
        assert_eq!(buy, dec("150000"));
    }

    #[test]
    fn flat_portfolio_buying_power_is_direction_symmetric() {
        let account = usdt_account("10000");
        let engine = engine();
        let security = future_security();

        let buy = engine.buying_power(&account, &security, OrderDirection::Buy);
        let sell = engine.buying_power(&account, &security, OrderDirection::Sell);
        assert_eq!(buy, sell);
        assert_eq!(buy, dec("50000"));
    }

    #[test]
    fn reserved_buffer_reduces_buying_power() {
        let mut config = UnifiedMarginConfig::default();
        config.required_free_buying_power_pct = dec("0.1");
        let engine = UnifiedMarginEngine::new(config).unwrap();

        let account = usdt_account("10000");
        let bp = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
        // (10000 - 1000) * 5
        assert_eq!(bp, dec("45000"));
    }

    #[test]
    fn borrowed_cash_counts_against_margin() {
        // 100k USDT cash, 10k borrowed BNB (rate 1.0 to USDT for simplicity).
        let mut account = usdt_account("100000");
        account
            .cash
            .set(Cash::new("BNB", dec("-10000"), Decimal::ONE));

        let engine = engine();
        // Debt at full value: 100k - 10k.
        assert_eq!(engine.total_margin_balance(&account), dec("90000"));
        // Flat rate 0.30 for BNB (unmetered currency fallback).
        assert_eq!(engine.borrowing_initial_margin(&account), dec("3000"));
        assert_eq!(engine.borrowing_maintenance_margin(&account), dec("3000"));
    }

    #[test]
    fn usdt_borrowings_use_the_cumulative_ladder() {
        let mut account = usdt_account("0");
        account
            .cash
            .set(Cash::new("USDT", dec("-60000"), Decimal::ONE));

        let engine = engine();
        // 50k * 0.01 + 10k * 0.02
        assert_eq!(engine.borrowing_maintenance_margin(&account), dec("700"));
        // Initial margin uses the flat USDT rate 0.25.
        assert_eq!(engine.borrowing_initial_margin(&account), dec("15000"));
    }

    #[test]
    fn risk_ratio_is_percentage_or_none() {
        let engine = engine();

        let account = usdt_account("10000");
        assert_eq!(engine.account_risk_ratio(&account), None);

        let mut account = usdt_account("10000");
        account
            .holdings
            .push(holding(future_symbol(), "1", "40000", "BTC"));
        // Maintenance: 40k * 0.005 = 200 -> ratio 10000/200*100 = 5000.
        let status = engine.account_margin_status(&account);
        assert_eq!(status.maintenance_margin, dec("200"));
        assert_eq!(status.risk_ratio, Some(dec("5000")));
    }

    #[test]
    fn buying_power_never_goes_negative() {
        let mut account = usdt_account("1000");
        account
            .holdings
            .push(holding(future_symbol(), "2", "50000", "BTC"));

        let engine = engine();
        let bp = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
        assert_eq!(bp, Decimal::ZERO);
    }
}
