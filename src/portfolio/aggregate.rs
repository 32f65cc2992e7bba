use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use tracing::warn;

use crate::{
    clock::Clock,
    data::{
        cash::{Cash, CashBook, Currency},
        domain::{SecurityType, Symbol},
        event::{Order, OrderEvent},
        security::Security,
    },
    error::{ConfigError, DataError, GridArbResult},
    margin::models::{BuyingPowerDecision, BuyingPowerModel, MarginAccount},
    portfolio::{router::OrderRouter, sub_account::SubAccount},
    provider::LedgerView,
};

// ================================================================================================
// Configuration
// ================================================================================================

/// Bootstrap description of one sub-account.
pub struct SubAccountConfig {
    pub name: String,
    pub account_currency: Currency,
    pub model: Arc<dyn BuyingPowerModel>,
}

impl SubAccountConfig {
    pub fn new(
        name: impl Into<String>,
        account_currency: impl Into<Currency>,
        model: Arc<dyn BuyingPowerModel>,
    ) -> Self {
        Self {
            name: name.into(),
            account_currency: account_currency.into(),
            model,
        }
    }
}

// ================================================================================================
// Aggregating Portfolio
// ================================================================================================

/// A portfolio split across per-venue sub-accounts behind a router, exposed
/// as one unified view.
///
/// Each sub-account holds only the securities routed to it; the main view
/// aggregates cash and positions without ever writing into a sub-account
/// directly. All fill flow goes through [`AggregatingPortfolio::process_fills`].
pub struct AggregatingPortfolio {
    accounts: HashMap<String, SubAccount>,
    router: Arc<dyn OrderRouter>,
    clock: Arc<dyn Clock>,
    main_cash: CashBook,
}

impl AggregatingPortfolio {
    /// Fails on an empty account set or duplicate account names; a portfolio
    /// with nowhere to route is a bootstrap error, not a runtime condition.
    pub fn new(
        configs: Vec<SubAccountConfig>,
        router: Arc<dyn OrderRouter>,
        clock: Arc<dyn Clock>,
        main_currency: impl Into<Currency>,
    ) -> GridArbResult<Self> {
        if configs.is_empty() {
            return Err(ConfigError::EmptyAccounts.into());
        }

        let mut accounts = HashMap::new();
        for config in configs {
            if accounts.contains_key(&config.name) {
                return Err(ConfigError::DuplicateAccount(config.name).into());
            }
            accounts.insert(
                config.name.clone(),
                SubAccount::new(config.name, config.account_currency, config.model),
            );
        }

        Ok(Self {
            accounts,
            router,
            clock,
            main_cash: CashBook::new(main_currency),
        })
    }

    pub fn account(&self, name: &str) -> Option<&SubAccount> {
        self.accounts.get(name)
    }

    pub fn account_mut(&mut self, name: &str) -> Option<&mut SubAccount> {
        self.accounts.get_mut(name)
    }

    pub fn account_names(&self) -> Vec<&str> {
        self.accounts.keys().map(String::as_str).collect()
    }

    pub fn main_cash_book(&self) -> &CashBook {
        &self.main_cash
    }

    /// Registers a security with the sub-account its symbol routes to.
    pub fn register_security(&mut self, security: Security) -> GridArbResult<()> {
        let name = self.router.route(&security.symbol).to_string();
        let account = self
            .accounts
            .get_mut(&name)
            .ok_or(DataError::UnknownAccount(name))?;
        account.register_security(security);
        Ok(())
    }

    // ============================================================================================
    // Buying Power
    // ============================================================================================

    /// Routes each order to its sub-account and delegates to that account's
    /// margin evaluator. An unroutable account name rejects the batch; an
    /// empty batch is trivially affordable.
    pub fn has_sufficient_buying_power_for_orders(&self, orders: &[Order]) -> BuyingPowerDecision {
        for order in orders {
            let name = self.router.route(&order.symbol);
            let Some(account) = self.accounts.get(name) else {
                return BuyingPowerDecision::insufficient(format!(
                    "account '{name}' not found"
                ));
            };
            let decision = account.buying_power_for_order(order);
            if !decision.is_sufficient {
                return decision;
            }
        }
        BuyingPowerDecision::sufficient()
    }

    // ============================================================================================
    // Fills
    // ============================================================================================

    /// Applies fill events, each to exactly the sub-account its symbol
    /// routes to. Other accounts are untouched.
    pub fn process_fills(&mut self, events: &[OrderEvent]) {
        let applied_at = self.clock.utc_now();
        for event in events {
            let name = self.router.route(&event.symbol).to_string();
            match self.accounts.get_mut(&name) {
                Some(account) => account.process_fill(event, applied_at),
                None => warn!(
                    account = %name,
                    symbol = %event.symbol,
                    "Fill routed to unknown account dropped"
                ),
            }
        }
    }

    // ============================================================================================
    // Aggregated View
    // ============================================================================================

    /// Signed position in `symbol` across all sub-accounts.
    pub fn total_position(&self, symbol: &Symbol) -> Decimal {
        self.accounts
            .values()
            .map(|account| account.position(symbol))
            .sum()
    }

    /// Overlay cash book: main entries first, sub-account crypto-base
    /// currencies second.
    pub fn routing_cash_book(&self) -> RoutingCashBook<'_> {
        RoutingCashBook { portfolio: self }
    }

    /// Aggregates sub-account currencies into the main book: amounts are
    /// summed per currency, conversion links are copied over, and USD-pegged
    /// stables get an identity conversion.
    pub fn sync_conversions_to_main(&mut self) {
        let mut amounts: HashMap<Currency, Decimal> = HashMap::new();
        let mut templates: HashMap<Currency, Cash> = HashMap::new();

        for account in self.accounts.values() {
            for cash in account.cash_book().iter() {
                *amounts.entry(cash.currency.clone()).or_default() += cash.amount;
                templates
                    .entry(cash.currency.clone())
                    .or_insert_with(|| cash.clone());
            }
        }

        for (currency, amount) in amounts {
            let template = &templates[&currency];
            let mut merged = Cash::new(currency.clone(), amount, template.conversion_rate);
            merged.conversion = template.conversion.clone();
            if currency.is_usd_pegged() {
                merged.conversion_rate = Decimal::ONE;
            }
            self.main_cash.set(merged);
        }
    }
}

impl LedgerView for AggregatingPortfolio {
    fn ledger_positions(&self) -> Vec<(Symbol, Decimal)> {
        let mut totals: HashMap<Symbol, Decimal> = HashMap::new();
        for account in self.accounts.values() {
            for valuation in account.holdings() {
                *totals.entry(valuation.symbol).or_default() += valuation.quantity;
            }
        }
        totals.retain(|_, quantity| !quantity.is_zero());
        totals.into_iter().collect()
    }
}

// ================================================================================================
// Routing Cash Book
// ================================================================================================

/// Read-only cash lookup over the aggregated portfolio.
///
/// The main book wins; currencies it does not carry resolve from the
/// sub-account holding a crypto security based in that currency.
pub struct RoutingCashBook<'a> {
    portfolio: &'a AggregatingPortfolio,
}

impl RoutingCashBook<'_> {
    pub fn cash(&self, currency: &Currency) -> Option<Cash> {
        if let Some(cash) = self.portfolio.main_cash.get(currency) {
            return Some(cash.clone());
        }

        self.portfolio.accounts.values().find_map(|account| {
            let owns_base = account
                .securities()
                .securities()
                .iter()
                .any(|security| {
                    security.security_type() == SecurityType::Crypto
                        && security.base_currency == *currency
                });
            if owns_base {
                account.cash_book().get(currency).cloned()
            } else {
                None
            }
        })
    }
}
