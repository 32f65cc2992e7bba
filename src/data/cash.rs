use std::{collections::HashMap, fmt};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::domain::Symbol;

// ================================================================================================
// Currency
// ================================================================================================

/// ISO-style currency/asset code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

/// Currencies treated as 1:1 with USD when synchronizing conversions.
const USD_PEGGED: [&str; 6] = ["USDT", "USDC", "BUSD", "DAI", "TUSD", "USDP"];

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for stablecoins in the USD-pegged registry.
    pub fn is_usd_pegged(&self) -> bool {
        USD_PEGGED.contains(&self.0.as_str())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// ================================================================================================
// Cash
// ================================================================================================

/// Link from a cash balance to the security whose price drives its
/// conversion rate.
///
/// `invert` handles quote pairs listed the other way around (e.g. a USDT
/// balance converted through `BTCUSDT` when the account currency is BTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub source: Symbol,
    pub invert: bool,
}

/// A single currency balance.
///
/// `amount` is signed: negative amounts express borrowings against the
/// account and feed the borrowing margin requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cash {
    pub currency: Currency,
    pub amount: Decimal,
    /// Rate into the account currency. Zero until a conversion resolves.
    pub conversion_rate: Decimal,
    pub conversion: Option<CurrencyConversion>,
}

impl Cash {
    pub fn new(currency: impl Into<Currency>, amount: Decimal, conversion_rate: Decimal) -> Self {
        Self {
            currency: currency.into(),
            amount,
            conversion_rate,
            conversion: None,
        }
    }

    pub fn with_conversion(mut self, conversion: CurrencyConversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    /// Signed value of this balance in the account currency.
    pub fn value_in_account_currency(&self) -> Decimal {
        self.amount * self.conversion_rate
    }

    /// Amount currently borrowed in this currency (zero when the balance is
    /// non-negative).
    pub fn borrowed_amount(&self) -> Decimal {
        if self.amount.is_sign_negative() {
            -self.amount
        } else {
            Decimal::ZERO
        }
    }
}

// ================================================================================================
// CashBook
// ================================================================================================

/// Mapping currency -> balance with one distinguished account currency.
///
/// The account currency is the unit every total in the margin engine is
/// expressed in; its own conversion rate is identically 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBook {
    account_currency: Currency,
    entries: HashMap<Currency, Cash>,
}

impl CashBook {
    pub fn new(account_currency: impl Into<Currency>) -> Self {
        let account_currency = account_currency.into();
        let mut entries = HashMap::new();
        entries.insert(
            account_currency.clone(),
            Cash::new(account_currency.clone(), Decimal::ZERO, Decimal::ONE),
        );
        Self {
            account_currency,
            entries,
        }
    }

    pub fn account_currency(&self) -> &Currency {
        &self.account_currency
    }

    pub fn get(&self, currency: &Currency) -> Option<&Cash> {
        self.entries.get(currency)
    }

    pub fn get_mut(&mut self, currency: &Currency) -> Option<&mut Cash> {
        self.entries.get_mut(currency)
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.entries.contains_key(currency)
    }

    /// Inserts or replaces a balance wholesale.
    pub fn set(&mut self, cash: Cash) {
        self.entries.insert(cash.currency.clone(), cash);
    }

    /// Adds `delta` to the balance of `currency`, creating the entry if
    /// missing. New non-account-currency entries start with a zero conversion
    /// rate until a conversion resolves.
    pub fn apply_delta(&mut self, currency: &Currency, delta: Decimal) -> &mut Cash {
        let entry = self.entries.entry(currency.clone()).or_insert_with(|| {
            let rate = if *currency == self.account_currency {
                Decimal::ONE
            } else {
                Decimal::ZERO
            };
            Cash::new(currency.clone(), Decimal::ZERO, rate)
        });
        entry.amount += delta;
        entry
    }

    pub fn set_conversion_rate(&mut self, currency: &Currency, rate: Decimal) {
        if let Some(cash) = self.entries.get_mut(currency) {
            cash.conversion_rate = rate;
        }
    }

    /// Signed total of all balances in the account currency.
    pub fn total_value_in_account_currency(&self) -> Decimal {
        self.entries
            .values()
            .map(Cash::value_in_account_currency)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cash> {
        self.entries.values()
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.entries.keys()
    }
}
