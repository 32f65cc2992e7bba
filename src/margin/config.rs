use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::{
    data::cash::Currency,
    error::{ConfigError, GridArbResult},
    margin::tiers::TierSchedule,
};

/// Configuration of the unified cross-margin model.
///
/// Defaults mirror a USDT-margined unified account on a major venue:
/// 5x leverage, stables at full collateral value, majors at a 5% haircut,
/// and a three-tier futures maintenance ladder. Every rate is validated at
/// engine construction; a bad configuration aborts bootstrap.
#[derive(Debug, Clone)]
pub struct UnifiedMarginConfig {
    pub leverage: Decimal,
    pub default_maintenance_rate: Decimal,
    /// Collateral value retained per currency (1 = no haircut).
    pub currency_discounts: HashMap<Currency, Decimal>,
    /// Applied to currencies missing from the discount map.
    pub default_currency_discount: Decimal,
    /// Futures position maintenance ladder (marginal-rate selection).
    pub maintenance_tiers: TierSchedule,
    /// Flat borrowing margin rates per currency.
    pub borrowing_margin_rates: HashMap<Currency, Decimal>,
    /// Applied to borrowed currencies missing from the flat-rate map.
    pub default_borrowing_margin_rate: Decimal,
    /// Cumulative borrowing ladders; currencies listed here use bracketed
    /// maintenance instead of the flat rate.
    pub borrowing_tiers: HashMap<Currency, TierSchedule>,
    /// Fraction of margin balance reserved as a free-buying-power buffer.
    pub required_free_buying_power_pct: Decimal,
}

impl Default for UnifiedMarginConfig {
    fn default() -> Self {
        let discounts = [
            ("USDT", Decimal::ONE),
            ("USDC", Decimal::ONE),
            ("BTC", Decimal::new(95, 2)),
            ("ETH", Decimal::new(95, 2)),
            ("BNB", Decimal::new(90, 2)),
            ("SOL", Decimal::new(90, 2)),
            ("DOGE", Decimal::new(85, 2)),
            ("ADA", Decimal::new(85, 2)),
            ("DOT", Decimal::new(85, 2)),
            ("MATIC", Decimal::new(80, 2)),
        ]
        .into_iter()
        .map(|(code, discount)| (Currency::new(code), discount))
        .collect();

        let borrowing_margin_rates = [
            ("USDT", Decimal::new(25, 2)),
            ("BTC", Decimal::new(30, 2)),
            ("ETH", Decimal::new(30, 2)),
        ]
        .into_iter()
        .map(|(code, rate)| (Currency::new(code), rate))
        .collect();

        let mut borrowing_tiers = HashMap::new();
        borrowing_tiers.insert(Currency::new("USDT"), default_usdt_borrowing_tiers());

        Self {
            leverage: Decimal::new(5, 0),
            default_maintenance_rate: Decimal::new(2, 2),
            currency_discounts: discounts,
            default_currency_discount: Decimal::new(85, 2),
            maintenance_tiers: default_maintenance_tiers(),
            borrowing_margin_rates,
            default_borrowing_margin_rate: Decimal::new(30, 2),
            borrowing_tiers,
            required_free_buying_power_pct: Decimal::ZERO,
        }
    }
}

impl UnifiedMarginConfig {
    pub fn validate(&self) -> GridArbResult<()> {
        if self.leverage <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveLeverage(self.leverage.to_string()).into());
        }

        let bounded = [
            ("default maintenance rate", self.default_maintenance_rate),
            ("default currency discount", self.default_currency_discount),
            (
                "default borrowing margin rate",
                self.default_borrowing_margin_rate,
            ),
            (
                "required free buying power",
                self.required_free_buying_power_pct,
            ),
        ];
        for (context, rate) in bounded {
            check_unit_interval(context, rate)?;
        }

        for (currency, discount) in &self.currency_discounts {
            check_unit_interval(&format!("discount for {currency}"), *discount)?;
        }
        for (currency, rate) in &self.borrowing_margin_rates {
            check_unit_interval(&format!("borrowing rate for {currency}"), *rate)?;
        }
        Ok(())
    }

    /// Collateral discount for a currency; unknown currencies get the
    /// conservative default.
    pub fn discount(&self, currency: &Currency) -> Decimal {
        self.currency_discounts
            .get(currency)
            .copied()
            .unwrap_or(self.default_currency_discount)
    }

    /// Flat borrowing margin rate for a currency.
    pub fn borrowing_rate(&self, currency: &Currency) -> Decimal {
        self.borrowing_margin_rates
            .get(currency)
            .copied()
            .unwrap_or(self.default_borrowing_margin_rate)
    }

    pub fn borrowing_tiers_for(&self, currency: &Currency) -> Option<&TierSchedule> {
        self.borrowing_tiers.get(currency)
    }
}

fn check_unit_interval(context: &str, rate: Decimal) -> GridArbResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ConfigError::RateOutOfRange {
            context: context.to_string(),
            rate: rate.to_string(),
        }
        .into());
    }
    Ok(())
}

/// 50k @ 0.5%, 500k @ 2%, unbounded @ 5%.
fn default_maintenance_tiers() -> TierSchedule {
    TierSchedule::new(
        [
            (Decimal::new(50_000, 0), Decimal::new(5, 3)),
            (Decimal::new(500_000, 0), Decimal::new(2, 2)),
        ],
        Decimal::new(5, 2),
        "futures maintenance",
    )
    .expect("default maintenance tiers are valid")
}

/// The venue-typical eight-tier USDT borrowing ladder.
fn default_usdt_borrowing_tiers() -> TierSchedule {
    TierSchedule::new(
        [
            (Decimal::new(50_000, 0), Decimal::new(1, 2)),
            (Decimal::new(200_000, 0), Decimal::new(2, 2)),
            (Decimal::new(500_000, 0), Decimal::new(3, 2)),
            (Decimal::new(1_000_000, 0), Decimal::new(5, 2)),
            (Decimal::new(2_000_000, 0), Decimal::new(75, 3)),
            (Decimal::new(5_000_000, 0), Decimal::new(10, 2)),
            (Decimal::new(10_000_000, 0), Decimal::new(125, 3)),
        ],
        Decimal::new(15, 2),
        "USDT borrowing",
    )
    .expect("default borrowing tiers are valid")
}
