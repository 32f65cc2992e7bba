use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, GridArbResult},
    sorted_vec_map::SortedVecMap,
};

/// An ordered maintenance-rate ladder over position (or borrow) size.
///
/// Finite rungs map an upper limit to a rate; `top_rate` covers everything
/// beyond the last limit (the unbounded tier). Two evaluation modes exist:
///
/// - **Marginal** ([`TierSchedule::marginal_rate`]): the whole value pays the
///   rate of the smallest limit strictly exceeding it. Used for futures
///   position maintenance.
/// - **Cumulative** ([`TierSchedule::cumulative_margin`]): tax-bracket
///   arithmetic, each slice pays its own tier's rate. Used for borrowing
///   maintenance, where the requirement must be continuous in the borrowed
///   amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSchedule {
    rates: SortedVecMap<Decimal, Decimal>,
    top_rate: Decimal,
}

impl TierSchedule {
    /// Builds a schedule from `(limit, rate)` rungs plus the unbounded top
    /// rate. `name` contextualizes validation errors.
    pub fn new(
        tiers: impl IntoIterator<Item = (Decimal, Decimal)>,
        top_rate: Decimal,
        name: &str,
    ) -> GridArbResult<Self> {
        let mut rates = SortedVecMap::new();
        for (limit, rate) in tiers {
            if limit <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveTierLimit {
                    schedule: name.to_string(),
                    limit: limit.to_string(),
                }
                .into());
            }
            check_rate(rate, name)?;
            if rates.insert(limit, rate).is_some() {
                return Err(ConfigError::NonIncreasingTierLimits {
                    schedule: name.to_string(),
                    prev: limit.to_string(),
                    next: limit.to_string(),
                }
                .into());
            }
        }
        if rates.is_empty() {
            return Err(ConfigError::EmptyTierSchedule(name.to_string()).into());
        }
        check_rate(top_rate, name)?;

        Ok(Self { rates, top_rate })
    }

    /// Rate of the smallest limit strictly exceeding `value`; the top rate
    /// when no finite limit does.
    pub fn marginal_rate(&self, value: Decimal) -> Decimal {
        let value = value.abs();
        self.rates
            .iter()
            .find(|(limit, _)| **limit > value)
            .map(|(_, rate)| *rate)
            .unwrap_or(self.top_rate)
    }

    /// Whole-value maintenance at the marginal rate.
    pub fn maintenance_margin(&self, value: Decimal) -> Decimal {
        let value = value.abs();
        value * self.marginal_rate(value)
    }

    /// Tax-bracket maintenance: each slice of `amount` pays its own tier's
    /// rate, making the result piecewise linear and continuous.
    pub fn cumulative_margin(&self, amount: Decimal) -> Decimal {
        let amount = amount.abs();
        let mut total = Decimal::ZERO;
        let mut prev_limit = Decimal::ZERO;

        for (limit, rate) in self.rates.iter() {
            if amount <= prev_limit {
                return total;
            }
            let slice = amount.min(*limit) - prev_limit;
            total += slice * *rate;
            prev_limit = *limit;
        }

        if amount > prev_limit {
            total += (amount - prev_limit) * self.top_rate;
        }
        total
    }

    pub fn top_rate(&self) -> Decimal {
        self.top_rate
    }

    pub fn limits(&self) -> impl Iterator<Item = &Decimal> {
        self.rates.keys()
    }
}

fn check_rate(rate: Decimal, name: &str) -> GridArbResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ConfigError::RateOutOfRange {
            context: name.to_string(),
            rate: rate.to_string(),
        }
        .into());
    }
    Ok(())
}
