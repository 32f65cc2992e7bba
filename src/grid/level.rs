use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{GridLevelType, SpreadDirection},
    error::{ConfigError, GridArbResult},
};

/// Formats a decimal with exactly four fractional digits, midpoint rounded
/// away from zero. Byte-stable across hosts; natural keys and order tags
/// depend on it.
pub(crate) fn format_f4(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.4}")
}

// ================================================================================================
// Grid Level
// ================================================================================================

/// One rung of the grid: a spread threshold with the direction and position
/// size it commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevel {
    pub spread_pct: Decimal,
    pub direction: SpreadDirection,
    #[serde(rename = "type")]
    pub level_type: GridLevelType,
    pub position_size_pct: Decimal,
}

impl GridLevel {
    pub fn new(
        spread_pct: Decimal,
        direction: SpreadDirection,
        level_type: GridLevelType,
        position_size_pct: Decimal,
    ) -> GridArbResult<Self> {
        if position_size_pct <= Decimal::ZERO || position_size_pct > Decimal::ONE {
            return Err(ConfigError::InvalidGridLevel(format!(
                "position size percentage must be in (0, 1], got {position_size_pct}"
            ))
            .into());
        }
        Ok(Self {
            spread_pct,
            direction,
            level_type,
            position_size_pct,
        })
    }

    /// Stable identity of this level: `"{spread:.4}|{direction}|{type}"`.
    pub fn natural_key(&self) -> String {
        format!(
            "{}|{}|{}",
            format_f4(self.spread_pct),
            self.direction,
            self.level_type
        )
    }
}

// ================================================================================================
// Grid Level Pair
// ================================================================================================

/// The (entry, exit) rung pair one grid position trades between.
///
/// Entry and exit must agree on direction and position size: the pair
/// describes a single position's lifecycle, and its identity (the entry's
/// natural key) must survive an encode/decode round trip through order tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevelPair {
    pub entry: GridLevel,
    pub exit: GridLevel,
}

impl GridLevelPair {
    pub fn new(entry: GridLevel, exit: GridLevel) -> GridArbResult<Self> {
        if entry.level_type != GridLevelType::Entry {
            return Err(ConfigError::InvalidGridLevelPair(format!(
                "entry level has type {}",
                entry.level_type
            ))
            .into());
        }
        if exit.level_type != GridLevelType::Exit {
            return Err(ConfigError::InvalidGridLevelPair(format!(
                "exit level has type {}",
                exit.level_type
            ))
            .into());
        }
        if entry.direction != exit.direction {
            return Err(ConfigError::InvalidGridLevelPair(format!(
                "entry direction {} does not match exit direction {}",
                entry.direction, exit.direction
            ))
            .into());
        }
        if entry.position_size_pct != exit.position_size_pct {
            return Err(ConfigError::InvalidGridLevelPair(format!(
                "entry position size {} does not match exit position size {}",
                entry.position_size_pct, exit.position_size_pct
            ))
            .into());
        }
        Ok(Self { entry, exit })
    }

    /// Direction the position opens in.
    pub fn direction(&self) -> SpreadDirection {
        self.entry.direction
    }

    pub fn position_size_pct(&self) -> Decimal {
        self.entry.position_size_pct
    }

    /// Identity used to key grid positions: the entry level's natural key.
    pub fn tag_key(&self) -> String {
        self.entry.natural_key()
    }
}
