use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{
    data::domain::{GridLevelType, SpreadDirection, Symbol},
    grid::level::{GridLevel, GridLevelPair, format_f4},
};

/// Encodes a grid identity as an opaque ASCII order tag:
///
/// ```text
/// <leg1-sid>|<leg2-sid>|<entry_spread:F4>|<exit_spread:F4>|<direction>|<position_size:F4>
/// ```
///
/// Exactly six pipe-delimited fields, no spaces, invariant decimal
/// formatting with four fractional digits. Brokers echo the tag back on
/// fills, which is how replayed executions find their grid position.
pub fn encode(leg1: &Symbol, leg2: &Symbol, level_pair: &GridLevelPair) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        leg1,
        leg2,
        format_f4(level_pair.entry.spread_pct),
        format_f4(level_pair.exit.spread_pct),
        level_pair.direction(),
        format_f4(level_pair.position_size_pct()),
    )
}

/// Decodes an order tag back into the grid identity it encodes.
///
/// Returns `None` on any malformation: empty input, field count other than
/// six, unparsable symbol, unknown direction, or non-numeric decimal fields.
/// A `None` simply means "not a grid order"; callers ignore such events.
pub fn decode(tag: &str) -> Option<(Symbol, Symbol, GridLevelPair)> {
    if tag.is_empty() {
        return None;
    }

    let fields: Vec<&str> = tag.split('|').collect();
    if fields.len() != 6 {
        return None;
    }

    let leg1 = Symbol::from_str(fields[0]).ok()?;
    let leg2 = Symbol::from_str(fields[1]).ok()?;
    let entry_spread = Decimal::from_str(fields[2]).ok()?;
    let exit_spread = Decimal::from_str(fields[3]).ok()?;
    let direction = SpreadDirection::from_str(fields[4]).ok()?;
    let position_size = Decimal::from_str(fields[5]).ok()?;

    let entry = GridLevel::new(entry_spread, direction, GridLevelType::Entry, position_size).ok()?;
    let exit = GridLevel::new(exit_spread, direction, GridLevelType::Exit, position_size).ok()?;

    let level_pair = GridLevelPair::new(entry, exit).ok()?;
    Some((leg1, leg2, level_pair))
}
