use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{DataError, GridArbError, GridArbResult};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// A broker-assigned execution identifier.
///
/// Globally unique and stable across history queries; the exactly-once
/// guarantee of the fill pipeline keys on this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A host-visible order identifier.
///
/// Live broker orders carry positive ids; replayed (virtual) orders carry
/// strictly negative ids so the two ranges can never collide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl OrderId {
    pub fn is_virtual(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ================================================================================================
// Venue & Instrument Vocabulary
// ================================================================================================

/// Trading venue an instrument belongs to.
///
/// `InternalFeed` marks synthetic instruments (index feeds, conversion
/// helpers) that never route to a broker and never take leverage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Market {
    Binance,
    Bybit,
    Okx,
    Kraken,
    InternalFeed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SecurityType {
    /// Synthetic/base instrument; excluded from margin and leverage.
    Base,
    /// Spot crypto. Serves as discounted collateral in the unified model.
    Crypto,
    /// Crypto derivative margined in the account currency.
    CryptoFuture,
    Future,
    Equity,
}

impl SecurityType {
    /// True for instrument kinds whose holdings collateralize futures.
    pub fn is_spot_crypto(&self) -> bool {
        matches!(self, SecurityType::Crypto)
    }

    pub fn is_future(&self) -> bool {
        matches!(self, SecurityType::CryptoFuture | SecurityType::Future)
    }
}

/// Side of an order or fill.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Buy,
    Sell,
}

impl OrderDirection {
    /// The opposite side. Used by the position-reversal credit.
    pub fn opposite(&self) -> Self {
        match self {
            OrderDirection::Buy => OrderDirection::Sell,
            OrderDirection::Sell => OrderDirection::Buy,
        }
    }
}

/// Direction a spread position opens in.
///
/// `LongSpread` buys leg 1 and sells leg 2; `ShortSpread` is the mirror.
/// The string forms are embedded in grid natural keys and order tags and
/// must stay byte-stable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadDirection {
    LongSpread,
    ShortSpread,
}

impl SpreadDirection {
    pub fn opposite(&self) -> Self {
        match self {
            SpreadDirection::LongSpread => SpreadDirection::ShortSpread,
            SpreadDirection::ShortSpread => SpreadDirection::LongSpread,
        }
    }
}

/// Whether a grid level opens or closes a position.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridLevelType {
    Entry,
    Exit,
}

/// Classification of the pair's quote constellation, refreshed each tick.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
pub enum MarketState {
    #[default]
    Unknown,
    /// One leg's bid trades through the other leg's ask.
    Crossed,
    /// Quotes interleave strictly; a limit order on each leg can capture the gap.
    LimitOpportunity,
    NoOpportunity,
}

/// Kind of instrument pairing a `TradingPair` represents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PairType {
    #[default]
    SpotFuture,
    CrossVenue,
    FutureFuture,
}

/// Lifecycle status attached to an order event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
pub enum OrderStatus {
    #[default]
    None,
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
    UpdateSubmitted,
}

impl OrderStatus {
    /// Statuses that carry a fill to apply.
    pub fn is_fill(&self) -> bool {
        matches!(self, OrderStatus::PartiallyFilled | OrderStatus::Filled)
    }

    /// Statuses after which the order can never fill again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid
        )
    }
}

// ================================================================================================
// Symbol
// ================================================================================================

/// Opaque instrument identity: ticker, security type, market, optional expiry.
///
/// The string form (`Display`/`FromStr`) is the stable identifier embedded in
/// order tags and persisted state:
///
/// ```text
/// <ticker>:<security-type>:<market>[:<yyyymmdd>]
/// ```
///
/// Colon-delimited so that the pipe-delimited tag framing never collides
/// with symbol contents. Tickers must not contain `:`, `|`, or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    ticker: String,
    security_type: SecurityType,
    market: Market,
    expiry: Option<NaiveDate>,
}

const EXPIRY_FORMAT: &str = "%Y%m%d";

impl Symbol {
    pub fn new(
        ticker: impl Into<String>,
        security_type: SecurityType,
        market: Market,
    ) -> GridArbResult<Self> {
        Self::build(ticker.into(), security_type, market, None)
    }

    pub fn with_expiry(
        ticker: impl Into<String>,
        security_type: SecurityType,
        market: Market,
        expiry: NaiveDate,
    ) -> GridArbResult<Self> {
        Self::build(ticker.into(), security_type, market, Some(expiry))
    }

    fn build(
        ticker: String,
        security_type: SecurityType,
        market: Market,
        expiry: Option<NaiveDate>,
    ) -> GridArbResult<Self> {
        if ticker.is_empty()
            || ticker
                .chars()
                .any(|c| c == ':' || c == '|' || c.is_whitespace())
        {
            return Err(DataError::InvalidSymbol(ticker).into());
        }
        Ok(Self {
            ticker,
            security_type,
            market,
            expiry,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn security_type(&self) -> SecurityType {
        self.security_type
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ticker, self.security_type, self.market)?;
        if let Some(expiry) = self.expiry {
            write!(f, ":{}", expiry.format(EXPIRY_FORMAT))?;
        }
        Ok(())
    }
}

impl FromStr for Symbol {
    type Err = GridArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GridArbError::from(DataError::InvalidSymbol(s.to_string()));

        let fields: Vec<&str> = s.split(':').collect();
        if fields.len() != 3 && fields.len() != 4 {
            return Err(invalid());
        }

        let security_type = SecurityType::from_str(fields[1]).map_err(|_| invalid())?;
        let market = Market::from_str(fields[2]).map_err(|_| invalid())?;
        let expiry = match fields.get(3) {
            Some(raw) => {
                Some(NaiveDate::parse_from_str(raw, EXPIRY_FORMAT).map_err(|_| invalid())?)
            }
            None => None,
        };

        Self::build(fields[0].to_string(), security_type, market, expiry)
    }
}

// Symbols serialize as their stable string form, keeping persisted JSON
// self-describing and the checkpoint schema flat.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
