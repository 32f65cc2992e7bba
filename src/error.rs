use thiserror::Error;

pub type GridArbResult<T> = Result<T, GridArbError>;

#[derive(Debug, Error)]
pub enum GridArbError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors surfaced while validating configuration at construction time.
///
/// Any of these must abort bootstrap; the core never runs on a partially
/// validated configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Empty tier schedule: {0}")]
    EmptyTierSchedule(String),

    #[error("Tier limit must be strictly positive, got {limit} in {schedule}")]
    NonPositiveTierLimit { schedule: String, limit: String },

    #[error("Tier limits must be strictly increasing in {schedule}: {prev} >= {next}")]
    NonIncreasingTierLimits {
        schedule: String,
        prev: String,
        next: String,
    },

    #[error("Rate out of [0, 1] range: {rate} in {context}")]
    RateOutOfRange { context: String, rate: String },

    #[error("Leverage must be strictly positive, got {0}")]
    NonPositiveLeverage(String),

    #[error("Account configuration is empty")]
    EmptyAccounts,

    #[error("Duplicate account name: '{0}'")]
    DuplicateAccount(String),

    #[error("Invalid grid level: {0}")]
    InvalidGridLevel(String),

    #[error("Invalid grid level pair: {0}")]
    InvalidGridLevelPair(String),
}

/// Errors related to domain data: symbols, events, and per-operation inputs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Invalid symbol string: '{0}'")]
    InvalidSymbol(String),

    #[error("Unknown symbol: '{0}'")]
    UnknownSymbol(String),

    #[error("Unknown account: '{0}'")]
    UnknownAccount(String),

    #[error("Pair ({leg1}, {leg2}) is not managed")]
    UnknownPair { leg1: String, leg2: String },

    #[error("Event symbol '{symbol}' matches neither leg of pair ({leg1}, {leg2})")]
    SymbolNotInPair {
        symbol: String,
        leg1: String,
        leg2: String,
    },

    #[error("Failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),

    #[error("Failed to parse decimal: {0}")]
    ParseDecimal(String),
}

/// Errors related to checkpoint serialization and the object store.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Object store operation failed: {0}")]
    ObjectStore(String),

    #[error("No object store configured")]
    NoObjectStore,

    #[error("Unsupported checkpoint version: '{0}'")]
    UnsupportedVersion(String),
}

/// Errors raised by the execution-history provider seam.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No execution history provider configured")]
    NoProvider,

    #[error("Execution history unavailable: {0}")]
    HistoryUnavailable(String),
}

/// Errors related to internal invariants and bugs.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Missing internal field: {0}")]
    MissingField(String),
}
