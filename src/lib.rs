// === Public Modules (The Canonical Paths) ===
pub mod clock;
pub mod data;
pub mod error;
pub mod grid;
pub mod margin;
pub mod portfolio;
pub mod provider;
pub mod spread;

// === Convenience ===
pub mod sorted_vec_map;

// === Facades (Re-exporting the host-facing surface) ===
pub use crate::error::{GridArbError, GridArbResult};
pub use crate::grid::manager::{PairChange, PairManager, PairSetEvent};
pub use crate::grid::reconcile::BaselineOutcome;
pub use crate::margin::{config::UnifiedMarginConfig, unified::UnifiedMarginEngine};
pub use crate::portfolio::aggregate::{AggregatingPortfolio, SubAccountConfig};
pub use crate::provider::{ExecutionHistoryProvider, LedgerView};
