use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::{ObjectStore, PutPayload, path::Path};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    data::{
        domain::{ExecutionId, Market},
        event::ExecutionSnapshot,
    },
    error::{GridArbResult, IoError},
    grid::{
        manager::{ManagerState, PairManager},
        pair::{PairKey, TradingPair},
        position::GridPosition,
    },
};

/// Latest checkpoint.
pub const STATE_KEY: &str = "trade_data/trading_pair_manager/state";

/// Timestamped checkpoint history.
pub const BACKUP_PREFIX: &str = "trade_data/trading_pair_manager/backups";

const SCHEMA_VERSION: &str = "1.0";

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ================================================================================================
// Schema
// ================================================================================================

/// The versioned checkpoint document.
///
/// Restore fails loudly on an unknown version rather than silently ignoring
/// fields; the schema is part of the crate's compatibility contract.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub grid_positions: Vec<GridPosition>,
    pub last_fill_time_by_market: Vec<MarketFillTime>,
    pub processed_executions: Vec<ProcessedExecution>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarketFillTime {
    pub market: Market,
    pub last_fill_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessedExecution {
    pub execution_id: ExecutionId,
    pub snapshot: ExecutionSnapshot,
}

impl PersistedState {
    pub(crate) fn from_manager_state(state: &ManagerState, timestamp: DateTime<Utc>) -> Self {
        let mut grid_positions: Vec<GridPosition> = state
            .pairs
            .values()
            .flat_map(|pair| pair.positions().cloned())
            .collect();
        // Deterministic output for diffing and tests.
        grid_positions.sort_by_key(|p| {
            (
                p.leg1_symbol.to_string(),
                p.leg2_symbol.to_string(),
                p.tag_key(),
            )
        });

        let mut last_fill_time_by_market: Vec<MarketFillTime> = state
            .last_fill_time_by_market
            .iter()
            .map(|(market, last_fill_time)| MarketFillTime {
                market: *market,
                last_fill_time: *last_fill_time,
            })
            .collect();
        last_fill_time_by_market.sort_by_key(|entry| entry.market);

        let mut processed_executions: Vec<ProcessedExecution> = state
            .processed_executions
            .iter()
            .map(|(execution_id, snapshot)| ProcessedExecution {
                execution_id: execution_id.clone(),
                snapshot: snapshot.clone(),
            })
            .collect();
        processed_executions.sort_by(|a, b| a.execution_id.cmp(&b.execution_id));

        Self {
            timestamp,
            version: SCHEMA_VERSION.to_string(),
            grid_positions,
            last_fill_time_by_market,
            processed_executions,
        }
    }
}

// ================================================================================================
// Persist / Restore
// ================================================================================================

impl PairManager {
    /// Serializes the full reconciliation state and writes it to the latest
    /// key and a timestamped backup key.
    ///
    /// Checkpoints must happen more often than the broker's history
    /// retention horizon, or lost state becomes unrebuildable; hosts drive
    /// this via the periodic sweep (default cadence 5 minutes).
    #[tracing::instrument(skip(self))]
    pub async fn persist_state(&self) -> GridArbResult<()> {
        let state = self.state.lock().await;
        self.persist_locked(&state).await
    }

    pub(crate) async fn persist_locked(&self, state: &ManagerState) -> GridArbResult<()> {
        let store = self.store.as_ref().ok_or(IoError::NoObjectStore)?;

        let now = self.clock.utc_now();
        let document = PersistedState::from_manager_state(state, now);
        let json = serde_json::to_vec(&document).map_err(IoError::Json)?;
        let payload = Bytes::from(json);

        let backup_key = format!("{BACKUP_PREFIX}/{}", now.format(BACKUP_TIMESTAMP_FORMAT));
        for key in [STATE_KEY, backup_key.as_str()] {
            store
                .put(&Path::from(key), PutPayload::from(payload.clone()))
                .await
                .map_err(|e| IoError::ObjectStore(e.to_string()))?;
        }

        info!(
            positions = document.grid_positions.len(),
            executions = document.processed_executions.len(),
            backup = %backup_key,
            "Checkpoint written"
        );
        Ok(())
    }

    /// Restores from the latest checkpoint, then replays broker history from
    /// the checkpoint time to now.
    ///
    /// Returns `false` when no checkpoint exists (fresh start). Positions
    /// whose symbols cannot be reconstructed against the security registry
    /// are skipped with a warning; an operator resolves those by hand.
    pub async fn restore_state(&self) -> GridArbResult<bool> {
        self.restore_from_key(STATE_KEY).await
    }

    /// Restores from an explicit (usually backup) checkpoint key.
    pub async fn restore_state_from(&self, key: &str) -> GridArbResult<bool> {
        self.restore_from_key(key).await
    }

    #[tracing::instrument(skip(self))]
    async fn restore_from_key(&self, key: &str) -> GridArbResult<bool> {
        let store = self.store.as_ref().ok_or(IoError::NoObjectStore)?;

        let result = match store.get(&Path::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                info!("No checkpoint found; starting fresh");
                return Ok(false);
            }
            Err(e) => return Err(IoError::ObjectStore(e.to_string()).into()),
        };
        let raw = result
            .bytes()
            .await
            .map_err(|e| IoError::ObjectStore(e.to_string()))?;

        let document: PersistedState = serde_json::from_slice(&raw).map_err(IoError::Json)?;
        if document.version != SCHEMA_VERSION {
            return Err(IoError::UnsupportedVersion(document.version).into());
        }

        let checkpoint_time = document.timestamp;
        let mut state = self.state.lock().await;

        for position in document.grid_positions {
            let legs_known = self.registry.contains(&position.leg1_symbol)
                && self.registry.contains(&position.leg2_symbol);
            if !legs_known {
                warn!(
                    leg1 = %position.leg1_symbol,
                    leg2 = %position.leg2_symbol,
                    key = %position.tag_key(),
                    "Skipping restored position with unreconstructible symbols"
                );
                continue;
            }

            let key = PairKey::new(position.leg1_symbol.clone(), position.leg2_symbol.clone());
            let pair = state.pairs.entry(key.clone()).or_insert_with(|| {
                TradingPair::new(key.leg1.clone(), key.leg2.clone(), Default::default())
            });
            pair.insert_position(position);
        }

        state.last_fill_time_by_market = document
            .last_fill_time_by_market
            .into_iter()
            .map(|entry| (entry.market, entry.last_fill_time))
            .collect();
        state.processed_executions = document
            .processed_executions
            .into_iter()
            .map(|entry| (entry.execution_id, entry.snapshot))
            .collect();

        info!(
            pairs = state.pairs.len(),
            executions = state.processed_executions.len(),
            checkpoint = %checkpoint_time,
            "Checkpoint restored"
        );

        // Catch up on whatever filled while we were down.
        if let Some(provider) = self.history.clone() {
            let now = self.clock.utc_now();
            self.replay_window_locked(&mut state, provider.as_ref(), checkpoint_time, now)
                .await;
        }

        Ok(true)
    }

    /// Backup checkpoint keys currently in the store, oldest first.
    pub async fn list_backups(&self) -> GridArbResult<Vec<String>> {
        let store = self.store.as_ref().ok_or(IoError::NoObjectStore)?;
        let listing = store
            .list_with_delimiter(Some(&Path::from(BACKUP_PREFIX)))
            .await
            .map_err(|e| IoError::ObjectStore(e.to_string()))?;

        let mut keys: Vec<String> = listing
            .objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
