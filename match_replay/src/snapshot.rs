//! Snapshot index — turn identity → validated materialized state.
//!
//! Built in one pass over every snapshot row of a match.
//!   - `turn_id == None` rows are candidates for the initial state
//!   - every payload is validated against the game definition first;
//!     invalid payloads are dropped and treated as absent
//!   - duplicates (same turn, or several initial rows): last valid row
//!     in fetch order wins
//!
//! A missing entry is never an error: the replay engine falls back to
//! deriving that step from the previous state.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use match_kernel::domain::GameState;
use match_kernel::rules::GameDefinition;
use match_kernel::validator::validate_state;

use crate::model::{SnapshotRow, TurnId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotIndex {
    by_turn: BTreeMap<TurnId, GameState>,
    initial: Option<GameState>,
    discarded: usize,
    superseded: usize,
}

impl SnapshotIndex {
    /// Index with no snapshots; every step is derived.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(rows: &[SnapshotRow], definition: &GameDefinition) -> Self {
        let mut index = Self::default();

        for row in rows {
            let state = match validate_state(definition, &row.state) {
                Ok(state) => state,
                Err(e) => {
                    debug!(snapshot_id = row.id, turn_id = ?row.turn_id, error = %e, "discarding snapshot");
                    index.discarded += 1;
                    continue;
                }
            };

            let replaced = match row.turn_id {
                None => index.initial.replace(state).is_some(),
                Some(turn_id) => index.by_turn.insert(turn_id, state).is_some(),
            };
            if replaced {
                warn!(snapshot_id = row.id, turn_id = ?row.turn_id, "duplicate snapshot; keeping the later row");
                index.superseded += 1;
            }
        }

        index
    }

    /// Copy keeping only the initial state.
    pub fn initial_only(&self) -> Self {
        Self {
            initial: self.initial.clone(),
            ..Self::default()
        }
    }

    /// Validated pre-first-turn state, if one was persisted.
    pub fn initial(&self) -> Option<&GameState> {
        self.initial.as_ref()
    }

    /// Authoritative state after `turn_id`, if one was persisted.
    pub fn get(&self, turn_id: TurnId) -> Option<&GameState> {
        self.by_turn.get(&turn_id)
    }

    pub fn contains(&self, turn_id: TurnId) -> bool {
        self.by_turn.contains_key(&turn_id)
    }

    /// Number of per-turn entries (excludes the initial state).
    pub fn len(&self) -> usize {
        self.by_turn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_turn.is_empty() && self.initial.is_none()
    }

    /// Rows dropped because their payload failed validation.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Valid rows overridden by a later row for the same key.
    pub fn superseded(&self) -> usize {
        self.superseded
    }
}
