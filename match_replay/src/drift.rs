//! Drift detection — determinism verification and state comparison.
//!
//! Three checks over an assembled match log:
//!   - `verify_determinism`: two independent timelines must agree hash-for-hash
//!   - `diff_states`: cell-level comparison of two states
//!   - `audit_snapshots`: persisted snapshots vs. states derived from actions

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use match_kernel::domain::{Actor, Cell, GameState, Mark};
use crate::model::TurnId;
use crate::replay::{MatchLog, ReplayEngine};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriftError {
    #[error("replay is nondeterministic at step {step:?}: {first} != {second}")]
    Nondeterministic {
        step: Option<usize>,
        first: String,
        second: String,
    },
}

/// Replay the log twice and compare every step hash. Returns the
/// timeline fingerprint on success.
pub fn verify_determinism(engine: &ReplayEngine<'_>, log: &MatchLog) -> Result<String, DriftError> {
    let first = engine.timeline(log);
    let second = engine.timeline(log);

    if first.initial_hash != second.initial_hash {
        return Err(DriftError::Nondeterministic {
            step: None,
            first: first.initial_hash,
            second: second.initial_hash,
        });
    }
    for (i, (a, b)) in first.steps.iter().zip(&second.steps).enumerate() {
        if a.hash != b.hash {
            return Err(DriftError::Nondeterministic {
                step: Some(i),
                first: a.hash.clone(),
                second: b.hash.clone(),
            });
        }
    }
    Ok(first.fingerprint())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellChange {
    pub cell: Cell,
    pub before: Mark,
    pub after: Mark,
}

/// Differences between two states. Cells missing on one side (shape
/// mismatch) are reported with `Mark::Empty` on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDiff {
    pub cells: Vec<CellChange>,
    pub player: Option<(Actor, Actor)>,
    pub winner: Option<(Option<Actor>, Option<Actor>)>,
    pub shape_changed: bool,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.player.is_none() && self.winner.is_none() && !self.shape_changed
    }
}

pub fn diff_states(before: &GameState, after: &GameState) -> StateDiff {
    let (a, b) = (before.board.rows(), after.board.rows());
    let shape_changed =
        a.len() != b.len() || a.iter().zip(b).any(|(ra, rb)| ra.len() != rb.len());

    let rows = a.len().max(b.len());
    let mut cells = Vec::new();
    for row in 0..rows {
        let cols = a.get(row).map_or(0, Vec::len).max(b.get(row).map_or(0, Vec::len));
        for col in 0..cols {
            let cell = Cell::new(row, col);
            let was = before.board.get(cell).unwrap_or_default();
            let now = after.board.get(cell).unwrap_or_default();
            if was != now {
                cells.push(CellChange {
                    cell,
                    before: was,
                    after: now,
                });
            }
        }
    }

    StateDiff {
        cells,
        player: (before.player != after.player).then_some((before.player, after.player)),
        winner: (before.winner != after.winner).then_some((before.winner, after.winner)),
        shape_changed,
    }
}

/// A persisted snapshot that disagrees with the state derived from
/// the action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMismatch {
    pub step: usize,
    pub turn_id: TurnId,
    pub snapshot_hash: String,
    pub derived_hash: String,
    pub diff: StateDiff,
}

/// Compare every per-turn snapshot against pure action replay. Both
/// timelines start from the same initial state, so a mismatch means
/// the snapshot and the actions disagree at that turn.
pub fn audit_snapshots(engine: &ReplayEngine<'_>, log: &MatchLog) -> Vec<SnapshotMismatch> {
    let with = engine.timeline(log);
    let derived = engine.timeline(&log.without_turn_snapshots());

    let mut mismatches = Vec::new();
    for (i, (snap, pure)) in with.steps.iter().zip(&derived.steps).enumerate() {
        if !log.snapshots().contains(snap.turn_id) || snap.hash == pure.hash {
            continue;
        }
        warn!(match_id = log.match_id(), turn_id = snap.turn_id, step = i, "snapshot disagrees with action replay");
        mismatches.push(SnapshotMismatch {
            step: i,
            turn_id: snap.turn_id,
            snapshot_hash: snap.hash.clone(),
            derived_hash: pure.hash.clone(),
            diff: diff_states(&pure.state, &snap.state),
        });
    }
    mismatches
}
