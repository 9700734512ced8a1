//! Persisted match records, as read from a catalog.
//!
//! Action and state payloads stay untyped here (`String` / `Value`);
//! they are validated once, when a `MatchLog` is assembled.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use match_kernel::domain::Actor;

pub type MatchId = i64;
pub type TurnId = i64;
pub type SnapshotId = i64;

// ── Match status ───────────────────────────────────────────────────

/// Lifecycle owned by the executor: `created → running → {finished | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Created,
    Running,
    Finished,
    Error,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Error)
    }

    /// Forward-only transitions. A created match may fail before its
    /// first turn, so `created → error` is allowed as well.
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Created, Running) | (Created, Error) | (Running, Finished) | (Running, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Created => "created",
            MatchStatus::Running => "running",
            MatchStatus::Finished => "finished",
            MatchStatus::Error => "error",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(MatchStatus::Created),
            "running" => Ok(MatchStatus::Running),
            "finished" => Ok(MatchStatus::Finished),
            "error" => Ok(MatchStatus::Error),
            other => Err(format!("unknown match status {:?}", other)),
        }
    }
}

// ── Rows ───────────────────────────────────────────────────────────

/// Root of a replay. Also the summary row returned by `list_matches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub seed: String,
    pub status: MatchStatus,
    pub game_key: String,
    pub game_version: String,
    pub created_at: DateTime<Utc>,
}

/// One persisted move attempt. `action` is the raw stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: TurnId,
    pub match_id: MatchId,
    pub idx: i64,
    pub actor: Actor,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted, already-materialized state. `turn_id == None` means the
/// snapshot was taken before the first turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub id: SnapshotId,
    pub match_id: MatchId,
    pub turn_id: Option<TurnId>,
    pub state: Value,
    pub created_at: DateTime<Utc>,
}
