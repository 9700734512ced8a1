//! Match catalog — the data-access boundary the replay engine reads from.
//!
//! The engine only needs three fetches per match plus a recency listing.
//! How rows are stored is up to the implementation:
//!   - `InMemoryCatalog`: fixtures, no validation on insert
//!   - `log_store::MatchLogStore`: append-only framed log per match

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use match_kernel::domain::Actor;

use crate::model::{Match, MatchId, MatchStatus, SnapshotRow, Turn, TurnId};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt match log {path:?}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
    #[error("unknown match {0}")]
    UnknownMatch(MatchId),
    #[error("turn {turn_id} does not belong to match {match_id}")]
    UnknownTurn { match_id: MatchId, turn_id: TurnId },
    #[error("match {match_id} is {status}; no further records may be appended")]
    MatchClosed {
        match_id: MatchId,
        status: MatchStatus,
    },
    #[error("illegal status transition {from} -> {to}")]
    IllegalStatus { from: MatchStatus, to: MatchStatus },
    #[error("sequence violation in match {match_id}: expected idx {expected}, got {got}")]
    SequenceViolation {
        match_id: MatchId,
        expected: i64,
        got: i64,
    },
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Read-only access to persisted matches.
///
/// `Sync` so a caller may issue the turn and snapshot fetches for one
/// match concurrently.
pub trait MatchCatalog: Send + Sync {
    fn fetch_match(&self, match_id: MatchId) -> Result<Option<Match>, CatalogError>;

    /// Turns for a match, ordered by `idx` ascending (stable for ties).
    fn fetch_turns(&self, match_id: MatchId) -> Result<Vec<Turn>, CatalogError>;

    /// Every snapshot row for a match, in fetch order.
    fn fetch_snapshots(&self, match_id: MatchId) -> Result<Vec<SnapshotRow>, CatalogError>;

    /// Match summaries, newest first, capped at the query's limit.
    fn list_matches(&self, query: &ListQuery) -> Result<Vec<Match>, CatalogError>;
}

/// Filters for `list_matches`. `None` filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub game_key: Option<String>,
    pub game_version: Option<String>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn for_game(game_key: &str, game_version: &str) -> Self {
        Self {
            game_key: Some(game_key.to_string()),
            game_version: Some(game_version.to_string()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit, defaulted to 50 and clamped to [1, 200].
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT) as usize
    }

    pub fn matches(&self, m: &Match) -> bool {
        self.game_key.as_deref().map_or(true, |k| k == m.game_key)
            && self.game_version.as_deref().map_or(true, |v| v == m.game_version)
    }
}

/// Filter, order newest first (ties broken by id, descending) and cap.
pub fn select_recent<I>(matches: I, query: &ListQuery) -> Vec<Match>
where
    I: IntoIterator<Item = Match>,
{
    let mut selected: Vec<Match> = matches.into_iter().filter(|m| query.matches(m)).collect();
    selected.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    selected.truncate(query.effective_limit());
    selected
}

// ---------------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------------

/// Fixture catalog. Inserts are never validated, so callers can model
/// gaps, duplicates, malformed payloads and mid-write logs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    matches: Vec<Match>,
    turns: Vec<Turn>,
    snapshots: Vec<SnapshotRow>,
    next_id: i64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert_match(&mut self, m: Match) {
        self.next_id = self.next_id.max(m.id);
        self.matches.push(m);
    }

    pub fn insert_turn(&mut self, turn: Turn) {
        self.next_id = self.next_id.max(turn.id);
        self.turns.push(turn);
    }

    pub fn insert_snapshot(&mut self, row: SnapshotRow) {
        self.next_id = self.next_id.max(row.id);
        self.snapshots.push(row);
    }

    /// Add a match with a fresh id.
    pub fn add_match(
        &mut self,
        seed: &str,
        game_key: &str,
        game_version: &str,
        status: MatchStatus,
        created_at: DateTime<Utc>,
    ) -> MatchId {
        let id = self.allocate_id();
        self.insert_match(Match {
            id,
            seed: seed.to_string(),
            status,
            game_key: game_key.to_string(),
            game_version: game_version.to_string(),
            created_at,
        });
        id
    }

    /// Add a turn with a fresh id; `action` is stored verbatim.
    pub fn add_turn(&mut self, match_id: MatchId, idx: i64, actor: Actor, action: &str) -> TurnId {
        let id = self.allocate_id();
        self.insert_turn(Turn {
            id,
            match_id,
            idx,
            actor,
            action: action.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    /// Add a snapshot row with a fresh id; `state` is stored verbatim.
    pub fn add_snapshot(&mut self, match_id: MatchId, turn_id: Option<TurnId>, state: Value) -> i64 {
        let id = self.allocate_id();
        self.insert_snapshot(SnapshotRow {
            id,
            match_id,
            turn_id,
            state,
            created_at: Utc::now(),
        });
        id
    }
}

impl MatchCatalog for InMemoryCatalog {
    fn fetch_match(&self, match_id: MatchId) -> Result<Option<Match>, CatalogError> {
        Ok(self.matches.iter().find(|m| m.id == match_id).cloned())
    }

    fn fetch_turns(&self, match_id: MatchId) -> Result<Vec<Turn>, CatalogError> {
        let mut turns: Vec<Turn> = self
            .turns
            .iter()
            .filter(|t| t.match_id == match_id)
            .cloned()
            .collect();
        turns.sort_by_key(|t| t.idx);
        Ok(turns)
    }

    fn fetch_snapshots(&self, match_id: MatchId) -> Result<Vec<SnapshotRow>, CatalogError> {
        Ok(self
            .snapshots
            .iter()
            .filter(|s| s.match_id == match_id)
            .cloned()
            .collect())
    }

    fn list_matches(&self, query: &ListQuery) -> Result<Vec<Match>, CatalogError> {
        Ok(select_recent(self.matches.iter().cloned(), query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(ListQuery::default().effective_limit(), 50);
        assert_eq!(ListQuery::default().with_limit(0).effective_limit(), 1);
        assert_eq!(ListQuery::default().with_limit(500).effective_limit(), 200);
        assert_eq!(ListQuery::default().with_limit(7).effective_limit(), 7);
    }

    #[test]
    fn list_returns_most_recent_for_game() {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_match("a", "tictactoe", "v1", MatchStatus::Finished, at(0));
        let newest = catalog.add_match("b", "tictactoe", "v1", MatchStatus::Running, at(5));
        catalog.add_match("c", "tictactoe", "v2", MatchStatus::Finished, at(9));
        catalog.add_match("d", "connect4", "v1", MatchStatus::Finished, at(10));

        let query = ListQuery::for_game("tictactoe", "v1").with_limit(1);
        let listed = catalog.list_matches(&query).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newest);
    }

    #[test]
    fn unfiltered_list_is_newest_first() {
        let mut catalog = InMemoryCatalog::new();
        let a = catalog.add_match("a", "tictactoe", "v1", MatchStatus::Finished, at(1));
        let b = catalog.add_match("b", "tictactoe", "v1", MatchStatus::Finished, at(3));
        let c = catalog.add_match("c", "tictactoe", "v1", MatchStatus::Finished, at(3));
        let ids: Vec<MatchId> = catalog
            .list_matches(&ListQuery::default())
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn turns_come_back_ordered_by_idx() {
        let mut catalog = InMemoryCatalog::new();
        let m = catalog.add_match("s", "tictactoe", "v1", MatchStatus::Running, at(0));
        catalog.add_turn(m, 1, Actor::AgentB, "{}");
        catalog.add_turn(m, 0, Actor::AgentA, "{}");
        let idxs: Vec<i64> = catalog.fetch_turns(m).unwrap().iter().map(|t| t.idx).collect();
        assert_eq!(idxs, vec![0, 1]);
        assert!(catalog.fetch_turns(m + 100).unwrap().is_empty());
        assert!(catalog.fetch_match(m + 100).unwrap().is_none());
    }
}
