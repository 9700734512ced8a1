//! Replay service — the two query operations exposed to callers.
//!
//! Wires a `MatchCatalog` to the game registry and the replay engine.
//! `get_replay` returns `Ok(None)` for unknown matches; everything
//! recoverable inside a log becomes per-step data, never an `Err`.

use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::info;

use match_kernel::domain::{Action, Actor, GameState};
use match_kernel::registry::GameRegistry;
use match_kernel::rules::GameRules;

use crate::catalog::{CatalogError, ListQuery, MatchCatalog};
use crate::cursor::ReplayCursor;
use crate::drift::{audit_snapshots, SnapshotMismatch};
use crate::model::{Match, MatchId, SnapshotRow, Turn, TurnId};
use crate::replay::{MatchLog, Reconstruction, ReplayEngine, ReplayError, ReplayOptions, Timeline};

/// One entry of the per-turn replay list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub turn_id: TurnId,
    pub idx: i64,
    pub actor: Actor,
    /// `None` when the stored action is malformed.
    pub action: Option<Action>,
    /// Present only where a validated snapshot exists for this turn.
    pub state: Option<GameState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayView {
    #[serde(rename = "match")]
    pub record: Match,
    /// Validated pre-first-turn snapshot, `None` when none was persisted.
    pub initial_state: Option<GameState>,
    pub steps: Vec<ReplayStep>,
}

pub struct ReplayService<C: MatchCatalog> {
    catalog: C,
    registry: GameRegistry,
    options: ReplayOptions,
}

impl<C: MatchCatalog> ReplayService<C> {
    pub fn new(catalog: C, registry: GameRegistry, options: ReplayOptions) -> Self {
        Self {
            catalog,
            registry,
            options,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn into_catalog(self) -> C {
        self.catalog
    }

    pub fn options(&self) -> ReplayOptions {
        self.options
    }

    pub fn list_matches(&self, query: &ListQuery) -> Result<Vec<Match>, ReplayError> {
        let matches = self.catalog.list_matches(query)?;
        info!(
            game_key = ?query.game_key,
            game_version = ?query.game_version,
            limit = query.effective_limit(),
            returned = matches.len(),
            "listed matches"
        );
        Ok(matches)
    }

    pub fn get_replay(&self, match_id: MatchId) -> Result<Option<ReplayView>, ReplayError> {
        let Some((record, _, log)) = self.load(match_id)? else {
            return Ok(None);
        };

        let steps = log
            .turns()
            .iter()
            .map(|turn| ReplayStep {
                turn_id: turn.id,
                idx: turn.idx,
                actor: turn.actor,
                action: turn.action.valid().copied(),
                state: log.snapshots().get(turn.id).cloned(),
            })
            .collect::<Vec<_>>();

        info!(match_id, steps = steps.len(), status = %record.status, "replay served");
        Ok(Some(ReplayView {
            initial_state: log.snapshots().initial().cloned(),
            record,
            steps,
        }))
    }

    pub fn timeline(&self, match_id: MatchId) -> Result<Option<Timeline>, ReplayError> {
        Ok(self.load(match_id)?.map(|(_, rules, log)| {
            ReplayEngine::with_options(rules.as_ref(), self.options).timeline(&log)
        }))
    }

    /// Reconstruct one step; `None` step means before the first turn.
    pub fn state_at(
        &self,
        match_id: MatchId,
        step: Option<usize>,
    ) -> Result<Option<Reconstruction>, ReplayError> {
        Ok(self.load(match_id)?.map(|(_, rules, log)| {
            ReplayEngine::with_options(rules.as_ref(), self.options).reconstruct(&log, step)
        }))
    }

    pub fn cursor(&self, match_id: MatchId) -> Result<Option<ReplayCursor>, ReplayError> {
        Ok(self
            .load(match_id)?
            .map(|(_, rules, log)| ReplayCursor::new(rules, self.options, log)))
    }

    pub fn audit(&self, match_id: MatchId) -> Result<Option<Vec<SnapshotMismatch>>, ReplayError> {
        Ok(self.load(match_id)?.map(|(_, rules, log)| {
            audit_snapshots(&ReplayEngine::with_options(rules.as_ref(), self.options), &log)
        }))
    }

    fn load(&self, match_id: MatchId) -> Result<Option<(Match, Arc<dyn GameRules>, MatchLog)>, ReplayError> {
        let Some(record) = self.catalog.fetch_match(match_id)? else {
            return Ok(None);
        };
        let rules = self
            .registry
            .lookup(&record.game_key, &record.game_version)
            .ok_or_else(|| ReplayError::UnknownGame {
                game_key: record.game_key.clone(),
                game_version: record.game_version.clone(),
            })?;

        let (turns, snapshots) = self.fetch_rows(match_id)?;
        let log = MatchLog::assemble(&record, turns, &snapshots, rules.as_ref(), self.options.sequence)?;
        Ok(Some((record, rules, log)))
    }

    /// Turns and snapshots are independent reads; issue them together.
    fn fetch_rows(&self, match_id: MatchId) -> Result<(Vec<Turn>, Vec<SnapshotRow>), CatalogError> {
        let catalog = &self.catalog;
        thread::scope(|s| {
            let snapshots = s.spawn(move || catalog.fetch_snapshots(match_id));
            let turns = catalog.fetch_turns(match_id)?;
            let snapshots = snapshots
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
            Ok((turns, snapshots))
        })
    }
}
