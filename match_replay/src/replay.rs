//! Replay engine — reconstruct match state from the turn log.
//!
//! All rule logic is delegated to the kernel's `GameRules`.
//! The engine is a pure function of its inputs: no I/O, no hidden
//! state, no locking. Identical inputs give identical output.
//!
//! Per turn, in ascending idx order:
//!   1. authoritative snapshot for this turn → take it as-is
//!   2. valid action → `apply_action`, then recompute the winner
//!   3. malformed action → state unchanged (no-op step)
//! Illegal actions (occupied cell, wrong actor, ...) also leave the
//! state unchanged and flag the step as divergent.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use match_kernel::domain::{Action, Actor, GameState};
use match_kernel::hashing::{canonical_hash, hex_digest};
use match_kernel::rules::{GameRules, RuleViolation};
use match_kernel::validator::{ActionError, ActionValidator, ParsedAction};

use crate::catalog::CatalogError;
use crate::model::{Match, MatchId, SnapshotRow, Turn, TurnId};
use crate::snapshot::SnapshotIndex;

// ---------------------------------------------------------------------------
// Policies & errors
// ---------------------------------------------------------------------------

/// How turn index anomalies are handled when a log is assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SequencePolicy {
    /// idx must be strictly increasing and contiguous; anything else
    /// makes the match unreplayable.
    #[default]
    Strict,
    /// Keep fetch order for duplicates, tolerate gaps, log each anomaly.
    Lenient,
}

/// Whether a malformed action marks the whole replay as divergent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidActionPolicy {
    /// Malformed actions are silent no-op steps.
    #[default]
    Skip,
    /// Malformed actions are no-op steps and flag the replay divergent.
    MarkDivergent,
}

impl FromStr for SequencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(SequencePolicy::Strict),
            "lenient" => Ok(SequencePolicy::Lenient),
            other => Err(format!("expected strict|lenient, got {:?}", other)),
        }
    }
}

impl FromStr for InvalidActionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(InvalidActionPolicy::Skip),
            "divergent" => Ok(InvalidActionPolicy::MarkDivergent),
            other => Err(format!("expected skip|divergent, got {:?}", other)),
        }
    }
}

impl fmt::Display for SequencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SequencePolicy::Strict => "strict",
            SequencePolicy::Lenient => "lenient",
        })
    }
}

impl fmt::Display for InvalidActionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidActionPolicy::Skip => "skip",
            InvalidActionPolicy::MarkDivergent => "divergent",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    pub sequence: SequencePolicy,
    pub invalid_actions: InvalidActionPolicy,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("turn log of match {match_id} is corrupt: {detail}")]
    CorruptLog { match_id: MatchId, detail: String },
    #[error("no rules registered for {game_key}/{game_version}")]
    UnknownGame {
        game_key: String,
        game_version: String,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Assembled log
// ---------------------------------------------------------------------------

/// One turn with its action already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayTurn {
    pub id: TurnId,
    pub idx: i64,
    pub actor: Actor,
    pub action: ParsedAction,
}

/// Everything reconstruction needs for one match, validated once.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchLog {
    match_id: MatchId,
    seed: String,
    turns: Vec<ReplayTurn>,
    snapshots: SnapshotIndex,
}

impl MatchLog {
    /// Order turns, apply the sequence policy, validate every action and
    /// index every snapshot against the game's definition.
    pub fn assemble(
        record: &Match,
        mut turns: Vec<Turn>,
        snapshot_rows: &[SnapshotRow],
        rules: &dyn GameRules,
        policy: SequencePolicy,
    ) -> Result<Self, ReplayError> {
        turns.sort_by_key(|t| t.idx);
        check_sequence(record.id, &turns, policy)?;

        let validator = ActionValidator::new(rules.definition());
        let turns = turns
            .iter()
            .map(|t| ReplayTurn {
                id: t.id,
                idx: t.idx,
                actor: t.actor,
                action: validator.parse(&t.action),
            })
            .collect();

        Ok(Self {
            match_id: record.id,
            seed: record.seed.clone(),
            turns,
            snapshots: SnapshotIndex::build(snapshot_rows, rules.definition()),
        })
    }

    /// Build directly from already-typed parts.
    pub fn from_parts(
        match_id: MatchId,
        seed: &str,
        turns: Vec<ReplayTurn>,
        snapshots: SnapshotIndex,
    ) -> Self {
        Self {
            match_id,
            seed: seed.to_string(),
            turns,
            snapshots,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn turns(&self) -> &[ReplayTurn] {
        &self.turns
    }

    pub fn snapshots(&self) -> &SnapshotIndex {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Same log with only the initial snapshot kept, so every step is
    /// derived from actions.
    pub fn without_turn_snapshots(&self) -> Self {
        Self {
            snapshots: self.snapshots.initial_only(),
            ..self.clone()
        }
    }
}

fn check_sequence(match_id: MatchId, turns: &[Turn], policy: SequencePolicy) -> Result<(), ReplayError> {
    for pair in turns.windows(2) {
        let (prev, next) = (pair[0].idx, pair[1].idx);
        if prev.checked_add(1) == Some(next) {
            continue;
        }
        let detail = if next == prev {
            format!("duplicate idx {}", next)
        } else {
            format!("gap between idx {} and {}", prev, next)
        };
        match policy {
            SequencePolicy::Strict => return Err(ReplayError::CorruptLog { match_id, detail }),
            SequencePolicy::Lenient => warn!(match_id, %detail, "tolerating turn sequence anomaly"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// What happened to the state at one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The action was applied by the rules.
    Applied,
    /// A persisted snapshot for this turn was taken as-is.
    SnapshotOverride,
    /// The stored action was malformed; state unchanged.
    SkippedInvalid { reason: ActionError },
    /// The action was well-formed but illegal; state unchanged.
    Rejected { violation: RuleViolation },
}

impl StepOutcome {
    /// Whether this step makes the replay divergent under `policy`.
    pub fn is_divergent(&self, policy: InvalidActionPolicy) -> bool {
        match self {
            StepOutcome::Rejected { .. } => true,
            StepOutcome::SkippedInvalid { .. } => policy == InvalidActionPolicy::MarkDivergent,
            StepOutcome::Applied | StepOutcome::SnapshotOverride => false,
        }
    }
}

/// State at a requested step, plus derived fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconstruction {
    /// Positional step reached; `None` means before the first turn.
    pub step: Option<usize>,
    pub state: GameState,
    pub player: Actor,
    pub winner: Option<Actor>,
    /// Outcome of the last applied step, `None` at the initial state.
    pub outcome: Option<StepOutcome>,
    /// True if any step up to `step` was divergent.
    pub divergent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub turn_id: TurnId,
    pub idx: i64,
    pub actor: Actor,
    pub action: Option<Action>,
    pub state: GameState,
    pub outcome: StepOutcome,
    pub hash: String,
}

/// Full scrub track: state after every turn, computed in one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub initial: GameState,
    pub initial_hash: String,
    pub steps: Vec<TimelineStep>,
    pub divergent: bool,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// State at a positional step; clamps past the end.
    pub fn state_at(&self, step: Option<usize>) -> &GameState {
        match clamp_step(step, self.steps.len()) {
            Some(i) => &self.steps[i].state,
            None => &self.initial,
        }
    }

    /// SHA-256 over the initial hash and every step hash, in order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.initial_hash.as_bytes());
        for step in &self.steps {
            hasher.update(step.hash.as_bytes());
        }
        hex_digest(&hasher.finalize())
    }
}

/// Clamp a positional step to the available turns. An empty log only
/// has the initial state.
pub fn clamp_step(step: Option<usize>, len: usize) -> Option<usize> {
    match (step, len) {
        (_, 0) | (None, _) => None,
        (Some(i), len) => Some(i.min(len - 1)),
    }
}

/// Convert the signed step convention (−1 = before the first turn).
pub fn step_from_signed(step: i64) -> Option<usize> {
    usize::try_from(step).ok()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless reconstruction over one game's rules.
pub struct ReplayEngine<'r> {
    rules: &'r dyn GameRules,
    options: ReplayOptions,
}

impl<'r> ReplayEngine<'r> {
    pub fn new(rules: &'r dyn GameRules) -> Self {
        Self::with_options(rules, ReplayOptions::default())
    }

    pub fn with_options(rules: &'r dyn GameRules, options: ReplayOptions) -> Self {
        Self { rules, options }
    }

    pub fn options(&self) -> ReplayOptions {
        self.options
    }

    /// Initial snapshot if one was persisted, else the rules' default.
    pub fn start_state(&self, log: &MatchLog) -> GameState {
        match log.snapshots().initial() {
            Some(state) => state.clone(),
            None => self.rules.initial_state(log.seed()),
        }
    }

    /// Advance one turn from `state`.
    pub fn step(
        &self,
        state: &GameState,
        turn: &ReplayTurn,
        snapshots: &SnapshotIndex,
    ) -> (GameState, StepOutcome) {
        if let Some(snap) = snapshots.get(turn.id) {
            return (snap.clone(), StepOutcome::SnapshotOverride);
        }

        let action = match &turn.action {
            ParsedAction::Valid(action) => action,
            ParsedAction::Invalid(reason) => {
                debug!(turn_id = turn.id, idx = turn.idx, %reason, "skipping malformed action");
                return (
                    state.clone(),
                    StepOutcome::SkippedInvalid {
                        reason: reason.clone(),
                    },
                );
            }
        };

        match self.rules.apply_action(state, turn.actor, action) {
            Ok(transition) => {
                let mut next = transition.state;
                next.winner = self.rules.detect_winner(&next);
                (next, StepOutcome::Applied)
            }
            Err(violation) => {
                warn!(turn_id = turn.id, idx = turn.idx, %violation, "illegal action in log; step is divergent");
                (state.clone(), StepOutcome::Rejected { violation })
            }
        }
    }

    /// State after the turn at positional `step` (`None` = no turns
    /// applied). Steps past the end clamp to the last turn.
    pub fn reconstruct(&self, log: &MatchLog, step: Option<usize>) -> Reconstruction {
        let step = clamp_step(step, log.len());
        let mut state = self.start_state(log);
        let mut outcome = None;
        let mut divergent = false;

        if let Some(last) = step {
            for turn in &log.turns()[..=last] {
                let (next, result) = self.step(&state, turn, log.snapshots());
                divergent |= result.is_divergent(self.options.invalid_actions);
                state = next;
                outcome = Some(result);
            }
        }

        Reconstruction {
            step,
            player: state.player,
            winner: state.winner,
            state,
            outcome,
            divergent,
        }
    }

    /// State after every turn, in one pass.
    pub fn timeline(&self, log: &MatchLog) -> Timeline {
        let initial = self.start_state(log);
        let initial_hash = canonical_hash(&initial);
        let mut steps = Vec::with_capacity(log.len());
        let mut divergent = false;
        let mut state = initial.clone();

        for turn in log.turns() {
            let (next, outcome) = self.step(&state, turn, log.snapshots());
            divergent |= outcome.is_divergent(self.options.invalid_actions);
            steps.push(TimelineStep {
                turn_id: turn.id,
                idx: turn.idx,
                actor: turn.actor,
                action: turn.action.valid().copied(),
                hash: canonical_hash(&next),
                state: next.clone(),
                outcome,
            });
            state = next;
        }

        Timeline {
            initial,
            initial_hash,
            steps,
            divergent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use match_kernel::domain::{Cell, Mark};
    use match_kernel::games::TicTacToe;
    use crate::model::MatchStatus;

    fn record() -> Match {
        Match {
            id: 1,
            seed: "seed".to_string(),
            status: MatchStatus::Finished,
            game_key: "tictactoe".to_string(),
            game_version: "v1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn turn(id: TurnId, idx: i64, actor: Actor, action: &str) -> Turn {
        Turn {
            id,
            match_id: 1,
            idx,
            actor,
            action: action.to_string(),
            created_at: Utc::now(),
        }
    }

    fn mv(row: usize, col: usize) -> String {
        format!(r#"{{"type":"move","payload":{{"row":{},"col":{}}}}}"#, row, col)
    }

    #[test]
    fn strict_policy_rejects_gaps_and_duplicates() {
        let rules = TicTacToe::new();
        let gap = vec![turn(1, 0, Actor::AgentA, "{}"), turn(2, 2, Actor::AgentB, "{}")];
        assert!(matches!(
            MatchLog::assemble(&record(), gap, &[], &rules, SequencePolicy::Strict),
            Err(ReplayError::CorruptLog { .. })
        ));
        let dup = vec![turn(1, 0, Actor::AgentA, "{}"), turn(2, 0, Actor::AgentB, "{}")];
        assert!(MatchLog::assemble(&record(), dup, &[], &rules, SequencePolicy::Strict).is_err());
    }

    #[test]
    fn idx_at_integer_limit_is_an_anomaly_not_a_panic() {
        let rules = TicTacToe::new();
        let turns = || {
            vec![
                turn(1, i64::MAX, Actor::AgentA, &mv(0, 0)),
                turn(2, i64::MAX, Actor::AgentB, &mv(1, 1)),
            ]
        };
        assert!(matches!(
            MatchLog::assemble(&record(), turns(), &[], &rules, SequencePolicy::Strict),
            Err(ReplayError::CorruptLog { .. })
        ));
        let log = MatchLog::assemble(&record(), turns(), &[], &rules, SequencePolicy::Lenient).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn lenient_policy_keeps_fetch_order_for_duplicates() {
        let rules = TicTacToe::new();
        let dup = vec![
            turn(1, 0, Actor::AgentA, &mv(0, 0)),
            turn(2, 0, Actor::AgentB, &mv(1, 1)),
        ];
        let log = MatchLog::assemble(&record(), dup, &[], &rules, SequencePolicy::Lenient).unwrap();
        let ids: Vec<TurnId> = log.turns().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn one_based_contiguous_log_is_accepted() {
        let rules = TicTacToe::new();
        let turns = vec![
            turn(1, 1, Actor::AgentA, &mv(0, 0)),
            turn(2, 2, Actor::AgentB, &mv(1, 1)),
        ];
        let log = MatchLog::assemble(&record(), turns, &[], &rules, SequencePolicy::Strict).unwrap();
        let r = ReplayEngine::new(&rules).reconstruct(&log, Some(1));
        assert_eq!(r.state.board.get(Cell::new(1, 1)), Some(Mark::O));
    }

    #[test]
    fn illegal_action_is_rejected_and_divergent() {
        let rules = TicTacToe::new();
        let turns = vec![
            turn(1, 0, Actor::AgentA, &mv(0, 0)),
            turn(2, 1, Actor::AgentB, &mv(0, 0)),
        ];
        let log = MatchLog::assemble(&record(), turns, &[], &rules, SequencePolicy::Strict).unwrap();
        let engine = ReplayEngine::new(&rules);
        let before = engine.reconstruct(&log, Some(0));
        let after = engine.reconstruct(&log, Some(1));
        assert_eq!(before.state, after.state);
        assert!(after.divergent);
        assert!(matches!(after.outcome, Some(StepOutcome::Rejected { .. })));
    }

    #[test]
    fn malformed_action_divergence_follows_policy() {
        let rules = TicTacToe::new();
        let turns = vec![turn(1, 0, Actor::AgentA, "garbage")];
        let log = MatchLog::assemble(&record(), turns, &[], &rules, SequencePolicy::Strict).unwrap();

        let skip = ReplayEngine::new(&rules).reconstruct(&log, Some(0));
        assert!(!skip.divergent);
        assert!(matches!(skip.outcome, Some(StepOutcome::SkippedInvalid { .. })));

        let strict = ReplayEngine::with_options(
            &rules,
            ReplayOptions {
                invalid_actions: InvalidActionPolicy::MarkDivergent,
                ..ReplayOptions::default()
            },
        )
        .reconstruct(&log, Some(0));
        assert!(strict.divergent);
    }

    #[test]
    fn step_past_end_clamps() {
        assert_eq!(clamp_step(Some(10), 3), Some(2));
        assert_eq!(clamp_step(Some(0), 0), None);
        assert_eq!(clamp_step(None, 5), None);
        assert_eq!(step_from_signed(-1), None);
        assert_eq!(step_from_signed(4), Some(4));
    }

    #[test]
    fn policies_parse_from_config_strings() {
        assert_eq!("lenient".parse::<SequencePolicy>(), Ok(SequencePolicy::Lenient));
        assert_eq!(
            "divergent".parse::<InvalidActionPolicy>(),
            Ok(InvalidActionPolicy::MarkDivergent)
        );
        assert!("sometimes".parse::<SequencePolicy>().is_err());
    }
}
