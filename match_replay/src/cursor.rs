//! Replay cursor — interactive scrubbing over one assembled match.
//!
//! Holds the current position and state. Moving forward applies one
//! step. Moving backward never runs rules in reverse: it restarts from
//! the nearest persisted snapshot at or before the target and replays
//! forward from there.
//!
//! The cumulative divergent flag per position is computed once on
//! construction, so it stays correct however the position was reached.

use std::sync::Arc;

use match_kernel::domain::{GameState, Outcome};
use match_kernel::rules::GameRules;

use crate::replay::{clamp_step, MatchLog, ReplayEngine, ReplayOptions, StepOutcome};

pub struct ReplayCursor {
    rules: Arc<dyn GameRules>,
    options: ReplayOptions,
    log: MatchLog,
    position: Option<usize>,
    state: GameState,
    last: Option<StepOutcome>,
    /// `divergent_through[i]`: some step in `0..=i` was divergent.
    divergent_through: Vec<bool>,
}

impl ReplayCursor {
    /// Cursor positioned before the first turn.
    pub fn new(rules: Arc<dyn GameRules>, options: ReplayOptions, log: MatchLog) -> Self {
        let engine = ReplayEngine::with_options(rules.as_ref(), options);
        let state = engine.start_state(&log);
        let divergent_through = engine
            .timeline(&log)
            .steps
            .iter()
            .scan(false, |seen, step| {
                *seen |= step.outcome.is_divergent(options.invalid_actions);
                Some(*seen)
            })
            .collect();
        Self {
            rules,
            options,
            log,
            position: None,
            state,
            last: None,
            divergent_through,
        }
    }

    pub fn log(&self) -> &MatchLog {
        &self.log
    }

    /// Current positional step; `None` before the first turn.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// How the current state was reached; `None` at the initial state.
    pub fn last_step(&self) -> Option<&StepOutcome> {
        self.last.as_ref()
    }

    /// True if any step up to the current position was divergent.
    pub fn divergent(&self) -> bool {
        self.position
            .and_then(|i| self.divergent_through.get(i).copied())
            .unwrap_or(false)
    }

    pub fn outcome(&self) -> Outcome {
        self.rules.outcome(&self.state)
    }

    pub fn at_end(&self) -> bool {
        match (self.position, self.log.len()) {
            (_, 0) => true,
            (Some(i), len) => i + 1 >= len,
            (None, _) => false,
        }
    }

    /// Apply the next turn. Returns false when already at the last turn.
    pub fn forward(&mut self) -> bool {
        if self.at_end() {
            return false;
        }
        let next = self.position.map_or(0, |i| i + 1);
        let engine = ReplayEngine::with_options(self.rules.as_ref(), self.options);
        let (state, outcome) = engine.step(&self.state, &self.log.turns()[next], self.log.snapshots());
        self.state = state;
        self.last = Some(outcome);
        self.position = Some(next);
        true
    }

    /// Step back one turn. Returns false when already at the initial state.
    pub fn back(&mut self) -> bool {
        match self.position {
            None => false,
            Some(0) => {
                self.rewind();
                true
            }
            Some(i) => {
                self.seek(Some(i - 1));
                true
            }
        }
    }

    pub fn first(&mut self) {
        self.rewind();
    }

    pub fn last(&mut self) {
        self.seek(Some(usize::MAX));
    }

    /// Jump to a positional step, clamped to the log.
    pub fn seek(&mut self, step: Option<usize>) {
        let target = clamp_step(step, self.log.len());
        match (target, self.position) {
            (None, _) => self.rewind(),
            (Some(t), Some(p)) if t >= p => {
                while self.position != Some(t) && self.forward() {}
            }
            (Some(t), _) => {
                self.restart_before(t);
                while self.position != Some(t) && self.forward() {}
            }
        }
    }

    fn rewind(&mut self) {
        self.state = ReplayEngine::with_options(self.rules.as_ref(), self.options).start_state(&self.log);
        self.position = None;
        self.last = None;
    }

    /// Move to the latest snapshot at or before `target`, or to the start.
    fn restart_before(&mut self, target: usize) {
        let turns = self.log.turns();
        let anchor = (0..=target)
            .rev()
            .find_map(|i| self.log.snapshots().get(turns[i].id).map(|s| (i, s.clone())));
        match anchor {
            Some((i, state)) => {
                self.state = state;
                self.position = Some(i);
                self.last = Some(StepOutcome::SnapshotOverride);
            }
            None => self.rewind(),
        }
    }
}
