/// Match Kernel — Tic-Tac-Toe Rules (`tictactoe` / `v1`)
///
/// 3×3 grid, agentA (X) moves first, three identical marks on any of
/// the eight winning lines ends the game.

use serde_json::json;

use crate::domain::{
    Action, Actor, Cell, GameEvent, GameState, Grid, Mark, Transition,
};
use crate::rules::{
    ActionSchema, GameDefinition, GameRules, GridShape, IntField, RuleViolation,
};

pub const GAME_KEY: &str = "tictactoe";
pub const GAME_VERSION: &str = "v1";

const SIZE: usize = 3;

/// Rows, columns, then both diagonals.
pub const WINNING_LINES: [[Cell; 3]; 8] = [
    [Cell::new(0, 0), Cell::new(0, 1), Cell::new(0, 2)],
    [Cell::new(1, 0), Cell::new(1, 1), Cell::new(1, 2)],
    [Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2)],
    [Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0)],
    [Cell::new(0, 1), Cell::new(1, 1), Cell::new(2, 1)],
    [Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2)],
    [Cell::new(0, 0), Cell::new(1, 1), Cell::new(2, 2)],
    [Cell::new(0, 2), Cell::new(1, 1), Cell::new(2, 0)],
];

pub struct TicTacToe {
    definition: GameDefinition,
}

impl TicTacToe {
    pub fn new() -> Self {
        let coord = |name: &str| IntField {
            name: name.to_string(),
            min: 0,
            max: SIZE as i64 - 1,
        };
        Self {
            definition: GameDefinition {
                game_key: GAME_KEY.to_string(),
                game_version: GAME_VERSION.to_string(),
                grid: GridShape {
                    rows: SIZE,
                    cols: SIZE,
                },
                action: ActionSchema {
                    tag: "move".to_string(),
                    fields: vec![coord("row"), coord("col")],
                },
                event_types: vec![
                    "game.move_applied".to_string(),
                    "game.win".to_string(),
                    "game.draw".to_string(),
                ],
            },
        }
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl GameRules for TicTacToe {
    fn definition(&self) -> &GameDefinition {
        &self.definition
    }

    fn initial_state(&self, _seed: &str) -> GameState {
        GameState {
            board: Grid::empty(SIZE, SIZE),
            player: Actor::AgentA,
            winner: None,
        }
    }

    fn apply_action(
        &self,
        state: &GameState,
        actor: Actor,
        action: &Action,
    ) -> Result<Transition, RuleViolation> {
        let Action::Move(cell) = *action;

        match state.board.get(cell) {
            None => {
                return Err(RuleViolation::OutOfBounds {
                    row: cell.row,
                    col: cell.col,
                    rows: SIZE,
                    cols: SIZE,
                })
            }
            Some(mark) if !mark.is_empty() => {
                return Err(RuleViolation::CellOccupied {
                    row: cell.row,
                    col: cell.col,
                })
            }
            Some(_) => {}
        }
        if state.winner.is_some() {
            return Err(RuleViolation::GameFinished);
        }
        if actor != state.player {
            return Err(RuleViolation::WrongActor {
                actor,
                expected: state.player,
            });
        }

        let mark = Mark::of(actor);
        let mut next = GameState {
            board: state.board.clone(),
            player: actor.opponent(),
            winner: None,
        };
        next.board.set(cell, mark);

        let mut events = vec![GameEvent::new(
            "game.move_applied",
            json!({"row": cell.row, "col": cell.col, "mark": mark.as_str()}),
        )];

        next.winner = self.detect_winner(&next);
        if let Some(winner) = next.winner {
            events.push(GameEvent::new("game.win", json!({"winner": winner})));
        } else if next.board.is_full() {
            events.push(GameEvent::new("game.draw", json!({})));
        }

        Ok(Transition {
            state: next,
            events,
        })
    }

    fn detect_winner(&self, state: &GameState) -> Option<Actor> {
        WINNING_LINES.iter().find_map(|line| {
            let first = state.board.get(line[0])?;
            let same = line[1..]
                .iter()
                .all(|c| state.board.get(*c) == Some(first));
            if same {
                first.owner()
            } else {
                None
            }
        })
    }
}
