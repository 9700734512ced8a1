/// Match Kernel — Core Domain Types
///
/// Pure data shared by every registered grid game.
/// No rule logic lives here; transitions belong to `games::*`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Actors & Marks ─────────────────────────────────────────────────

/// One of the two fixed participants in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Actor {
    #[serde(rename = "agentA")]
    AgentA,
    #[serde(rename = "agentB")]
    AgentB,
}

impl Actor {
    pub const ALL: [Actor; 2] = [Actor::AgentA, Actor::AgentB];

    pub fn opponent(self) -> Actor {
        match self {
            Actor::AgentA => Actor::AgentB,
            Actor::AgentB => Actor::AgentA,
        }
    }

    /// Persisted spelling (`agentA` / `agentB`).
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::AgentA => "agentA",
            Actor::AgentB => "agentB",
        }
    }

    pub fn parse(raw: &str) -> Option<Actor> {
        match raw {
            "agentA" => Some(Actor::AgentA),
            "agentB" => Some(Actor::AgentB),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of a single grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[default]
    #[serde(rename = " ")]
    Empty,
    #[serde(rename = "X")]
    X,
    #[serde(rename = "O")]
    O,
}

impl Mark {
    /// The mark an actor places: agentA ↦ X, agentB ↦ O.
    pub fn of(actor: Actor) -> Mark {
        match actor {
            Actor::AgentA => Mark::X,
            Actor::AgentB => Mark::O,
        }
    }

    /// The actor owning this mark, `None` for an empty cell.
    pub fn owner(self) -> Option<Actor> {
        match self {
            Mark::Empty => None,
            Mark::X => Some(Actor::AgentA),
            Mark::O => Some(Actor::AgentB),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Mark::Empty
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Empty => " ",
            Mark::X => "X",
            Mark::O => "O",
        }
    }
}

// ── Grid ───────────────────────────────────────────────────────────

/// Zero-based grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Row-major grid of marks. Shape is checked by `invariants`, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<Mark>>,
}

impl Grid {
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![vec![Mark::Empty; cols]; rows],
        }
    }

    pub fn from_rows(rows: Vec<Vec<Mark>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Mark>] {
        &self.rows
    }

    pub fn get(&self, cell: Cell) -> Option<Mark> {
        self.rows.get(cell.row)?.get(cell.col).copied()
    }

    /// Place a mark. Returns false if the cell is outside the grid.
    pub fn set(&mut self, cell: Cell, mark: Mark) -> bool {
        match self.rows.get_mut(cell.row).and_then(|r| r.get_mut(cell.col)) {
            Some(slot) => {
                *slot = mark;
                true
            }
            None => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.rows.iter().flatten().all(|m| !m.is_empty())
    }

    pub fn cells(&self) -> impl Iterator<Item = (Cell, Mark)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, mark)| (Cell::new(r, c), *mark))
        })
    }
}

// ── State ──────────────────────────────────────────────────────────

/// Materialized game state: the grid, who moves next, and the winner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    pub board: Grid,
    pub player: Actor,
    pub winner: Option<Actor>,
}

// ── Actions ────────────────────────────────────────────────────────

/// Typed action. Wire form: `{"type":"move","payload":{"row":r,"col":c}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    Move(Cell),
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Move(_) => "move",
        }
    }
}

// ── Transition Results ─────────────────────────────────────────────

/// Game-level event emitted by a transition (`game.move_applied`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl GameEvent {
    pub fn new(kind: &str, payload: Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}

/// Result of a successful `apply_action`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: GameState,
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "winner", rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Win(Actor),
    Draw,
}

/// Final scores per actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "agentA")]
    pub agent_a: f64,
    #[serde(rename = "agentB")]
    pub agent_b: f64,
}

impl Scores {
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win(Actor::AgentA) => Self { agent_a: 1.0, agent_b: 0.0 },
            Outcome::Win(Actor::AgentB) => Self { agent_a: 0.0, agent_b: 1.0 },
            Outcome::Draw => Self { agent_a: 0.5, agent_b: 0.5 },
            Outcome::InProgress => Self { agent_a: 0.0, agent_b: 0.0 },
        }
    }
}

/// What an actor is shown when it is asked to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub board: Grid,
    pub you: Actor,
}
