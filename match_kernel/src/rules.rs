/// Match Kernel — Rules Capability
///
/// Every game plugs in through `GameRules`. The replay runtime never
/// branches on a game name; it looks rules up by (game_key, game_version)
/// in the registry and calls through this trait.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::{
    Action, Actor, GameState, Observation, Outcome, Scores, Transition,
};

// ---------------------------------------------------------------------------
// Rule violations
// ---------------------------------------------------------------------------

/// A well-formed action that the rules refuse in the given state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleViolation {
    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },
    #[error("{actor} moved but {expected} is to play")]
    WrongActor { actor: Actor, expected: Actor },
    #[error("game already finished")]
    GameFinished,
}

// ---------------------------------------------------------------------------
// Game definition (registry row)
// ---------------------------------------------------------------------------

/// Inclusive integer bounds for one action payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntField {
    pub name: String,
    pub min: i64,
    pub max: i64,
}

/// Declared action shape: `{"type": <tag>, "payload": {<fields>}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub tag: String,
    pub fields: Vec<IntField>,
}

impl ActionSchema {
    pub fn field(&self, name: &str) -> Option<&IntField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Declared state shape: grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

/// Registry entry describing a pluggable game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDefinition {
    pub game_key: String,
    pub game_version: String,
    pub grid: GridShape,
    pub action: ActionSchema,
    /// Event types the rules may emit.
    pub event_types: Vec<String>,
}

/// JSON-Schema documents for every payload kind of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSet {
    pub state: Value,
    pub action: Value,
    pub observation: Value,
    pub event: Value,
}

impl GameDefinition {
    /// Combined id, e.g. `tictactoe/v1`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.game_key, self.game_version)
    }

    /// Export the declared shapes as JSON-Schema documents.
    pub fn schemas(&self) -> SchemaSet {
        let actor = json!({"type": "string", "enum": ["agentA", "agentB"]});
        let mark = json!({"type": "string", "enum": ["X", "O", " "]});
        let row = json!({
            "type": "array",
            "items": mark,
            "minItems": self.grid.cols,
            "maxItems": self.grid.cols,
        });
        let board = json!({
            "type": "array",
            "items": row,
            "minItems": self.grid.rows,
            "maxItems": self.grid.rows,
        });

        let mut payload_props = serde_json::Map::new();
        for f in &self.action.fields {
            payload_props.insert(
                f.name.clone(),
                json!({"type": "integer", "minimum": f.min, "maximum": f.max}),
            );
        }
        let required: Vec<&str> = self.action.fields.iter().map(|f| f.name.as_str()).collect();

        SchemaSet {
            state: json!({
                "title": format!("{} state", self.id()),
                "type": "object",
                "properties": {
                    "board": board,
                    "player": actor,
                    "winner": {"anyOf": [actor, {"type": "null"}]},
                },
                "required": ["board", "player", "winner"],
            }),
            action: json!({
                "title": format!("{} action", self.id()),
                "type": "object",
                "properties": {
                    "type": {"const": self.action.tag},
                    "payload": {
                        "type": "object",
                        "properties": Value::Object(payload_props),
                        "required": required,
                    },
                },
                "required": ["type", "payload"],
            }),
            observation: json!({
                "title": format!("{} observation", self.id()),
                "type": "object",
                "properties": {"board": board, "you": actor},
                "required": ["board", "you"],
            }),
            event: json!({
                "title": format!("{} event", self.id()),
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": self.event_types},
                    "payload": {"type": "object"},
                },
                "required": ["type", "payload"],
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules trait
// ---------------------------------------------------------------------------

/// Pure per-game rule table. Implementations must be deterministic:
/// the same inputs always produce the same outputs.
pub trait GameRules: Send + Sync {
    fn definition(&self) -> &GameDefinition;

    /// Fresh state before any turn. The seed is carried for games that
    /// need it; grid games may ignore it.
    fn initial_state(&self, seed: &str) -> GameState;

    /// Apply `action` for `actor`, returning the next state and the
    /// events the move produced. The input state is never mutated.
    fn apply_action(
        &self,
        state: &GameState,
        actor: Actor,
        action: &Action,
    ) -> Result<Transition, RuleViolation>;

    fn detect_winner(&self, state: &GameState) -> Option<Actor>;

    fn is_terminal(&self, state: &GameState) -> bool {
        state.winner.is_some() || state.board.is_full()
    }

    fn outcome(&self, state: &GameState) -> Outcome {
        match state.winner {
            Some(actor) => Outcome::Win(actor),
            None if state.board.is_full() => Outcome::Draw,
            None => Outcome::InProgress,
        }
    }

    fn score(&self, state: &GameState) -> Scores {
        Scores::from_outcome(self.outcome(state))
    }

    fn observation_for(&self, state: &GameState, actor: Actor) -> Observation {
        Observation {
            board: state.board.clone(),
            you: actor,
        }
    }
}
