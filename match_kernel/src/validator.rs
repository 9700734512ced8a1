/// Match Kernel — Payload Validation
///
/// The only place untyped persisted JSON becomes typed kernel values.
/// Actions are checked against the game's declared `ActionSchema` and the
/// typed `Action` is built from the declared fields only;
/// states are decoded and run through `invariants`.
///
/// Action failures are returned as an explicit `ParsedAction::Invalid`
/// marker so one bad record never aborts a replay.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Action, GameState};
use crate::invariants::try_validate_state;
use crate::rules::GameDefinition;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a raw action payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ActionError {
    #[error("action payload is not valid JSON: {0}")]
    Unparseable(String),
    #[error("action payload is not a JSON object")]
    NotAnObject,
    #[error("expected action type {expected:?}, found {found:?}")]
    WrongTag {
        expected: String,
        found: Option<String>,
    },
    #[error("action has no payload object")]
    MissingPayload,
    #[error("action payload field {0:?} is missing")]
    MissingField(String),
    #[error("action payload field {0:?} is not an integer")]
    NotAnInteger(String),
    #[error("action payload field {field:?} = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Why a persisted state payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state payload malformed: {0}")]
    Malformed(String),
    #[error("{0}")]
    InvariantViolation(String),
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Outcome of validating one stored action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    Valid(Action),
    Invalid(ActionError),
}

impl ParsedAction {
    pub fn valid(&self) -> Option<&Action> {
        match self {
            ParsedAction::Valid(action) => Some(action),
            ParsedAction::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ParsedAction::Valid(_))
    }
}

impl From<Result<Action, ActionError>> for ParsedAction {
    fn from(result: Result<Action, ActionError>) -> Self {
        match result {
            Ok(action) => ParsedAction::Valid(action),
            Err(err) => ParsedAction::Invalid(err),
        }
    }
}

/// Schema-driven action validator for one game definition.
pub struct ActionValidator<'a> {
    definition: &'a GameDefinition,
}

impl<'a> ActionValidator<'a> {
    pub fn new(definition: &'a GameDefinition) -> Self {
        Self { definition }
    }

    /// Parse a raw stored action (JSON text) and validate it.
    pub fn parse(&self, raw: &str) -> ParsedAction {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.check(&value).into(),
            Err(e) => ParsedAction::Invalid(ActionError::Unparseable(e.to_string())),
        }
    }

    /// Validate an already-decoded JSON value.
    pub fn validate(&self, value: &Value) -> ParsedAction {
        self.check(value).into()
    }

    fn check(&self, value: &Value) -> Result<Action, ActionError> {
        let schema = &self.definition.action;
        let obj = value.as_object().ok_or(ActionError::NotAnObject)?;

        let tag = obj.get("type").and_then(Value::as_str);
        if tag != Some(schema.tag.as_str()) {
            return Err(ActionError::WrongTag {
                expected: schema.tag.clone(),
                found: tag.map(str::to_string),
            });
        }

        let payload = obj
            .get("payload")
            .and_then(Value::as_object)
            .ok_or(ActionError::MissingPayload)?;

        let mut normalized = serde_json::Map::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let raw = payload
                .get(&field.name)
                .ok_or_else(|| ActionError::MissingField(field.name.clone()))?;
            let value = integral(raw).ok_or_else(|| ActionError::NotAnInteger(field.name.clone()))?;
            if value < field.min || value > field.max {
                return Err(ActionError::OutOfRange {
                    field: field.name.clone(),
                    value,
                    min: field.min,
                    max: field.max,
                });
            }
            normalized.insert(field.name.clone(), Value::from(value));
        }

        // Only declared fields reach the typed action; extras are ignored.
        let typed = serde_json::json!({ "type": schema.tag, "payload": normalized });
        serde_json::from_value(typed).map_err(|e| ActionError::Unparseable(e.to_string()))
    }
}

/// Integer value of a JSON number, accepting integral floats such as `1.0`.
fn integral(raw: &Value) -> Option<i64> {
    if let Some(v) = raw.as_i64() {
        return Some(v);
    }
    let f = raw.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Decode a persisted state payload and check it structurally against
/// the game definition.
pub fn validate_state(definition: &GameDefinition, raw: &Value) -> Result<GameState, StateError> {
    let state: GameState = serde_json::from_value(raw.clone())
        .map_err(|e| StateError::Malformed(e.to_string()))?;
    try_validate_state(&state, definition.grid).map_err(StateError::InvariantViolation)?;
    Ok(state)
}
