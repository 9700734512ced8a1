/// Match Kernel — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing.
/// Produces byte-identical output across platforms.
///
/// Rules:
///   - Field order fixed: kernel_version, board, player, winner
///   - Board rows in row-major order, marks as their persisted strings
///   - UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::GameState;
use crate::KERNEL_VERSION;

/// Canonical serialization of a GameState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &GameState) -> Vec<u8> {
    build_canonical_value(state).to_string().into_bytes()
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &GameState) -> String {
    hex_digest(&canonical_serialize(state))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Build the canonical value in strict field order.
///
/// `serde_json::Map` preserves insertion order (`preserve_order`).
fn build_canonical_value(state: &GameState) -> Value {
    let board: Vec<Value> = state
        .board
        .rows()
        .iter()
        .map(|row| {
            Value::Array(
                row.iter()
                    .map(|m| Value::String(m.as_str().to_string()))
                    .collect(),
            )
        })
        .collect();

    // kernel_version MUST be first — it binds the hash to the rule set.
    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::Number((KERNEL_VERSION as i64).into()),
    );
    root.insert("board".to_string(), Value::Array(board));
    root.insert(
        "player".to_string(),
        Value::String(state.player.as_str().to_string()),
    );
    root.insert(
        "winner".to_string(),
        match state.winner {
            Some(actor) => Value::String(actor.as_str().to_string()),
            None => Value::Null,
        },
    );

    Value::Object(root)
}
