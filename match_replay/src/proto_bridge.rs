//! Proto ↔ model conversion bridge.
//!
//! Converts between the on-disk protobuf records (proto_types.rs) and
//! the catalog rows in `model`. Payloads pass through untouched: the
//! action stays raw text, the state stays untyped JSON text.

use chrono::{DateTime, Utc};
use serde_json::Value;

use match_kernel::domain::Actor;

use crate::model::{Match, MatchId, MatchStatus, SnapshotRow, Turn};
use crate::proto_types::*;

// ── Scalars ────────────────────────────────────────────────────

pub fn millis_to_time(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

pub fn time_to_millis(t: &DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn actor_to_proto(actor: Actor) -> ProtoActor {
    match actor {
        Actor::AgentA => ProtoActor::AgentA,
        Actor::AgentB => ProtoActor::AgentB,
    }
}

pub fn proto_to_actor(raw: i32) -> Option<Actor> {
    match ProtoActor::try_from(raw).ok()? {
        ProtoActor::AgentA => Some(Actor::AgentA),
        ProtoActor::AgentB => Some(Actor::AgentB),
        ProtoActor::Unspecified => None,
    }
}

pub fn status_to_proto(status: MatchStatus) -> ProtoMatchStatus {
    match status {
        MatchStatus::Created => ProtoMatchStatus::Created,
        MatchStatus::Running => ProtoMatchStatus::Running,
        MatchStatus::Finished => ProtoMatchStatus::Finished,
        MatchStatus::Error => ProtoMatchStatus::Error,
    }
}

pub fn proto_to_status(raw: i32) -> Option<MatchStatus> {
    match ProtoMatchStatus::try_from(raw).ok()? {
        ProtoMatchStatus::Created => Some(MatchStatus::Created),
        ProtoMatchStatus::Running => Some(MatchStatus::Running),
        ProtoMatchStatus::Finished => Some(MatchStatus::Finished),
        ProtoMatchStatus::Error => Some(MatchStatus::Error),
        ProtoMatchStatus::Unspecified => None,
    }
}

// ── Records ────────────────────────────────────────────────────

pub fn match_to_proto(m: &Match) -> ProtoLogRecord {
    ProtoLogRecord {
        kind: Some(RecordKind::MatchOpened(MatchOpened {
            match_id: m.id,
            seed: m.seed.clone(),
            game_key: m.game_key.clone(),
            game_version: m.game_version.clone(),
            created_at_ms: time_to_millis(&m.created_at),
        })),
    }
}

/// A freshly opened match is always `created`; later status frames
/// advance it.
pub fn proto_to_match(opened: &MatchOpened) -> Result<Match, String> {
    Ok(Match {
        id: opened.match_id,
        seed: opened.seed.clone(),
        status: MatchStatus::Created,
        game_key: opened.game_key.clone(),
        game_version: opened.game_version.clone(),
        created_at: millis_to_time(opened.created_at_ms)
            .ok_or_else(|| format!("timestamp {} out of range", opened.created_at_ms))?,
    })
}

pub fn status_record(status: MatchStatus, at: &DateTime<Utc>) -> ProtoLogRecord {
    ProtoLogRecord {
        kind: Some(RecordKind::StatusChanged(StatusChanged {
            status: status_to_proto(status) as i32,
            changed_at_ms: time_to_millis(at),
        })),
    }
}

pub fn turn_to_proto(turn: &Turn) -> ProtoLogRecord {
    ProtoLogRecord {
        kind: Some(RecordKind::TurnAppended(TurnAppended {
            turn_id: turn.id,
            idx: turn.idx,
            actor: actor_to_proto(turn.actor) as i32,
            action_json: turn.action.clone(),
            created_at_ms: time_to_millis(&turn.created_at),
        })),
    }
}

pub fn proto_to_turn(match_id: MatchId, t: &TurnAppended) -> Result<Turn, String> {
    Ok(Turn {
        id: t.turn_id,
        match_id,
        idx: t.idx,
        actor: proto_to_actor(t.actor)
            .ok_or_else(|| format!("turn {} has unknown actor {}", t.turn_id, t.actor))?,
        action: t.action_json.clone(),
        created_at: millis_to_time(t.created_at_ms)
            .ok_or_else(|| format!("timestamp {} out of range", t.created_at_ms))?,
    })
}

pub fn snapshot_to_proto(row: &SnapshotRow) -> ProtoLogRecord {
    ProtoLogRecord {
        kind: Some(RecordKind::SnapshotTaken(SnapshotTaken {
            snapshot_id: row.id,
            turn_id: row.turn_id,
            state_json: row.state.to_string(),
            created_at_ms: time_to_millis(&row.created_at),
        })),
    }
}

/// State text that no longer parses is kept as a JSON string value so the
/// snapshot index can discard it like any other malformed payload.
pub fn proto_to_snapshot(match_id: MatchId, s: &SnapshotTaken) -> Result<SnapshotRow, String> {
    let state = serde_json::from_str::<Value>(&s.state_json)
        .unwrap_or_else(|_| Value::String(s.state_json.clone()));
    Ok(SnapshotRow {
        id: s.snapshot_id,
        match_id,
        turn_id: s.turn_id,
        state,
        created_at: millis_to_time(s.created_at_ms)
            .ok_or_else(|| format!("timestamp {} out of range", s.created_at_ms))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_enum_values_map_to_none() {
        assert_eq!(proto_to_actor(0), None);
        assert_eq!(proto_to_actor(42), None);
        assert_eq!(proto_to_actor(2), Some(Actor::AgentB));
        assert_eq!(proto_to_status(4), Some(MatchStatus::Error));
        assert_eq!(proto_to_status(9), None);
    }

    #[test]
    fn unparseable_state_text_is_preserved_as_string() {
        let s = SnapshotTaken {
            snapshot_id: 1,
            turn_id: None,
            state_json: "{broken".to_string(),
            created_at_ms: 0,
        };
        let row = proto_to_snapshot(3, &s).unwrap();
        assert_eq!(row.state, Value::String("{broken".to_string()));
        assert_eq!(row.match_id, 3);
    }
}
