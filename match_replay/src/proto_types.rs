//! Hand-written protobuf types for the per-match log file.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the on-disk format; never renumber.

use prost::Message;

// ── Enumerations ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoActor {
    Unspecified = 0,
    AgentA = 1,
    AgentB = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoMatchStatus {
    Unspecified = 0,
    Created = 1,
    Running = 2,
    Finished = 3,
    Error = 4,
}

// ── Log record ─────────────────────────────────────────────────

/// One frame of a match log.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoLogRecord {
    #[prost(oneof = "RecordKind", tags = "1, 2, 3, 4")]
    pub kind: Option<RecordKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum RecordKind {
    #[prost(message, tag = "1")]
    MatchOpened(MatchOpened),
    #[prost(message, tag = "2")]
    StatusChanged(StatusChanged),
    #[prost(message, tag = "3")]
    TurnAppended(TurnAppended),
    #[prost(message, tag = "4")]
    SnapshotTaken(SnapshotTaken),
}

// ── Record bodies ──────────────────────────────────────────────

/// Always the first frame of a log.
#[derive(Clone, PartialEq, Message)]
pub struct MatchOpened {
    #[prost(int64, tag = "1")]
    pub match_id: i64,
    #[prost(string, tag = "2")]
    pub seed: String,
    #[prost(string, tag = "3")]
    pub game_key: String,
    #[prost(string, tag = "4")]
    pub game_version: String,
    #[prost(int64, tag = "5")]
    pub created_at_ms: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusChanged {
    #[prost(enumeration = "ProtoMatchStatus", tag = "1")]
    pub status: i32,
    #[prost(int64, tag = "2")]
    pub changed_at_ms: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TurnAppended {
    #[prost(int64, tag = "1")]
    pub turn_id: i64,
    #[prost(int64, tag = "2")]
    pub idx: i64,
    #[prost(enumeration = "ProtoActor", tag = "3")]
    pub actor: i32,
    /// Raw action payload, stored verbatim.
    #[prost(string, tag = "4")]
    pub action_json: String,
    #[prost(int64, tag = "5")]
    pub created_at_ms: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SnapshotTaken {
    #[prost(int64, tag = "1")]
    pub snapshot_id: i64,
    /// Absent for the pre-first-turn snapshot.
    #[prost(int64, optional, tag = "2")]
    pub turn_id: Option<i64>,
    /// Materialized state payload, stored verbatim.
    #[prost(string, tag = "3")]
    pub state_json: String,
    #[prost(int64, tag = "4")]
    pub created_at_ms: i64,
}
