//! Append-only match log store — one binary protobuf log per match.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Layout: `<dir>/match_<id:06>.log`, first frame always `MatchOpened`.
//!
//! Rules:
//!   - Strict append only — no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Turn idx contiguous per match (validated on append)
//!   - Status moves forward only; nothing is appended after finished/error
//!
//! Reading folds the frames back into catalog rows, so this store is
//! also a `MatchCatalog`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use prost::Message;
use serde_json::Value;
use tracing::{debug, warn};

use match_kernel::domain::Actor;

use crate::catalog::{select_recent, CatalogError, ListQuery, MatchCatalog};
use crate::model::{Match, MatchId, MatchStatus, SnapshotRow, Turn, TurnId};
use crate::proto_bridge::{
    match_to_proto, proto_to_match, proto_to_snapshot, proto_to_status, proto_to_turn,
    snapshot_to_proto, status_record, turn_to_proto,
};
use crate::proto_types::{ProtoLogRecord, RecordKind};

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A match log folded back into rows.
#[derive(Debug, Clone)]
pub struct FoldedMatch {
    pub record: Match,
    pub turns: Vec<Turn>,
    pub snapshots: Vec<SnapshotRow>,
}

/// Directory of append-only match logs.
pub struct MatchLogStore {
    dir: PathBuf,
    last_id: i64,
}

impl MatchLogStore {
    /// Open or create a store at the given directory.
    /// Scans existing logs to find the highest id handed out so far.
    /// A corrupt log does not block the store: its readable prefix and
    /// file name still count toward the id scan.
    pub fn open(dir: &Path) -> Result<Self, CatalogError> {
        fs::create_dir_all(dir)?;

        let mut last_id = 0;
        for path in Self::log_paths(dir)? {
            let highest = match Self::fold(&path) {
                Ok(folded) => folded
                    .turns
                    .iter()
                    .map(|t| t.id)
                    .chain(folded.snapshots.iter().map(|s| s.id))
                    .fold(folded.record.id, i64::max),
                Err(CatalogError::Corrupt { detail, .. }) => {
                    warn!(path = %path.display(), %detail, "corrupt match log; skipping");
                    Self::salvage_highest_id(&path)?
                }
                Err(e) => return Err(e),
            };
            last_id = last_id.max(highest);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            last_id,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn allocate_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn path_for(&self, match_id: MatchId) -> PathBuf {
        self.dir.join(format!("match_{:06}.log", match_id))
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Open a new match in `created` status.
    pub fn create_match(
        &mut self,
        seed: &str,
        game_key: &str,
        game_version: &str,
    ) -> Result<Match, CatalogError> {
        let record = Match {
            id: self.allocate_id(),
            seed: seed.to_string(),
            status: MatchStatus::Created,
            game_key: game_key.to_string(),
            game_version: game_version.to_string(),
            created_at: Utc::now(),
        };
        self.append_frame(record.id, &match_to_proto(&record))?;
        debug!(match_id = record.id, game_key, game_version, "match log opened");
        Ok(record)
    }

    /// Append a turn. The first turn may use any idx; every later turn
    /// must use the previous idx + 1. A `created` match moves to
    /// `running` on its first turn.
    pub fn append_turn(
        &mut self,
        match_id: MatchId,
        idx: i64,
        actor: Actor,
        action: &str,
    ) -> Result<Turn, CatalogError> {
        let folded = self.load_open(match_id)?;

        if let Some(last) = folded.turns.last() {
            if last.idx.checked_add(1) != Some(idx) {
                return Err(CatalogError::SequenceViolation {
                    match_id,
                    expected: last.idx.saturating_add(1),
                    got: idx,
                });
            }
        }

        let now = Utc::now();
        if folded.record.status == MatchStatus::Created {
            self.append_frame(match_id, &status_record(MatchStatus::Running, &now))?;
        }

        let turn = Turn {
            id: self.allocate_id(),
            match_id,
            idx,
            actor,
            action: action.to_string(),
            created_at: now,
        };
        self.append_frame(match_id, &turn_to_proto(&turn))?;
        Ok(turn)
    }

    /// Append a materialized state, optionally tied to a turn of this match.
    pub fn append_snapshot(
        &mut self,
        match_id: MatchId,
        turn_id: Option<TurnId>,
        state: &Value,
    ) -> Result<SnapshotRow, CatalogError> {
        let folded = self.load_open(match_id)?;
        if let Some(turn_id) = turn_id {
            if !folded.turns.iter().any(|t| t.id == turn_id) {
                return Err(CatalogError::UnknownTurn { match_id, turn_id });
            }
        }

        let row = SnapshotRow {
            id: self.allocate_id(),
            match_id,
            turn_id,
            state: state.clone(),
            created_at: Utc::now(),
        };
        self.append_frame(match_id, &snapshot_to_proto(&row))?;
        Ok(row)
    }

    /// Advance the match status along the forward-only lifecycle.
    pub fn mark_status(&mut self, match_id: MatchId, status: MatchStatus) -> Result<(), CatalogError> {
        let folded = self
            .load(match_id)?
            .ok_or(CatalogError::UnknownMatch(match_id))?;
        let current = folded.record.status;
        if !current.can_transition_to(status) {
            return Err(CatalogError::IllegalStatus {
                from: current,
                to: status,
            });
        }
        self.append_frame(match_id, &status_record(status, &Utc::now()))?;
        debug!(match_id, from = %current, to = %status, "match status changed");
        Ok(())
    }

    fn load_open(&self, match_id: MatchId) -> Result<FoldedMatch, CatalogError> {
        let folded = self
            .load(match_id)?
            .ok_or(CatalogError::UnknownMatch(match_id))?;
        if folded.record.status.is_terminal() {
            return Err(CatalogError::MatchClosed {
                match_id,
                status: folded.record.status,
            });
        }
        Ok(folded)
    }

    /// Writes one length-prefixed frame and fsyncs.
    fn append_frame(&self, match_id: MatchId, record: &ProtoLogRecord) -> Result<(), CatalogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(match_id))?;

        let buf = record.encode_to_vec();
        let len = buf.len() as u32;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Fold the log for one match. `None` if no log exists.
    pub fn load(&self, match_id: MatchId) -> Result<Option<FoldedMatch>, CatalogError> {
        let path = self.path_for(match_id);
        if !path.exists() {
            return Ok(None);
        }
        Self::fold(&path).map(Some)
    }

    fn log_paths(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("match_") && n.ends_with(".log"));
            if is_log {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn fold(path: &Path) -> Result<FoldedMatch, CatalogError> {
        let corrupt = |detail: String| CatalogError::Corrupt {
            path: path.to_path_buf(),
            detail,
        };

        let mut records = Self::read_all_from_file(path)?.into_iter();
        let mut folded = match records.next().and_then(|r| r.kind) {
            Some(RecordKind::MatchOpened(opened)) => FoldedMatch {
                record: proto_to_match(&opened).map_err(corrupt)?,
                turns: Vec::new(),
                snapshots: Vec::new(),
            },
            _ => return Err(corrupt("first frame is not MatchOpened".to_string())),
        };
        let match_id = folded.record.id;

        for record in records {
            match record.kind {
                Some(RecordKind::StatusChanged(s)) => {
                    folded.record.status = proto_to_status(s.status)
                        .ok_or_else(|| corrupt(format!("unknown status {}", s.status)))?;
                }
                Some(RecordKind::TurnAppended(t)) => {
                    folded.turns.push(proto_to_turn(match_id, &t).map_err(corrupt)?);
                }
                Some(RecordKind::SnapshotTaken(s)) => {
                    folded.snapshots.push(proto_to_snapshot(match_id, &s).map_err(corrupt)?);
                }
                Some(RecordKind::MatchOpened(_)) => {
                    return Err(corrupt("duplicate MatchOpened frame".to_string()));
                }
                None => return Err(corrupt("empty log record".to_string())),
            }
        }

        folded.turns.sort_by_key(|t| t.idx);
        Ok(folded)
    }

    /// Highest id visible in a corrupt log: the id in its file name and
    /// every id in the frames before the damage.
    fn salvage_highest_id(path: &Path) -> Result<i64, CatalogError> {
        let from_name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("match_"))
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0);

        let (records, _) = Self::read_frames(path)?;
        let from_frames = records
            .iter()
            .filter_map(|r| match &r.kind {
                Some(RecordKind::MatchOpened(m)) => Some(m.match_id),
                Some(RecordKind::TurnAppended(t)) => Some(t.turn_id),
                Some(RecordKind::SnapshotTaken(s)) => Some(s.snapshot_id),
                Some(RecordKind::StatusChanged(_)) | None => None,
            })
            .max()
            .unwrap_or(0);

        Ok(from_name.max(from_frames))
    }

    /// Read all frames from a file, validating frame integrity.
    fn read_all_from_file(path: &Path) -> Result<Vec<ProtoLogRecord>, CatalogError> {
        match Self::read_frames(path)? {
            (records, None) => Ok(records),
            (_, Some(detail)) => Err(CatalogError::Corrupt {
                path: path.to_path_buf(),
                detail,
            }),
        }
    }

    /// Frames up to the first damaged one, plus what was wrong with it.
    fn read_frames(path: &Path) -> io::Result<(Vec<ProtoLogRecord>, Option<String>)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match read_prefix(&mut reader, &mut len_buf)? {
                0 => break,
                4 => {}
                n => {
                    let detail = format!("truncated length prefix ({} of 4 bytes)", n);
                    return Ok((records, Some(detail)));
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Ok((records, Some(format!("invalid frame length: {}", len))));
            }

            let mut frame = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut frame) {
                return Ok((records, Some(format!("truncated frame: {}", e))));
            }

            match ProtoLogRecord::decode(frame.as_slice()) {
                Ok(record) => records.push(record),
                Err(e) => return Ok((records, Some(format!("protobuf decode error: {}", e)))),
            }
        }

        Ok((records, None))
    }
}

/// Fill `buf` as far as the file allows; returns the bytes read.
fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl MatchCatalog for MatchLogStore {
    fn fetch_match(&self, match_id: MatchId) -> Result<Option<Match>, CatalogError> {
        Ok(self.load(match_id)?.map(|f| f.record))
    }

    fn fetch_turns(&self, match_id: MatchId) -> Result<Vec<Turn>, CatalogError> {
        Ok(self.load(match_id)?.map(|f| f.turns).unwrap_or_default())
    }

    fn fetch_snapshots(&self, match_id: MatchId) -> Result<Vec<SnapshotRow>, CatalogError> {
        Ok(self.load(match_id)?.map(|f| f.snapshots).unwrap_or_default())
    }

    fn list_matches(&self, query: &ListQuery) -> Result<Vec<Match>, CatalogError> {
        let mut all = Vec::new();
        for path in Self::log_paths(&self.dir)? {
            match Self::fold(&path) {
                Ok(folded) => all.push(folded.record),
                Err(CatalogError::Corrupt { detail, .. }) => {
                    warn!(path = %path.display(), %detail, "corrupt match log left out of listing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(select_recent(all, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store(name: &str) -> MatchLogStore {
        let dir = std::env::temp_dir().join("match_log_store_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        MatchLogStore::open(&dir).expect("open store")
    }

    #[test]
    fn first_turn_moves_match_to_running() {
        let mut store = temp_store("first_turn_running");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        assert_eq!(store.fetch_match(m.id).unwrap().unwrap().status, MatchStatus::Created);
        store.append_turn(m.id, 0, Actor::AgentA, "{}").unwrap();
        assert_eq!(store.fetch_match(m.id).unwrap().unwrap().status, MatchStatus::Running);
    }

    #[test]
    fn gap_in_idx_is_rejected() {
        let mut store = temp_store("idx_gap");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        store.append_turn(m.id, 0, Actor::AgentA, "{}").unwrap();
        let err = store.append_turn(m.id, 2, Actor::AgentB, "{}").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::SequenceViolation { expected: 1, got: 2, .. }
        ));
    }

    #[test]
    fn no_turn_follows_the_largest_idx() {
        let mut store = temp_store("idx_at_limit");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        store.append_turn(m.id, i64::MAX, Actor::AgentA, "{}").unwrap();
        let err = store.append_turn(m.id, i64::MAX, Actor::AgentB, "{}").unwrap_err();
        assert!(matches!(err, CatalogError::SequenceViolation { got: i64::MAX, .. }));
    }

    #[test]
    fn finished_match_refuses_appends() {
        let mut store = temp_store("closed");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        store.append_turn(m.id, 0, Actor::AgentA, "{}").unwrap();
        store.mark_status(m.id, MatchStatus::Finished).unwrap();
        assert!(matches!(
            store.append_turn(m.id, 1, Actor::AgentB, "{}"),
            Err(CatalogError::MatchClosed { .. })
        ));
        assert!(matches!(
            store.mark_status(m.id, MatchStatus::Running),
            Err(CatalogError::IllegalStatus { .. })
        ));
    }

    #[test]
    fn snapshot_must_reference_own_turn() {
        let mut store = temp_store("snapshot_turn_ref");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        let err = store.append_snapshot(m.id, Some(999), &json!({})).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTurn { turn_id: 999, .. }));
    }

    #[test]
    fn partial_length_prefix_is_corruption() {
        let mut store = temp_store("partial_prefix");
        let m = store.create_match("seed", "tictactoe", "v1").unwrap();
        let path = store.path_for(m.id);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[7, 0]).unwrap();
        drop(file);
        assert!(matches!(store.load(m.id), Err(CatalogError::Corrupt { .. })));
    }

    #[test]
    fn corrupt_log_does_not_hide_healthy_matches() {
        let dir = std::env::temp_dir().join("match_log_store_tests").join("corrupt_neighbour");
        let _ = fs::remove_dir_all(&dir);
        let (healthy, broken) = {
            let mut store = MatchLogStore::open(&dir).unwrap();
            let a = store.create_match("a", "tictactoe", "v1").unwrap();
            store.append_turn(a.id, 0, Actor::AgentA, "{}").unwrap();
            let b = store.create_match("b", "tictactoe", "v1").unwrap();
            store.append_turn(b.id, 0, Actor::AgentA, "{}").unwrap();
            (a.id, b.id)
        };
        let path = dir.join(format!("match_{:06}.log", broken));
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let mut store = MatchLogStore::open(&dir).expect("open with a corrupt log");
        assert!(store.fetch_match(healthy).unwrap().is_some());
        assert!(matches!(store.fetch_turns(broken), Err(CatalogError::Corrupt { .. })));

        let listed = store.list_matches(&ListQuery::default()).unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![healthy]);

        // Ids already used inside the damaged log are never handed out again.
        let c = store.create_match("c", "tictactoe", "v1").unwrap();
        assert!(c.id > broken);
    }

    #[test]
    fn reopen_continues_id_allocation() {
        let dir = std::env::temp_dir().join("match_log_store_tests").join("reopen_ids");
        let _ = fs::remove_dir_all(&dir);
        let first = {
            let mut store = MatchLogStore::open(&dir).unwrap();
            let m = store.create_match("a", "tictactoe", "v1").unwrap();
            store.append_turn(m.id, 0, Actor::AgentA, "{}").unwrap().id
        };
        let mut store = MatchLogStore::open(&dir).unwrap();
        let m2 = store.create_match("b", "tictactoe", "v1").unwrap();
        assert!(m2.id > first);
    }
}
