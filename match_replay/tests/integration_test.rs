//! Integration tests for match_replay.
//!
//! File-backed tests use temporary directories for isolation.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use match_kernel::domain::{Actor, Cell, GameState, Mark};
use match_kernel::games::TicTacToe;
use match_kernel::registry::GameRegistry;
use match_kernel::rules::GameRules;

use match_replay::catalog::{CatalogError, InMemoryCatalog, ListQuery, MatchCatalog};
use match_replay::drift::{diff_states, verify_determinism};
use match_replay::log_store::MatchLogStore;
use match_replay::model::{Match, MatchId, MatchStatus, Turn};
use match_replay::replay::{
    MatchLog, ReplayEngine, ReplayError, ReplayOptions, SequencePolicy, StepOutcome,
};
use match_replay::service::ReplayService;

/// agentA takes the top row on the fifth turn.
const TOP_ROW_GAME: [(usize, usize); 5] = [(0, 0), (1, 1), (0, 1), (2, 2), (0, 2)];

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("match_replay_tests").join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap() + Duration::minutes(minutes)
}

fn mv(row: usize, col: usize) -> String {
    format!(r#"{{"type":"move","payload":{{"row":{},"col":{}}}}}"#, row, col)
}

fn actor_for(idx: usize) -> Actor {
    if idx % 2 == 0 {
        Actor::AgentA
    } else {
        Actor::AgentB
    }
}

/// In-memory match with one turn per raw action, actors alternating.
fn fixture(actions: &[String]) -> (InMemoryCatalog, MatchId) {
    let mut catalog = InMemoryCatalog::new();
    let id = catalog.add_match("seed", "tictactoe", "v1", MatchStatus::Finished, at(0));
    for (i, action) in actions.iter().enumerate() {
        catalog.add_turn(id, i as i64, actor_for(i), action);
    }
    (catalog, id)
}

fn service(catalog: InMemoryCatalog) -> ReplayService<InMemoryCatalog> {
    ReplayService::new(catalog, GameRegistry::with_builtin(), ReplayOptions::default())
}

fn top_row_actions() -> Vec<String> {
    TOP_ROW_GAME.iter().map(|&(r, c)| mv(r, c)).collect()
}

fn assemble(catalog: &InMemoryCatalog, id: MatchId, rules: &dyn GameRules) -> MatchLog {
    let record = catalog.fetch_match(id).unwrap().unwrap();
    let turns = catalog.fetch_turns(id).unwrap();
    let snapshots = catalog.fetch_snapshots(id).unwrap();
    MatchLog::assemble(&record, turns, &snapshots, rules, SequencePolicy::Strict).unwrap()
}

// ─────────────────────────────────────────────────────────────
// Test 1: top_row_win_at_step_four
// ─────────────────────────────────────────────────────────────

#[test]
fn top_row_win_at_step_four() {
    let (catalog, id) = fixture(&top_row_actions());
    let r = service(catalog).state_at(id, Some(4)).unwrap().unwrap();

    for col in 0..3 {
        assert_eq!(r.state.board.get(Cell::new(0, col)), Some(Mark::X));
    }
    assert_eq!(r.winner, Some(Actor::AgentA));
    assert!(!r.divergent);
}

// ─────────────────────────────────────────────────────────────
// Test 2: malformed_action_is_a_no_op_step
// ─────────────────────────────────────────────────────────────

#[test]
fn malformed_action_is_a_no_op_step() {
    let mut catalog = InMemoryCatalog::new();
    let id = catalog.add_match("seed", "tictactoe", "v1", MatchStatus::Finished, at(0));
    catalog.add_turn(id, 0, Actor::AgentA, &mv(0, 0));
    catalog.add_turn(id, 1, Actor::AgentB, &mv(1, 1));
    catalog.add_turn(id, 2, Actor::AgentA, r#"{"type":"move","payload":{"row":"top"}}"#);
    catalog.add_turn(id, 3, Actor::AgentA, &mv(2, 2));
    catalog.add_turn(id, 4, Actor::AgentB, &mv(2, 0));
    let svc = service(catalog);

    let step1 = svc.state_at(id, Some(1)).unwrap().unwrap();
    let step2 = svc.state_at(id, Some(2)).unwrap().unwrap();
    assert_eq!(step1.state, step2.state);
    assert!(matches!(step2.outcome, Some(StepOutcome::SkippedInvalid { .. })));

    // agentA retries at idx 3 against the unchanged board.
    let step3 = svc.state_at(id, Some(3)).unwrap().unwrap();
    assert_eq!(step3.state.board.get(Cell::new(2, 2)), Some(Mark::X));
    assert_eq!(step3.outcome, Some(StepOutcome::Applied));
    let step4 = svc.state_at(id, Some(4)).unwrap().unwrap();
    assert_eq!(step4.state.board.get(Cell::new(2, 0)), Some(Mark::O));
    assert!(!step4.divergent);

    let view = svc.get_replay(id).unwrap().unwrap();
    assert!(view.steps[2].action.is_none());
    assert!(view.steps[3].action.is_some());
}

// ─────────────────────────────────────────────────────────────
// Test 3: list_matches_limit_one_returns_newest
// ─────────────────────────────────────────────────────────────

#[test]
fn list_matches_limit_one_returns_newest() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_match("old", "tictactoe", "v1", MatchStatus::Finished, at(0));
    let newest = catalog.add_match("new", "tictactoe", "v1", MatchStatus::Running, at(10));
    catalog.add_match("other", "connect4", "v1", MatchStatus::Running, at(20));

    let svc = service(catalog);
    let listed = svc
        .list_matches(&ListQuery::for_game("tictactoe", "v1").with_limit(1))
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, newest);

    let all = svc.list_matches(&ListQuery::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].game_key, "connect4");
}

// ─────────────────────────────────────────────────────────────
// Test 4: zero_turns_at_initial_step
// ─────────────────────────────────────────────────────────────

#[test]
fn zero_turns_at_initial_step() {
    let rules = TicTacToe::new();

    let (catalog, id) = fixture(&[]);
    let r = service(catalog).state_at(id, None).unwrap().unwrap();
    assert_eq!(r.state, rules.initial_state("seed"));
    assert_eq!(r.step, None);

    let snap = json!({
        "board": [["O", " ", " "], [" ", " ", " "], [" ", " ", " "]],
        "player": "agentB",
        "winner": null,
    });
    let (mut catalog, id) = fixture(&[]);
    catalog.add_snapshot(id, None, snap);
    let r = service(catalog).state_at(id, None).unwrap().unwrap();
    assert_eq!(r.player, Actor::AgentB);
    assert_eq!(r.state.board.get(Cell::new(0, 0)), Some(Mark::O));
}

// ─────────────────────────────────────────────────────────────
// Test 5: unknown_match_is_not_found
// ─────────────────────────────────────────────────────────────

#[test]
fn unknown_match_is_not_found() {
    let (catalog, _) = fixture(&top_row_actions());
    let svc = service(catalog);
    assert!(svc.get_replay(9_999).unwrap().is_none());
    assert!(svc.state_at(9_999, Some(0)).unwrap().is_none());
}

// ─────────────────────────────────────────────────────────────
// Test 6: unknown_game_is_an_error
// ─────────────────────────────────────────────────────────────

#[test]
fn unknown_game_is_an_error() {
    let mut catalog = InMemoryCatalog::new();
    let id = catalog.add_match("s", "chess", "v9", MatchStatus::Running, at(0));
    assert!(matches!(
        service(catalog).get_replay(id),
        Err(ReplayError::UnknownGame { .. })
    ));
}

// ─────────────────────────────────────────────────────────────
// Test 7: gap_in_turn_log_is_corruption_under_strict_policy
// ─────────────────────────────────────────────────────────────

#[test]
fn gap_in_turn_log_is_corruption_under_strict_policy() {
    let mut catalog = InMemoryCatalog::new();
    let id = catalog.add_match("s", "tictactoe", "v1", MatchStatus::Running, at(0));
    catalog.add_turn(id, 0, Actor::AgentA, &mv(0, 0));
    catalog.add_turn(id, 2, Actor::AgentB, &mv(1, 1));

    let strict = service(catalog.clone());
    assert!(matches!(strict.get_replay(id), Err(ReplayError::CorruptLog { .. })));

    let lenient = ReplayService::new(
        catalog,
        GameRegistry::with_builtin(),
        ReplayOptions {
            sequence: SequencePolicy::Lenient,
            ..ReplayOptions::default()
        },
    );
    let r = lenient.state_at(id, Some(1)).unwrap().unwrap();
    assert_eq!(r.state.board.get(Cell::new(1, 1)), Some(Mark::O));
}

// ─────────────────────────────────────────────────────────────
// Test 8: snapshot_overrides_and_mid_write_fallback
// ─────────────────────────────────────────────────────────────

#[test]
fn snapshot_overrides_and_mid_write_fallback() {
    let rules = TicTacToe::new();
    let (mut catalog, id) = fixture(&top_row_actions());
    let turns = catalog.fetch_turns(id).unwrap();

    // Derived state after turn 1, persisted as its snapshot.
    let plain = ReplayEngine::new(&rules).reconstruct(&assemble(&catalog, id, &rules), Some(1));
    catalog.add_snapshot(id, Some(turns[1].id), serde_json::to_value(&plain.state).unwrap());
    // Broken snapshot for turn 3 is ignored.
    catalog.add_snapshot(id, Some(turns[3].id), json!({"board": 7}));

    let svc = service(catalog);
    let view = svc.get_replay(id).unwrap().unwrap();
    assert_eq!(view.steps[1].state.as_ref(), Some(&plain.state));
    assert!(view.steps[3].state.is_none());

    let r = svc.state_at(id, Some(3)).unwrap().unwrap();
    assert_eq!(r.outcome, Some(StepOutcome::Applied));
    let timeline = svc.timeline(id).unwrap().unwrap();
    assert_eq!(timeline.steps[1].outcome, StepOutcome::SnapshotOverride);
    assert_eq!(timeline.steps[4].state.winner, Some(Actor::AgentA));
}

// ─────────────────────────────────────────────────────────────
// Test 9: audit_reports_tampered_snapshot
// ─────────────────────────────────────────────────────────────

#[test]
fn audit_reports_tampered_snapshot() {
    let (mut catalog, id) = fixture(&top_row_actions());
    let turns = catalog.fetch_turns(id).unwrap();
    // Claims agentB took (2,0) instead of agentA taking (0,0).
    catalog.add_snapshot(
        id,
        Some(turns[0].id),
        json!({
            "board": [[" ", " ", " "], [" ", " ", " "], ["O", " ", " "]],
            "player": "agentB",
            "winner": null,
        }),
    );

    let mismatches = service(catalog).audit(id).unwrap().unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].step, 0);
    assert_eq!(mismatches[0].diff.cells.len(), 2);
}

// ─────────────────────────────────────────────────────────────
// Test 10: replay_is_deterministic
// ─────────────────────────────────────────────────────────────

#[test]
fn replay_is_deterministic() {
    let rules = TicTacToe::new();
    let (catalog, id) = fixture(&top_row_actions());
    let log = assemble(&catalog, id, &rules);
    let engine = ReplayEngine::new(&rules);

    for step in [None, Some(0), Some(2), Some(4)] {
        assert_eq!(engine.reconstruct(&log, step), engine.reconstruct(&log, step));
    }
    let fingerprint = verify_determinism(&engine, &log).expect("deterministic");
    assert_eq!(fingerprint, engine.timeline(&log).fingerprint());
}

// ─────────────────────────────────────────────────────────────
// Test 11: log_store_serves_replays
// ─────────────────────────────────────────────────────────────

#[test]
fn log_store_serves_replays() {
    let dir = temp_dir("log_store_serves_replays");
    let rules = TicTacToe::new();

    let match_id = {
        let mut store = MatchLogStore::open(&dir).expect("open store");
        let record = store.create_match("s1", "tictactoe", "v1").unwrap();
        let mut state = rules.initial_state("s1");
        store
            .append_snapshot(record.id, None, &serde_json::to_value(&state).unwrap())
            .unwrap();
        for (i, &(r, c)) in TOP_ROW_GAME.iter().enumerate() {
            let turn = store.append_turn(record.id, i as i64, actor_for(i), &mv(r, c)).unwrap();
            state = rules
                .apply_action(&state, actor_for(i), &match_kernel::domain::Action::Move(Cell::new(r, c)))
                .unwrap()
                .state;
            if i % 2 == 0 {
                store
                    .append_snapshot(record.id, Some(turn.id), &serde_json::to_value(&state).unwrap())
                    .unwrap();
            }
        }
        store.mark_status(record.id, MatchStatus::Finished).unwrap();
        record.id
    };

    let store = MatchLogStore::open(&dir).expect("reopen store");
    let svc = ReplayService::new(store, GameRegistry::with_builtin(), ReplayOptions::default());

    let view = svc.get_replay(match_id).unwrap().unwrap();
    assert_eq!(view.record.status, MatchStatus::Finished);
    assert_eq!(view.steps.len(), 5);
    let with_state: Vec<bool> = view.steps.iter().map(|s| s.state.is_some()).collect();
    assert_eq!(with_state, vec![true, false, true, false, true]);

    let json: Value = serde_json::to_value(&view).unwrap();
    assert_eq!(json["match"]["gameKey"], "tictactoe");
    assert!(json["initialState"]["board"].is_array());

    assert!(svc.audit(match_id).unwrap().unwrap().is_empty());
    let last = svc.state_at(match_id, Some(99)).unwrap().unwrap();
    assert_eq!(last.step, Some(4));
    assert_eq!(last.winner, Some(Actor::AgentA));
}

// ─────────────────────────────────────────────────────────────
// Test 12: corrupted_log_detection
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_log_detection() {
    let dir = temp_dir("corrupted_log");
    let match_id = {
        let mut store = MatchLogStore::open(&dir).expect("open store");
        let record = store.create_match("s", "tictactoe", "v1").unwrap();
        for (i, &(r, c)) in TOP_ROW_GAME.iter().enumerate() {
            store.append_turn(record.id, i as i64, actor_for(i), &mv(r, c)).unwrap();
        }
        record.id
    };

    let path = dir.join(format!("match_{:06}.log", match_id));
    let data = fs::read(&path).expect("read log");
    fs::write(&path, &data[..data.len() - 10]).expect("truncate");

    // Reopen scans every log, so corruption surfaces either at open or on load.
    match MatchLogStore::open(&dir) {
        Ok(store) => assert!(matches!(
            store.fetch_turns(match_id),
            Err(CatalogError::Corrupt { .. })
        )),
        Err(e) => assert!(matches!(e, CatalogError::Corrupt { .. })),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 13: cursor_scrubs_like_direct_reconstruction
// ─────────────────────────────────────────────────────────────

#[test]
fn cursor_scrubs_like_direct_reconstruction() {
    let (catalog, id) = fixture(&top_row_actions());
    let svc = service(catalog);
    let mut cursor = svc.cursor(id).unwrap().unwrap();

    cursor.last();
    assert_eq!(cursor.state(), &svc.state_at(id, Some(4)).unwrap().unwrap().state);
    cursor.seek(Some(1));
    assert_eq!(cursor.state(), &svc.state_at(id, Some(1)).unwrap().unwrap().state);
    assert!(cursor.back());
    assert!(cursor.back());
    assert_eq!(cursor.position(), None);
}

// ─────────────────────────────────────────────────────────────
// Test 14: replay_view_initial_state_is_null_without_snapshot
// ─────────────────────────────────────────────────────────────

#[test]
fn replay_view_initial_state_is_null_without_snapshot() {
    let (catalog, id) = fixture(&top_row_actions()[..1]);
    let view = service(catalog).get_replay(id).unwrap().unwrap();
    assert!(view.initial_state.is_none());
    assert_eq!(view.steps.len(), 1);
    let json: Value = serde_json::to_value(&view).unwrap();
    assert!(json["initialState"].is_null());

    // An invalid initial row counts as absent.
    let (mut catalog, id) = fixture(&top_row_actions()[..1]);
    catalog.add_snapshot(id, None, json!({"board": "nope"}));
    let view = service(catalog).get_replay(id).unwrap().unwrap();
    assert!(view.initial_state.is_none());

    let rules = TicTacToe::new();
    let (mut catalog, id) = fixture(&top_row_actions()[..1]);
    catalog.add_snapshot(id, None, serde_json::to_value(rules.initial_state("seed")).unwrap());
    let view = service(catalog).get_replay(id).unwrap().unwrap();
    assert_eq!(view.initial_state, Some(rules.initial_state("seed")));
}

// ─────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────

fn turns_of(moves: &[(usize, usize)]) -> (Match, Vec<Turn>) {
    let record = Match {
        id: 1,
        seed: "prop".to_string(),
        status: MatchStatus::Finished,
        game_key: "tictactoe".to_string(),
        game_version: "v1".to_string(),
        created_at: at(0),
    };
    let turns = moves
        .iter()
        .enumerate()
        .map(|(i, &(r, c))| Turn {
            id: 100 + i as i64,
            match_id: 1,
            idx: i as i64,
            actor: actor_for(i),
            // row 3 is out of range, so some actions are malformed
            action: mv(r, c),
            created_at: at(0),
        })
        .collect();
    (record, turns)
}

fn timeline_states(rules: &TicTacToe, log: &MatchLog) -> Vec<(GameState, StepOutcome)> {
    ReplayEngine::new(rules)
        .timeline(log)
        .steps
        .into_iter()
        .map(|s| (s.state, s.outcome))
        .collect()
}

proptest! {
    #[test]
    fn consecutive_steps_differ_by_one_action(
        moves in prop::collection::vec((0usize..4, 0usize..3), 0..12)
    ) {
        let rules = TicTacToe::new();
        let (record, turns) = turns_of(&moves);
        let log = MatchLog::assemble(&record, turns, &[], &rules, SequencePolicy::Strict).unwrap();
        let engine = ReplayEngine::new(&rules);

        let mut prev = engine.reconstruct(&log, None).state;
        for (i, (state, outcome)) in timeline_states(&rules, &log).into_iter().enumerate() {
            let diff = diff_states(&prev, &state);
            match outcome {
                StepOutcome::Applied => {
                    prop_assert_eq!(diff.cells.len(), 1);
                    let (r, c) = moves[i];
                    prop_assert_eq!(diff.cells[0].cell, Cell::new(r, c));
                    prop_assert_eq!(diff.cells[0].after, Mark::of(actor_for(i)));
                }
                _ => prop_assert!(diff.is_empty()),
            }
            prev = state;
        }
    }

    #[test]
    fn snapshot_matches_full_replay(
        moves in prop::collection::vec((0usize..3, 0usize..3), 1..10),
        pick in 0usize..10,
    ) {
        let rules = TicTacToe::new();
        let (record, turns) = turns_of(&moves);
        let t = pick % moves.len();
        let full = MatchLog::assemble(&record, turns.clone(), &[], &rules, SequencePolicy::Strict).unwrap();
        let engine = ReplayEngine::new(&rules);
        let at_t = engine.reconstruct(&full, Some(t)).state;

        let mut catalog = InMemoryCatalog::new();
        catalog.insert_match(record.clone());
        catalog.add_snapshot(1, Some(turns[t].id), serde_json::to_value(&at_t).unwrap());
        let snapshots = catalog.fetch_snapshots(1).unwrap();
        let fast = MatchLog::assemble(&record, turns, &snapshots, &rules, SequencePolicy::Strict).unwrap();

        for step in t..moves.len() {
            prop_assert_eq!(
                engine.reconstruct(&fast, Some(step)).state,
                engine.reconstruct(&full, Some(step)).state
            );
        }
    }
}
