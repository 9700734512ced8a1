/// Match Kernel — Structural State Checks
///
/// Applied to every persisted state before it is trusted.
/// Returns `Err(message)` on the first failure; never panics.

use crate::domain::GameState;
use crate::rules::GridShape;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all structural checks against the declared grid shape.
pub fn try_validate_state(state: &GameState, shape: GridShape) -> Result<(), String> {
    try_check_row_count(state, shape)?;
    try_check_row_widths(state, shape)?;
    try_check_winner_to_move(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// INV-1: The grid has exactly `shape.rows` rows.
fn try_check_row_count(state: &GameState, shape: GridShape) -> Result<(), String> {
    let rows = state.board.rows().len();
    if rows != shape.rows {
        return Err(format!(
            "Invariant violation: [INVARIANT:grid_rows] expected {} rows, found {}",
            shape.rows, rows
        ));
    }
    Ok(())
}

/// INV-2: Every row has exactly `shape.cols` cells.
fn try_check_row_widths(state: &GameState, shape: GridShape) -> Result<(), String> {
    for (idx, row) in state.board.rows().iter().enumerate() {
        if row.len() != shape.cols {
            return Err(format!(
                "Invariant violation: [INVARIANT:grid_cols] row {} has {} cells, expected {}",
                idx,
                row.len(),
                shape.cols
            ));
        }
    }
    Ok(())
}

/// INV-3: A finished state never names its winner as the next mover.
/// The winning move always hands the turn to the opponent.
fn try_check_winner_to_move(state: &GameState) -> Result<(), String> {
    if state.winner == Some(state.player) {
        return Err(format!(
            "Invariant violation: [INVARIANT:winner_to_move] winner {} is also the player to move",
            state.player
        ));
    }
    Ok(())
}
