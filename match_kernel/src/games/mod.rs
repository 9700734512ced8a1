//! Built-in rule tables.

pub mod tictactoe;

pub use tictactoe::TicTacToe;
