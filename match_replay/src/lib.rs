#![forbid(unsafe_code)]

//! Match replay runtime.
//!
//! Reads persisted match logs (turns + snapshots) through a
//! `MatchCatalog` and reconstructs game state at any step.
//!
//! No game logic lives here — rules, action validation and state
//! validation are delegated to `match_kernel`.

pub mod catalog;
pub mod config;
pub mod cursor;
pub mod drift;
pub mod log_store;
pub mod model;
pub mod proto_bridge;
pub mod proto_types;
pub mod replay;
pub mod schema_export;
pub mod service;
pub mod snapshot;
