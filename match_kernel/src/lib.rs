#![forbid(unsafe_code)]

/// Rules kernel v1. Behavioral changes to a registered game require a
/// new game_version, never an edit in place.
pub const KERNEL_VERSION: u32 = 1;

pub mod domain;
pub mod rules;
pub mod games;
pub mod registry;
pub mod invariants;
pub mod validator;
pub mod hashing;
