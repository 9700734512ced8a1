//! Runtime configuration, read from `REPLAY_*` environment variables.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::replay::{InvalidActionPolicy, ReplayOptions, SequencePolicy};

pub const ENV_DATA_DIR: &str = "REPLAY_DATA_DIR";
pub const ENV_SEQUENCE_POLICY: &str = "REPLAY_SEQUENCE_POLICY";
pub const ENV_INVALID_ACTIONS: &str = "REPLAY_INVALID_ACTIONS";
pub const ENV_LIST_LIMIT: &str = "REPLAY_LIST_LIMIT";

const DEFAULT_DATA_DIR: &str = "./data/matches";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub data_dir: PathBuf,
    pub sequence: SequencePolicy,
    pub invalid_actions: InvalidActionPolicy,
    pub list_limit: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sequence: SequencePolicy::default(),
            invalid_actions: InvalidActionPolicy::default(),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ReplayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset or empty variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_SEQUENCE_POLICY) {
            config.sequence = parse(ENV_SEQUENCE_POLICY, &raw)?;
        }
        if let Some(raw) = get(ENV_INVALID_ACTIONS) {
            config.invalid_actions = parse(ENV_INVALID_ACTIONS, &raw)?;
        }
        if let Some(raw) = get(ENV_LIST_LIMIT) {
            let limit: u32 = raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
                var: ENV_LIST_LIMIT,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.list_limit = limit.clamp(1, MAX_LIST_LIMIT);
        }

        Ok(config)
    }

    pub fn options(&self) -> ReplayOptions {
        ReplayOptions {
            sequence: self.sequence,
            invalid_actions: self.invalid_actions,
        }
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.trim().to_ascii_lowercase().parse().map_err(|reason| ConfigError {
        var,
        value: raw.to_string(),
        reason,
    })
}
