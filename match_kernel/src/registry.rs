/// Match Kernel — Game Registry
///
/// Rules are selected by (game_key, game_version). New games register
/// their own definition and rule table without touching the replay code.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::games::TicTacToe;
use crate::rules::{GameDefinition, GameRules};

/// Lookup table from (game_key, game_version) to rules.
#[derive(Clone, Default)]
pub struct GameRegistry {
    games: BTreeMap<(String, String), Arc<dyn GameRules>>,
}

impl GameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in game.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TicTacToe::new()));
        registry
    }

    /// Register rules under their definition's key and version.
    /// A later registration for the same pair replaces the earlier one.
    pub fn register(&mut self, rules: Arc<dyn GameRules>) {
        let def = rules.definition();
        let key = (def.game_key.clone(), def.game_version.clone());
        debug!(game = %def.id(), "registering game rules");
        self.games.insert(key, rules);
    }

    pub fn lookup(&self, game_key: &str, game_version: &str) -> Option<Arc<dyn GameRules>> {
        self.games
            .get(&(game_key.to_string(), game_version.to_string()))
            .cloned()
    }

    /// Lookup by combined id, e.g. `tictactoe/v1`.
    pub fn lookup_id(&self, id: &str) -> Option<Arc<dyn GameRules>> {
        let (key, version) = id.rsplit_once('/')?;
        self.lookup(key, version)
    }

    /// Every registered definition, ordered by (key, version).
    pub fn definitions(&self) -> Vec<GameDefinition> {
        self.games
            .values()
            .map(|rules| rules.definition().clone())
            .collect()
    }
}
