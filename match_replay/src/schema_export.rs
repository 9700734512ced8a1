//! Schema export — JSON-Schema files for every registered game.
//!
//! Layout: `<out>/<game_key>/<game_version>/{state,action,observation,event}.schema.json`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use match_kernel::registry::GameRegistry;

#[derive(Debug, Error)]
pub enum SchemaExportError {
    #[error("schema export I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("schema encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write every registered game's schemas under `out`. Returns the files
/// written, in registry order.
pub fn export_schemas(registry: &GameRegistry, out: &Path) -> Result<Vec<PathBuf>, SchemaExportError> {
    let mut written = Vec::new();

    for definition in registry.definitions() {
        let base = out.join(&definition.game_key).join(&definition.game_version);
        fs::create_dir_all(&base)?;

        let schemas = definition.schemas();
        for (name, schema) in [
            ("state", &schemas.state),
            ("action", &schemas.action),
            ("observation", &schemas.observation),
            ("event", &schemas.event),
        ] {
            let path = base.join(format!("{}.schema.json", name));
            fs::write(&path, serde_json::to_string_pretty(schema)?)?;
            written.push(path);
        }
        debug!(game = %definition.id(), dir = %base.display(), "schemas exported");
    }

    Ok(written)
}
