//! Shared CLI plumbing: engine construction and small print helpers.

use std::error::Error;

use assign_core::config::EngineConfig;
use assign_core::storage::Database;
use assign_core::Engine;

/// Opens the on-disk database at the configured path and wires up the
/// engine facade. Called once per CLI invocation.
pub fn build_engine() -> Result<Engine, Box<dyn Error>> {
    let config = EngineConfig::load()?;
    let db = Database::open(EngineConfig::database_path()?)?;
    Ok(Engine::new(db, config))
}

pub fn print_warnings(warnings: &[assign_core::policy::Warning]) {
    for w in warnings {
        println!(
            "warning: {} = {} outside recommended band [{}, {}]",
            w.field, w.value, w.recommended_min, w.recommended_max
        );
    }
}
