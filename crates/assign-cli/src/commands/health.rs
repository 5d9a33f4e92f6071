//! Error-Recovery Manager CLI commands.

use std::error::Error;

use assign_core::Engine;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum HealthAction {
    /// Database reachability, pool stats and corrupted-entry count
    Check,
    /// Reset stuck/over-retried entries and quarantine corrupted ones
    Repair,
}

pub async fn run(engine: &Engine, action: HealthAction) -> Result<(), Box<dyn Error>> {
    match action {
        HealthAction::Check => {
            println!("{:#?}", engine.health_check()?);
            Ok(())
        }
        HealthAction::Repair => {
            println!("{:#?}", engine.repair()?);
            Ok(())
        }
    }
}
