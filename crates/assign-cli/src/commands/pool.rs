//! Pool Processor and Emergency Override CLI commands.

use std::error::Error;

use assign_core::Engine;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum PoolAction {
    /// Current pool counts by sub-state
    Status,
    /// Run one Pool Processor batch immediately
    ProcessNow,
    /// Drain the entire pool, bypassing batch size and lookahead
    Emergency {
        reason: String,
        #[arg(long, default_value = "cli")]
        triggered_by: String,
    },
}

pub async fn run(engine: &Engine, action: PoolAction) -> Result<(), Box<dyn Error>> {
    match action {
        PoolAction::Status => {
            println!("{:#?}", engine.pool_status()?);
            Ok(())
        }
        PoolAction::ProcessNow => {
            println!("{:#?}", engine.process_pool_now().await?);
            Ok(())
        }
        PoolAction::Emergency { reason, triggered_by } => {
            let report = engine.emergency_process(&reason, &triggered_by).await?;
            println!("processed {} entries", report.entries.len());
            for entry in &report.entries {
                println!(
                    "  {} -> {:?} ({:?}, manual_escalation={})",
                    entry.booking_id, entry.outcome, entry.urgency_level, entry.manual_escalation
                );
            }
            Ok(())
        }
    }
}
