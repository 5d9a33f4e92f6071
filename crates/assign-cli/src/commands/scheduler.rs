//! Scheduler control CLI commands.

use std::error::Error;

use assign_core::Engine;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum SchedulerAction {
    /// Start the background tick loop
    Start,
    /// Stop the background tick loop
    Stop,
    /// Stop then start, picking up any policy mode interval change
    Restart,
    /// Current running state and last-tick stats
    Status,
}

pub async fn run(engine: &Engine, action: SchedulerAction) -> Result<(), Box<dyn Error>> {
    match action {
        SchedulerAction::Start => {
            engine.scheduler_start(None).await?;
            println!("scheduler started");
            Ok(())
        }
        SchedulerAction::Stop => {
            engine.scheduler_stop().await;
            println!("scheduler stopped");
            Ok(())
        }
        SchedulerAction::Restart => {
            engine.scheduler_restart(None).await?;
            println!("scheduler restarted");
            Ok(())
        }
        SchedulerAction::Status => {
            println!("{:#?}", engine.scheduler_status().await);
            Ok(())
        }
    }
}
