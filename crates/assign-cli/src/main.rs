use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "assign-cli", version)]
#[command(about = "CLI for the interpreter auto-assignment engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assignment Runner: assign, preview or inspect a booking
    Booking {
        #[command(subcommand)]
        action: commands::booking::BookingAction,
    },
    /// Policy Store: mode and scoring-weight management
    Policy {
        #[command(subcommand)]
        action: commands::policy::PolicyAction,
    },
    /// Per-meeting-type priority thresholds
    Priority {
        #[command(subcommand)]
        action: commands::priority::PriorityAction,
    },
    /// Pool Processor and Emergency Override
    Pool {
        #[command(subcommand)]
        action: commands::pool::PoolAction,
    },
    /// Scheduler control
    Scheduler {
        #[command(subcommand)]
        action: commands::scheduler::SchedulerAction,
    },
    /// Error-Recovery Manager
    Health {
        #[command(subcommand)]
        action: commands::health::HealthAction,
    },
    /// Generate shell completion script
    Complete {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Complete { shell } = cli.command {
        print_completions(shell);
        return;
    }

    let result = run(cli.command).await;
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let engine = common::build_engine()?;
    match command {
        Commands::Booking { action } => commands::booking::run(&engine, action).await,
        Commands::Policy { action } => commands::policy::run(&engine, action).await,
        Commands::Priority { action } => commands::priority::run(&engine, action).await,
        Commands::Pool { action } => commands::pool::run(&engine, action).await,
        Commands::Scheduler { action } => commands::scheduler::run(&engine, action).await,
        Commands::Health { action } => commands::health::run(&engine, action).await,
        Commands::Complete { .. } => unreachable!("handled before engine construction"),
    }
}

fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = "assign-cli";
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
