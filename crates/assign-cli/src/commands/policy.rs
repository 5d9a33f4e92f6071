//! Policy Store CLI commands: inspect the singleton policy, switch between
//! the fixed canonical modes, or tune individual CUSTOM-mode fields.

use std::error::Error;

use assign_core::policy::PolicyPatch;
use assign_core::{Engine, Mode};
use clap::{Subcommand, ValueEnum};

use crate::common::print_warnings;

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Print the current policy
    Show,
    /// Switch to one of the fixed canonical modes, or CUSTOM
    SwitchMode {
        mode: ModeArg,
    },
    /// Update individual fields (only permitted while mode is CUSTOM)
    Update {
        #[arg(long)]
        w_fair: Option<f64>,
        #[arg(long)]
        w_urgency: Option<f64>,
        #[arg(long)]
        w_lrs: Option<f64>,
        #[arg(long)]
        dr_consecutive_penalty: Option<f64>,
        #[arg(long)]
        fairness_window_days: Option<i64>,
        #[arg(long)]
        max_gap_hours: Option<f64>,
        #[arg(long)]
        min_advance_days: Option<i64>,
        #[arg(long)]
        auto_assign_enabled: Option<bool>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Balance,
    Urgent,
    Normal,
    Custom,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Mode {
        match m {
            ModeArg::Balance => Mode::Balance,
            ModeArg::Urgent => Mode::Urgent,
            ModeArg::Normal => Mode::Normal,
            ModeArg::Custom => Mode::Custom,
        }
    }
}

pub async fn run(engine: &Engine, action: PolicyAction) -> Result<(), Box<dyn Error>> {
    match action {
        PolicyAction::Show => {
            let policy = engine.get_policy()?;
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
        PolicyAction::SwitchMode { mode } => {
            let warnings = engine.switch_mode(mode.into())?;
            print_warnings(&warnings);
            println!("mode switched");
            Ok(())
        }
        PolicyAction::Update {
            w_fair,
            w_urgency,
            w_lrs,
            dr_consecutive_penalty,
            fairness_window_days,
            max_gap_hours,
            min_advance_days,
            auto_assign_enabled,
        } => {
            let patch = PolicyPatch {
                mode: None,
                w_fair,
                w_urgency,
                w_lrs,
                dr_consecutive_penalty,
                fairness_window_days,
                max_gap_hours,
                min_advance_days,
                auto_assign_enabled,
            };
            let warnings = engine.update_policy(&patch)?;
            print_warnings(&warnings);
            println!("policy updated");
            Ok(())
        }
    }
}
