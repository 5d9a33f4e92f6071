//! Booking assignment commands: run the Runner for real, or preview its
//! scoring without committing.

use std::error::Error;

use assign_core::{Engine, RunnerOutcome};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum BookingAction {
    /// Run the assignment decision for a booking (commits or pools it)
    Assign {
        booking_id: String,
    },
    /// Preview the scoring breakdown without committing anything
    Suggest {
        booking_id: String,
        /// Cap on the number of ranked candidates returned
        #[arg(long, default_value_t = 20)]
        max_candidates: usize,
    },
    /// Show a booking's current record
    Show {
        booking_id: String,
    },
}

pub async fn run(engine: &Engine, action: BookingAction) -> Result<(), Box<dyn Error>> {
    match action {
        BookingAction::Assign { booking_id } => {
            match engine.assign_booking(&booking_id).await? {
                RunnerOutcome::Assigned { interpreter_emp_code, no_op, .. } => {
                    if no_op {
                        println!("already assigned to {interpreter_emp_code}");
                    } else {
                        println!("assigned to {interpreter_emp_code}");
                    }
                }
                RunnerOutcome::Pooled { deadline } => {
                    println!("pooled, deadline {}", deadline.to_rfc3339());
                }
                RunnerOutcome::Escalated { reason, message } => {
                    println!("escalated ({reason}): {message}");
                }
            }
            Ok(())
        }
        BookingAction::Suggest { booking_id, max_candidates } => {
            let breakdown = engine.suggest_candidates(&booking_id, max_candidates)?;
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
            Ok(())
        }
        BookingAction::Show { booking_id } => {
            let booking = engine.get_booking(&booking_id)?;
            println!("{}", serde_json::to_string_pretty(&booking)?);
            Ok(())
        }
    }
}
