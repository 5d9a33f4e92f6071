//! Per-meeting-type priority threshold CLI commands.

use std::error::Error;

use assign_core::{Engine, MeetingType, MeetingTypePriority};
use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum PriorityAction {
    /// List all configured meeting-type priorities
    List,
    /// Create or update a meeting-type's priority thresholds
    Upsert {
        meeting_type: MeetingTypeArg,
        priority_value: u8,
        urgent_threshold_days: i64,
        general_threshold_days: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MeetingTypeArg {
    Dr,
    Vip,
    Weekly,
    General,
    Urgent,
    President,
    Other,
}

impl From<MeetingTypeArg> for MeetingType {
    fn from(m: MeetingTypeArg) -> MeetingType {
        match m {
            MeetingTypeArg::Dr => MeetingType::Dr,
            MeetingTypeArg::Vip => MeetingType::Vip,
            MeetingTypeArg::Weekly => MeetingType::Weekly,
            MeetingTypeArg::General => MeetingType::General,
            MeetingTypeArg::Urgent => MeetingType::Urgent,
            MeetingTypeArg::President => MeetingType::President,
            MeetingTypeArg::Other => MeetingType::Other,
        }
    }
}

pub async fn run(engine: &Engine, action: PriorityAction) -> Result<(), Box<dyn Error>> {
    match action {
        PriorityAction::List => {
            let priorities = engine.list_priorities()?;
            println!("{}", serde_json::to_string_pretty(&priorities)?);
            Ok(())
        }
        PriorityAction::Upsert {
            meeting_type,
            priority_value,
            urgent_threshold_days,
            general_threshold_days,
        } => {
            let priority = MeetingTypePriority {
                meeting_type: meeting_type.into(),
                priority_value,
                urgent_threshold_days,
                general_threshold_days,
            };
            engine.upsert_priority(&priority)?;
            println!("priority upserted");
            Ok(())
        }
    }
}
