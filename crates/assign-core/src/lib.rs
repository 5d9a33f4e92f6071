//! # Assign Engine Core
//!
//! Core decision engine for automatic interpreter assignment. It implements a
//! CLI-first philosophy where all operations are available via a standalone
//! CLI binary, with persistence, scoring and policy management all living in
//! this library.
//!
//! ## Architecture
//!
//! - **Policy Store**: the singleton scoring/fairness policy and its mode-lock
//!   rules
//! - **Conflict Detector** / **Fairness Accountant** / **DR History
//!   Inspector**: pure read-side checks the Scorer and Runner consult
//! - **Scorer**: a pure, deterministic multi-objective scoring function
//! - **Assignment Runner**: orchestrates one assignment decision end to end
//! - **Pool Processor** / **Scheduler** / **Emergency Override**: the
//!   deferred-assignment batch path
//! - **Error-Recovery Manager**: classifies and recovers from failed pool
//!   entries
//! - **Storage**: SQLite-based persistence, TOML-based configuration
//!
//! ## Key Components
//!
//! - [`Runner`]: orchestrates a single assignment decision
//! - [`Database`]: all persistence
//! - [`EngineConfig`]: application configuration management

pub mod config;
pub mod conflict;
pub mod dr;
pub mod dynamic_pool;
pub mod emergency;
pub mod error;
pub mod fairness;
pub mod model;
pub mod ops;
pub mod policy;
pub mod pool;
pub mod recovery;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod scoring;
pub mod storage;

pub use config::EngineConfig;
pub use error::{DatabaseError, EngineError, PolicyError, ReasonCode, ValidationError};
pub use model::{
    AssignmentLog, AssignmentOutcome, Booking, BookingStatus, CanonicalVector, DrSubType,
    GroupKind, Interpreter, MeetingType, MeetingTypePriority, Mode, Policy, PoolAction,
    PoolEntryHistory, PoolSubState,
};
pub use ops::Engine;
pub use runner::{Runner, RunnerOutcome};
pub use scoring::ScoreBreakdown;
pub use storage::{Database, PoolStats};
