//! Error types for the assignment engine.
//!
//! Mirrors the teacher's layered approach: a top-level error enum that
//! wraps per-subsystem error types via `#[from]`, plus a `ReasonCode`
//! that exposes the small set of machine-readable tokens the external
//! interface layer is required to surface.

use thiserror::Error;

/// Machine-readable reason codes surfaced by the external interface layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    InvalidInput,
    PolicyLocked,
    ConflictConcurrentUpdate,
    NoCandidates,
    DrAllBlockedAndNoOverridePossible,
    ProcessingTimeout,
    TransientIo,
    ProcessingFailed,
    CorruptedEntry,
    SystemDegraded,
    AutoAssignDisabled,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            ReasonCode::InvalidInput => "INVALID_INPUT",
            ReasonCode::PolicyLocked => "POLICY_LOCKED",
            ReasonCode::ConflictConcurrentUpdate => "CONFLICT_CONCURRENT_UPDATE",
            ReasonCode::NoCandidates => "NO_CANDIDATES",
            ReasonCode::DrAllBlockedAndNoOverridePossible => {
                "DR_ALL_BLOCKED_AND_NO_OVERRIDE_POSSIBLE"
            }
            ReasonCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
            ReasonCode::TransientIo => "TRANSIENT_IO",
            ReasonCode::ProcessingFailed => "PROCESSING_FAILED",
            ReasonCode::CorruptedEntry => "CORRUPTED_ENTRY",
            ReasonCode::SystemDegraded => "SYSTEM_DEGRADED",
            ReasonCode::AutoAssignDisabled => "AUTO_ASSIGN_DISABLED",
        };
        f.write_str(token)
    }
}

/// Top-level error type for the assignment engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database-related errors
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Policy-related errors
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Validation errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Domain-level failure carrying a reason code for the caller.
    #[error("{message}")]
    Domain {
        reason: ReasonCode,
        message: String,
    },

    /// Serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn domain(reason: ReasonCode, message: impl Into<String>) -> Self {
        EngineError::Domain {
            reason,
            message: message.into(),
        }
    }

    /// The machine-readable reason code for this error.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            EngineError::Database(DatabaseError::Locked) => ReasonCode::TransientIo,
            EngineError::Database(DatabaseError::VersionConflict { .. }) => {
                ReasonCode::ConflictConcurrentUpdate
            }
            EngineError::Database(_) => ReasonCode::ProcessingFailed,
            EngineError::Policy(PolicyError::Locked { .. }) => ReasonCode::PolicyLocked,
            EngineError::Policy(_) => ReasonCode::InvalidInput,
            EngineError::Validation(_) => ReasonCode::InvalidInput,
            EngineError::Domain { reason, .. } => *reason,
            EngineError::Json(_) => ReasonCode::CorruptedEntry,
        }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: std::path::PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("database is locked")]
    Locked,

    /// Row not found
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic-concurrency version check failed.
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: String },
}

/// Policy-specific errors.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A field's value falls outside its hard allowed range.
    #[error("policy field '{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The field cannot be changed while the policy is mode-locked.
    #[error("policy field '{field}' is locked by mode {mode}")]
    Locked { field: String, mode: String },

    /// A threshold ordering invariant was violated (urgent must exceed general).
    #[error("urgent threshold ({urgent}) must be greater than general threshold ({general})")]
    ThresholdOrder { urgent: f64, general: f64 },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value for a field
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for `EngineError`.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
