//! TOML-based engine configuration (ambient concern -- not the Policy, which
//! is a persisted domain entity owned by the Policy Store).
//!
//! Stored at `~/.config/assign-engine/config.toml`, mirroring the teacher's
//! `POMODOROOM_ENV`-keyed data directory convention.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, EngineError};

/// Process-wide engine configuration: database location, scheduler cadence
/// overrides, and tunables that are not part of the persisted `Policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_batch_size")]
    pub pool_batch_size: usize,
    #[serde(default = "default_tick_budget_secs")]
    pub pool_tick_budget_secs: u64,
    #[serde(default = "default_runner_budget_secs")]
    pub runner_budget_secs: u64,
    #[serde(default = "default_availability_budget_ms")]
    pub availability_budget_ms: u64,
    #[serde(default)]
    pub custom_scheduler_interval_secs: Option<u64>,
    #[serde(default)]
    pub custom_pool_lookahead_secs: Option<u64>,
    #[serde(default = "default_custom_parallelism")]
    pub custom_parallelism: usize,
}

fn default_batch_size() -> usize {
    25
}
fn default_tick_budget_secs() -> u64 {
    60
}
fn default_runner_budget_secs() -> u64 {
    10
}
fn default_availability_budget_ms() -> u64 {
    500
}
fn default_custom_parallelism() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_batch_size: default_batch_size(),
            pool_tick_budget_secs: default_tick_budget_secs(),
            runner_budget_secs: default_runner_budget_secs(),
            availability_budget_ms: default_availability_budget_ms(),
            custom_scheduler_interval_secs: None,
            custom_pool_lookahead_secs: None,
            custom_parallelism: default_custom_parallelism(),
        }
    }
}

/// Base directory for config and database files, keyed by `ASSIGN_ENGINE_ENV`.
pub fn data_dir() -> Result<PathBuf, EngineError> {
    let base = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");
    let env = std::env::var("ASSIGN_ENGINE_ENV").unwrap_or_else(|_| "production".to_string());
    let dir = if env == "dev" {
        base.join("assign-engine-dev")
    } else {
        base.join("assign-engine")
    };
    std::fs::create_dir_all(&dir).map_err(|e| {
        EngineError::Database(DatabaseError::QueryFailed(format!(
            "failed to create data dir {}: {e}",
            dir.display()
        )))
    })?;
    Ok(dir)
}

impl EngineConfig {
    fn path() -> Result<PathBuf, EngineError> {
        Ok(data_dir()?.join("config.toml"))
    }

    pub fn database_path() -> Result<PathBuf, EngineError> {
        Ok(data_dir()?.join("assign-engine.sqlite3"))
    }

    /// Load from disk, writing defaults if no file exists yet.
    pub fn load() -> Result<Self, EngineError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: EngineConfig = toml::from_str(&content).map_err(|e| {
                    EngineError::Database(DatabaseError::QueryFailed(format!(
                        "failed to parse config at {}: {e}",
                        path.display()
                    )))
                })?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    pub fn save(&self) -> Result<(), EngineError> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            EngineError::Database(DatabaseError::QueryFailed(format!(
                "failed to serialize config: {e}"
            )))
        })?;
        std::fs::write(Self::path()?, content).map_err(|e| {
            EngineError::Database(DatabaseError::QueryFailed(format!(
                "failed to write config: {e}"
            )))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&s).unwrap();
        assert_eq!(parsed.pool_batch_size, cfg.pool_batch_size);
        assert_eq!(parsed.runner_budget_secs, cfg.runner_budget_secs);
    }
}
