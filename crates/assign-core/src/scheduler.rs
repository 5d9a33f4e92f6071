//! Scheduler: a single-leader periodic timer that fires the Pool Processor
//! on a mode-dependent cadence.
//!
//! Grounded on the sidecar's `KeyRotationManager::start_background_task`
//! (`examples/seanchatmangpt-knhk/rust/knhk-sidecar/src/key_rotation.rs`):
//! a background `tokio::spawn` loop, owned `JoinHandle`, explicit stop.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::Mode;
use crate::pool::PoolProcessor;
use crate::storage::Database;

fn mode_interval(mode: Mode, config: &EngineConfig) -> StdDuration {
    let secs = match mode {
        Mode::Balance => 60 * 60,
        Mode::Normal => 30 * 60,
        Mode::Urgent => 5 * 60,
        Mode::Custom => config.custom_scheduler_interval_secs.unwrap_or(30 * 60),
    };
    StdDuration::from_secs(secs)
}

/// Current scheduler state, reported by `status()`.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval: StdDuration,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick_processed: usize,
    pub tick_count: u64,
}

struct Inner {
    status: Mutex<SchedulerStatus>,
    running_guard: Mutex<()>,
}

pub struct Scheduler {
    db: Database,
    processor: Arc<PoolProcessor>,
    config: EngineConfig,
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(db: Database, processor: PoolProcessor, config: EngineConfig) -> Self {
        Self {
            db,
            processor: Arc::new(processor),
            config,
            inner: Arc::new(Inner {
                status: Mutex::new(SchedulerStatus {
                    running: false,
                    interval: StdDuration::from_secs(30 * 60),
                    last_tick_at: None,
                    last_tick_processed: 0,
                    tick_count: 0,
                }),
                running_guard: Mutex::new(()),
            }),
            handle: Mutex::new(None),
            stop_tx: Mutex::new(None),
        }
    }

    fn current_interval(&self) -> Result<StdDuration, EngineError> {
        let policy = self.db.load_policy()?;
        Ok(mode_interval(policy.mode, &self.config))
    }

    /// Starts the background loop. A no-op if already running.
    pub async fn start(&self, interval_override: Option<StdDuration>) -> Result<(), EngineError> {
        let mut handle_guard = self.handle.lock().await;
        if handle_guard.is_some() {
            return Ok(());
        }
        let interval = interval_override
            .ok_or(())
            .or_else(|_| self.current_interval())?;

        let (tx, mut rx) = watch::channel(false);
        let processor = self.processor.clone();
        let inner = self.inner.clone();

        {
            let mut status = inner.status.lock().await;
            status.running = true;
            status.interval = interval;
        }

        let task = tokio::spawn(async move {
            // Drift-corrected: schedule from the expected wakeup, not the
            // actual completion time of the previous tick.
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let guard = match inner.running_guard.try_lock() {
                            Ok(g) => g,
                            Err(_) => {
                                warn!("scheduler tick skipped: previous tick still running");
                                continue;
                            }
                        };
                        match processor.process_tick().await {
                            Ok(report) => {
                                info!(claimed = report.claimed, assigned = report.assigned, "pool tick complete");
                                let mut status = inner.status.lock().await;
                                status.last_tick_at = Some(Utc::now());
                                status.last_tick_processed = report.claimed;
                                status.tick_count += 1;
                            }
                            Err(error) => {
                                warn!(%error, "pool tick failed");
                            }
                        }
                        drop(guard);
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *self.handle.lock().await = Some(task);
        *self.stop_tx.lock().await = Some(tx);
        Ok(())
    }

    /// Signals the loop to stop. An in-flight tick is allowed to finish.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        let mut status = self.inner.status.lock().await;
        status.running = false;
    }

    pub async fn restart(&self, interval_override: Option<StdDuration>) -> Result<(), EngineError> {
        self.stop().await;
        self.start(interval_override).await
    }

    /// Blocks on the current tick's completion before running a fresh one.
    pub async fn process_now(&self) -> Result<crate::pool::TickReport, EngineError> {
        let _guard = self.inner.running_guard.lock().await;
        let report = self.processor.process_tick().await?;
        let mut status = self.inner.status.lock().await;
        status.last_tick_at = Some(Utc::now());
        status.last_tick_processed = report.claimed;
        status.tick_count += 1;
        Ok(report)
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.inner.status.lock().await.clone()
    }
}
