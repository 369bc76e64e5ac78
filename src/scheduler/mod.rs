//! Scheduler driving the three stage pollers on independent timers.
//!
//! Each registered stage runs in its own async task: an immediate poll at
//! startup, then one poll per `poll_interval` tick. Before each poll the
//! scheduler computes the stage's free slots from its claimed-row count and
//! skips the poll entirely (no queue read) when no slots are free. Stage
//! timers never synchronize with each other; a task enqueued by one stage is
//! picked up on the next tick of the downstream stage.
//!
//! Shutdown is graceful: a broadcast signal stops every stage loop after its
//! in-flight poll completes, bounded by a shutdown timeout.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::StageConfig;
use crate::pipeline::StagePoller;

/// Default bound on graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running.
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running.
    #[error("Scheduler is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Statistics for one stage.
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    /// Polls that actually ran.
    pub polls: u64,
    /// Polls skipped because the stage had no free slots.
    pub skipped_polls: u64,
    /// Total rows claimed.
    pub tasks_claimed: u64,
    /// Total claimed rows that advanced.
    pub tasks_advanced: u64,
    /// Total claimed rows that ended terminally failed.
    pub tasks_failed: u64,
}

/// Shared state for tracking stage statistics.
#[derive(Default)]
struct SharedStageStats {
    polls: AtomicU64,
    skipped_polls: AtomicU64,
    tasks_claimed: AtomicU64,
    tasks_advanced: AtomicU64,
    tasks_failed: AtomicU64,
}

impl SharedStageStats {
    fn record_poll(&self, summary: crate::pipeline::PollSummary) {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.tasks_claimed
            .fetch_add(summary.claimed as u64, Ordering::SeqCst);
        self.tasks_advanced
            .fetch_add(summary.advanced as u64, Ordering::SeqCst);
        self.tasks_failed
            .fetch_add(summary.failed as u64, Ordering::SeqCst);
    }

    fn record_skip(&self) {
        self.skipped_polls.fetch_add(1, Ordering::SeqCst);
    }

    fn to_stage_stats(&self) -> StageStats {
        StageStats {
            polls: self.polls.load(Ordering::SeqCst),
            skipped_polls: self.skipped_polls.load(Ordering::SeqCst),
            tasks_claimed: self.tasks_claimed.load(Ordering::SeqCst),
            tasks_advanced: self.tasks_advanced.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
        }
    }
}

struct StageEntry {
    poller: Arc<dyn StagePoller>,
    config: StageConfig,
    stats: Arc<SharedStageStats>,
}

/// Drives registered stage pollers on independent timers.
pub struct Scheduler {
    stages: Vec<StageEntry>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
    is_running: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            stages: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            is_running: AtomicBool::new(false),
        }
    }

    /// Sets the graceful shutdown bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Registers a stage to be driven on its own timer once started.
    pub fn add_stage(&mut self, poller: Arc<dyn StagePoller>, config: StageConfig) {
        self.stages.push(StageEntry {
            poller,
            config,
            stats: Arc::new(SharedStageStats::default()),
        });
    }

    /// Starts one loop per registered stage.
    ///
    /// Every stage polls once immediately, then once per interval tick.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the scheduler is already
    /// running.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        for entry in &self.stages {
            let poller = Arc::clone(&entry.poller);
            let config = entry.config;
            let stats = Arc::clone(&entry.stats);
            let shutdown_rx = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                stage_loop(poller, config, stats, shutdown_rx).await;
            });
            self.handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(stages = self.stages.len(), "Scheduler started");
        Ok(())
    }

    /// Gracefully shuts down all stage loops.
    ///
    /// Sends a shutdown signal to every loop and waits for each to finish
    /// its in-flight poll.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ShutdownTimeout` if the loops don't stop
    /// within the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");

        // Ignore send error - loops may have already stopped
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Stage loop panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.shutdown_timeout, shutdown_future).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                info!("Scheduler shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(SchedulerError::ShutdownTimeout(self.shutdown_timeout))
            }
        }
    }

    /// Returns whether the scheduler is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Current statistics per stage, in registration order.
    pub fn stats(&self) -> Vec<(&'static str, StageStats)> {
        self.stages
            .iter()
            .map(|e| (e.poller.stage_name(), e.stats.to_stage_stats()))
            .collect()
    }
}

/// One stage's timer loop: poll, then wait for the next tick or shutdown.
async fn stage_loop(
    poller: Arc<dyn StagePoller>,
    config: StageConfig,
    stats: Arc<SharedStageStats>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(stage = poller.stage_name(), interval = ?config.poll_interval, "Stage loop started");

    loop {
        run_stage_poll(poller.as_ref(), &config, &stats).await;

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(stage = poller.stage_name(), "Stage loop received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    info!(stage = poller.stage_name(), "Stage loop stopped");
}

/// Runs one throttled poll: computes free slots from the claimed-row count
/// and skips the queue read entirely when the stage is saturated.
async fn run_stage_poll(poller: &dyn StagePoller, config: &StageConfig, stats: &SharedStageStats) {
    let claimed = match poller.claimed_count().await {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(stage = poller.stage_name(), error = %e, "Failed to read claimed count");
            return;
        }
    };

    let available_slots = config.max_concurrent.saturating_sub(claimed);
    if available_slots == 0 {
        debug!(
            stage = poller.stage_name(),
            claimed = claimed,
            max_concurrent = config.max_concurrent,
            "Stage saturated, skipping poll"
        );
        stats.record_skip();
        return;
    }

    let summary = poller.poll(available_slots).await;
    stats.record_poll(summary);
    if summary.claimed > 0 {
        debug!(
            stage = poller.stage_name(),
            claimed = summary.claimed,
            advanced = summary.advanced,
            failed = summary.failed,
            "Poll completed"
        );
    }
}
