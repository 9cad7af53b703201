//! Cycle Scheduler - periodic, bounded-concurrency backup rounds
//!
//! State machine:
//! - Idle -> Running: period tick (the first cycle starts immediately)
//! - Running -> Draining: period elapsed while workers are still outstanding
//! - Running/Draining -> Idle: every worker of the cycle finished or was abandoned
//!
//! Cycles never overlap. A cycle that outlives its period delays the next
//! one; missed ticks are not replayed.

use crate::application::result_sink::ResultSink;
use crate::application::worker::constants::{
    DEFAULT_CYCLE_DEADLINE, DEFAULT_CYCLE_PERIOD, DEFAULT_POOL_SIZE, DEFAULT_SHUTDOWN_GRACE,
    FAR_FUTURE,
};
use crate::application::worker::{shutdown_channel, BackupWorker, ShutdownToken, WorkerSignals};
use crate::domain::{
    AttemptRecord, BackupAttempt, Cycle, CycleId, CycleReport, FailureKind, LoadError, Target,
};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Draining,
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycle starts
    pub period: Duration,
    /// Maximum concurrent sessions
    pub pool_size: usize,
    /// Outstanding workers are abandoned after this long
    pub cycle_deadline: Duration,
    /// In-flight workers get this long after a shutdown request
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_CYCLE_PERIOD,
            pool_size: DEFAULT_POOL_SIZE,
            cycle_deadline: DEFAULT_CYCLE_DEADLINE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(AppError::Config("cycle period must be non-zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(AppError::Config("pool size must be at least 1".to_string()));
        }
        if self.cycle_deadline.is_zero() {
            return Err(AppError::Config("cycle deadline must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Everything a dispatched target task needs
#[derive(Clone)]
struct DispatchContext {
    cycle: Cycle,
    worker: Arc<BackupWorker>,
    sink: Arc<ResultSink>,
    permits: Arc<Semaphore>,
    time_provider: Arc<dyn TimeProvider>,
    signals: WorkerSignals,
}

/// Fires backup cycles over all targets
pub struct CycleScheduler {
    targets: Arc<[Target]>,
    worker: Arc<BackupWorker>,
    sink: Arc<ResultSink>,
    time_provider: Arc<dyn TimeProvider>,
    config: SchedulerConfig,
    state_tx: watch::Sender<SchedulerState>,
    report_tx: Option<mpsc::UnboundedSender<CycleReport>>,
    last_cycle: AtomicU64,
}

impl CycleScheduler {
    /// Create a scheduler
    ///
    /// # Errors
    /// - AppError::Load if `targets` is empty
    /// - AppError::Config if `config` is invalid
    pub fn new(
        targets: Vec<Target>,
        worker: Arc<BackupWorker>,
        sink: Arc<ResultSink>,
        time_provider: Arc<dyn TimeProvider>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(LoadError::Empty.into());
        }
        config.validate()?;

        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            targets: targets.into(),
            worker,
            sink,
            time_provider,
            config,
            state_tx,
            report_tx: None,
            last_cycle: AtomicU64::new(0),
        })
    }

    /// Also deliver every finished cycle's report on `tx`
    pub fn with_report_sender(mut self, tx: mpsc::UnboundedSender<CycleReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Observe state transitions
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Run cycles until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            targets = self.targets.len(),
            period_secs = self.config.period.as_secs(),
            pool_size = self.config.pool_size,
            "Scheduler started"
        );

        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle(shutdown.clone()).await;
            self.publish(report);

            if shutdown.is_shutdown() {
                break;
            }
        }

        self.set_state(SchedulerState::Idle);
        info!("Scheduler stopped");
        Ok(())
    }

    /// Run exactly one cycle and return its report
    pub async fn run_once(&self, shutdown: ShutdownToken) -> CycleReport {
        let report = self.run_cycle(shutdown).await;
        self.publish(report.clone());
        report
    }

    async fn run_cycle(&self, shutdown: ShutdownToken) -> CycleReport {
        let cycle_id: CycleId = self.last_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle = Cycle::new(cycle_id, self.time_provider.now());
        self.set_state(SchedulerState::Running);
        info!(
            cycle = cycle_id,
            label = %cycle.label(),
            targets = self.targets.len(),
            "Backup cycle started"
        );

        let (abandon_tx, abandon) = shutdown_channel();
        let ctx = DispatchContext {
            cycle: cycle.clone(),
            worker: Arc::clone(&self.worker),
            sink: Arc::clone(&self.sink),
            permits: Arc::new(Semaphore::new(self.config.pool_size)),
            time_provider: Arc::clone(&self.time_provider),
            signals: WorkerSignals {
                shutdown: shutdown.clone(),
                abandon,
            },
        };

        let mut tasks = JoinSet::new();
        for target in self.targets.iter().cloned() {
            tasks.spawn(dispatch(ctx.clone(), target));
        }
        drop(ctx);

        let started = Instant::now();
        let period_end = sleep(self.config.period);
        let deadline = sleep(self.config.cycle_deadline);
        let grace = sleep(self.config.shutdown_grace);
        tokio::pin!(period_end, deadline, grace);

        let mut shutdown_watch = shutdown;
        let mut shutdown_seen = false;
        let mut period_elapsed = false;
        let mut abandoned = false;
        let mut records: Vec<AttemptRecord> = Vec::with_capacity(self.targets.len());

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(record)) => records.push(record),
                    Some(Err(e)) => error!(cycle = cycle_id, error = %e, "Target task lost"),
                },
                _ = &mut period_end, if !period_elapsed => {
                    period_elapsed = true;
                    self.set_state(SchedulerState::Draining);
                    warn!(
                        cycle = cycle_id,
                        outstanding = tasks.len(),
                        "Cycle period elapsed with workers outstanding, draining before next cycle"
                    );
                }
                _ = &mut deadline, if !abandoned => {
                    abandoned = true;
                    abandon_tx.shutdown();
                    warn!(
                        cycle = cycle_id,
                        outstanding = tasks.len(),
                        deadline_secs = self.config.cycle_deadline.as_secs(),
                        "Cycle deadline reached, abandoning outstanding workers"
                    );
                }
                _ = shutdown_watch.wait(), if !shutdown_seen => {
                    shutdown_seen = true;
                    grace.as_mut().reset(instant_after(self.config.shutdown_grace));
                    info!(
                        cycle = cycle_id,
                        outstanding = tasks.len(),
                        grace_secs = self.config.shutdown_grace.as_secs(),
                        "Shutdown requested, waiting for in-flight workers"
                    );
                }
                _ = &mut grace, if shutdown_seen && !abandoned => {
                    abandoned = true;
                    abandon_tx.shutdown();
                    warn!(
                        cycle = cycle_id,
                        outstanding = tasks.len(),
                        "Shutdown grace period expired, abandoning outstanding workers"
                    );
                }
            }
        }

        self.account_for_lost_targets(&mut records);
        self.set_state(SchedulerState::Idle);

        CycleReport {
            cycle: cycle_id,
            label: cycle.label(),
            started_at: cycle.started_at(),
            finished_at: cycle.started_at()
                + chrono::Duration::from_std(started.elapsed()).unwrap_or_default(),
            records,
        }
    }

    /// Guarantee one record per target, in target-list order
    fn account_for_lost_targets(&self, records: &mut Vec<AttemptRecord>) {
        let position: HashMap<&str, usize> = self
            .targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id(), i))
            .collect();

        for target in self.targets.iter() {
            if !records.iter().any(|r| r.target == target.id()) {
                records.push(self.sink.record_failure(
                    target,
                    0,
                    FailureKind::Panicked,
                    "target task ended without a result",
                ));
            }
        }

        records.sort_by_key(|r| position.get(r.target.as_str()).copied().unwrap_or(usize::MAX));
    }

    fn publish(&self, report: CycleReport) {
        let succeeded: Vec<&str> = report.succeeded().map(|r| r.target.as_str()).collect();
        let failed: Vec<String> = report
            .failed()
            .map(|r| match r.failure_kind() {
                Some(kind) => format!("{} ({}, attempts={})", r.target, kind, r.attempts),
                None => r.target.clone(),
            })
            .collect();

        if failed.is_empty() {
            info!(
                cycle = report.cycle,
                label = %report.label,
                succeeded = succeeded.len(),
                "Backup cycle finished: all targets saved"
            );
        } else {
            warn!(
                cycle = report.cycle,
                label = %report.label,
                succeeded = succeeded.len(),
                failed = failed.len(),
                saved = ?succeeded,
                failures = ?failed,
                "Backup cycle finished with failures"
            );
        }

        if let Some(tx) = &self.report_tx {
            // Observers going away is not an error for the scheduler
            let _ = tx.send(report);
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }
}

/// `now + delay`, saturating to a far-future instant for huge delays
fn instant_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// One target's full path through the cycle: wait for a pool slot, back up,
/// record. Always yields exactly one record.
async fn dispatch(ctx: DispatchContext, target: Target) -> AttemptRecord {
    let DispatchContext {
        cycle,
        worker,
        sink,
        permits,
        time_provider,
        signals,
    } = ctx;
    let mut shutdown = signals.shutdown.clone();
    let mut abandon = signals.abandon.clone();

    let permit = tokio::select! {
        biased;
        _ = abandon.wait() => {
            return sink.record_failure(
                &target,
                0,
                FailureKind::Abandoned,
                "abandoned before start",
            );
        }
        _ = shutdown.wait() => {
            return sink.record_failure(&target, 0, FailureKind::Cancelled, "shutdown before start");
        }
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return sink.record_failure(
                    &target,
                    0,
                    FailureKind::Cancelled,
                    "worker pool closed",
                );
            }
        },
    };

    // Panic isolation: a panicking worker must not take the cycle down
    let task_target = target.clone();
    let handle = tokio::spawn(async move {
        let _permit = permit;
        worker.backup(&task_target, signals).await
    });

    let attempt = match handle.await {
        Ok(attempt) => attempt,
        Err(join_err) => {
            error!(host = %target, error = %join_err, "Backup worker panicked");
            BackupAttempt::failure(
                target.clone(),
                time_provider.now(),
                1,
                FailureKind::Panicked,
                join_err.to_string(),
            )
        }
    };

    // Not raced against abandon: a dropped write could still publish the
    // artifact after the target was reported as abandoned
    sink.record(&cycle, attempt).await
}
