//! Independent timers for ingestion jobs
//!
//! Each registered job gets its own timer task. When the timer fires while
//! the previous run is still going, the trigger is dropped rather than
//! queued. Runs execute in their own task, so an error or panic is recorded
//! in the job's status and the timer keeps going.

use crate::{IngestionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Summary returned by a job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Unit of work the scheduler drives
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<JobReport>;
}

/// When a job fires
#[derive(Debug, Clone)]
pub enum JobTrigger {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl JobTrigger {
    /// Parse a cron expression; 5-field crontab syntax gets a leading seconds field
    ///
    /// ```
    /// use fanbase_ingestion::JobTrigger;
    ///
    /// assert!(JobTrigger::cron("0 */6 * * *").is_ok());
    /// assert!(JobTrigger::cron("not a schedule").is_err());
    /// ```
    pub fn cron(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            IngestionError::ConfigError(format!("Invalid cron expression '{}': {}", expression, e))
        })?;
        Ok(Self::Cron(Box::new(schedule)))
    }

    pub fn every(period: Duration) -> Self {
        Self::Every(period)
    }

    /// Delay from `now` until the next cron fire time
    fn next_cron_delay(schedule: &cron::Schedule, now: DateTime<Utc>) -> Option<Duration> {
        let next = schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

impl fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(schedule) => write!(f, "cron({})", schedule),
            Self::Every(period) => write!(f, "every({}ms)", period.as_millis()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    /// Idle, and the most recent run failed
    Failed,
}

/// Point-in-time view of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub trigger: String,
    pub state: JobState,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<JobReport>,
    pub runs: u64,
    pub failures: u64,
    pub skipped_triggers: u64,
}

struct JobEntry {
    job: Arc<dyn ScheduledJob>,
    trigger: JobTrigger,
    in_flight: AtomicBool,
    status: Mutex<JobStatus>,
}

impl JobEntry {
    fn status(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run unless one is in flight
    fn fire(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            let skipped = {
                let mut status = self.status();
                status.skipped_triggers += 1;
                status.skipped_triggers
            };
            warn!(
                job = self.job.name(),
                skipped_triggers = skipped,
                "Previous run still in progress, skipping trigger"
            );
            return None;
        }

        let entry = Arc::clone(self);
        Some(tokio::spawn(async move { entry.execute().await }))
    }

    async fn execute(self: Arc<Self>) {
        let name = self.job.name().to_string();
        let started_at = Utc::now();
        {
            let mut status = self.status();
            status.state = JobState::Running;
            status.last_started_at = Some(started_at);
            status.runs += 1;
        }
        info!(job = %name, "Job started");

        let job = Arc::clone(&self.job);
        let outcome = tokio::spawn(async move { job.run().await }).await;
        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - started_at).num_milliseconds();

        {
            let mut status = self.status();
            status.last_finished_at = Some(finished_at);
            match outcome {
                Ok(Ok(report)) => {
                    info!(
                        job = %name,
                        elapsed_ms,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Job finished"
                    );
                    status.state = JobState::Idle;
                    status.last_error = None;
                    status.last_report = Some(report);
                }
                Ok(Err(e)) => {
                    error!(job = %name, elapsed_ms, error = %e, "Job failed");
                    status.state = JobState::Failed;
                    status.failures += 1;
                    status.last_error = Some(e.to_string());
                }
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        "job panicked".to_string()
                    } else {
                        join_error.to_string()
                    };
                    error!(job = %name, elapsed_ms, error = %message, "Job aborted");
                    status.state = JobState::Failed;
                    status.failures += 1;
                    status.last_error = Some(message);
                }
            }
        }

        self.in_flight.store(false, Ordering::Release);
    }

    async fn run_timer(self: Arc<Self>) {
        match self.trigger.clone() {
            JobTrigger::Every(period) => {
                let period = period.max(Duration::from_millis(1));
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    self.fire();
                }
            }
            JobTrigger::Cron(schedule) => loop {
                let Some(delay) = JobTrigger::next_cron_delay(&schedule, Utc::now()) else {
                    warn!(job = self.job.name(), "Cron schedule has no upcoming runs");
                    return;
                };
                debug!(job = self.job.name(), delay_secs = delay.as_secs(), "Next run scheduled");
                tokio::time::sleep(delay).await;
                self.fire();
            },
        }
    }
}

/// Owns the job timers and their status
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Arc<JobEntry>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Names must be unique.
    pub fn add(&mut self, job: Arc<dyn ScheduledJob>, trigger: JobTrigger) -> Result<()> {
        let name = job.name().to_string();
        if self.entries.iter().any(|e| e.job.name() == name) {
            return Err(IngestionError::ConfigError(format!(
                "Job '{}' registered twice",
                name
            )));
        }

        let status = JobStatus {
            name,
            trigger: trigger.to_string(),
            state: JobState::Idle,
            last_started_at: None,
            last_finished_at: None,
            last_error: None,
            last_report: None,
            runs: 0,
            failures: 0,
            skipped_triggers: 0,
        };
        self.entries.push(Arc::new(JobEntry {
            job,
            trigger,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(status),
        }));
        Ok(())
    }

    /// Spawn one timer task per job. Calling it again is a no-op.
    pub fn start(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if !timers.is_empty() {
            return;
        }

        for entry in &self.entries {
            info!(job = entry.job.name(), trigger = %entry.trigger, "Scheduling job");
            timers.push(tokio::spawn(Arc::clone(entry).run_timer()));
        }
    }

    /// Run a job now, outside its schedule
    ///
    /// Returns `None` when the job is already running and the trigger was dropped.
    pub fn trigger(&self, name: &str) -> Result<Option<JoinHandle<()>>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.job.name() == name)
            .ok_or_else(|| IngestionError::Internal(format!("Unknown job '{}'", name)))?;
        Ok(entry.fire())
    }

    pub fn status(&self, name: &str) -> Option<JobStatus> {
        self.entries
            .iter()
            .find(|e| e.job.name() == name)
            .map(|e| e.status().clone())
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.entries.iter().map(|e| e.status().clone()).collect()
    }

    /// Stop all timers. Runs already in progress finish on their own.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in timers.drain(..) {
            handle.abort();
        }
        info!("Scheduler stopped");
    }
}
