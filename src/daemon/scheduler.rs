use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::fanout::panic_message;
use super::{Job, JobKind};
use crate::config::{JobConfig, JobsConfig};
use crate::storage::{MetricStore, UnitOfWork};

/// Run counters of one job
#[derive(Debug, Default)]
struct JobStatus {
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl JobStatus {
    fn record(&self, ok: bool) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !ok {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        *self.last_run.lock() = Some(Utc::now());
    }
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub job: JobKind,
    pub registered: bool,
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
}

struct Slot {
    job: Option<Arc<dyn Job>>,
    schedule: JobConfig,
    /// Cleared by `stop`; workers exit at their next iteration
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    status: Arc<JobStatus>,
}

/// Runs the daemon's jobs, one worker each
pub struct DaemonScheduler {
    store: Arc<dyn MetricStore>,
    slots: BTreeMap<JobKind, Slot>,
    /// Set by the first `start`; later calls return at once
    started: AtomicBool,
}

impl DaemonScheduler {
    pub fn new(store: Arc<dyn MetricStore>, schedules: &JobsConfig) -> Self {
        let slots = JobKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    Slot {
                        job: None,
                        schedule: schedules.get(kind),
                        active: Arc::new(AtomicBool::new(schedules.get(kind).enabled)),
                        running: Arc::new(AtomicBool::new(false)),
                        status: Arc::new(JobStatus::default()),
                    },
                )
            })
            .collect();

        Self {
            store,
            slots,
            started: AtomicBool::new(false),
        }
    }

    /// Register the job that fills a slot
    pub fn with_job(mut self, kind: JobKind, job: Arc<dyn Job>) -> Self {
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.job = Some(job);
        }
        self
    }

    /// Start a worker per registered job and wait until all of them exit.
    ///
    /// Only the first call spawns workers. A `stop` issued before `start`
    /// still applies: the workers exit on their first check.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already started, ignoring");
            return;
        }

        let mut handles = Vec::new();

        for (kind, slot) in &self.slots {
            let Some(job) = slot.job.clone() else {
                info!(job = %kind, "No job registered, skipping");
                continue;
            };

            slot.running.store(true, Ordering::SeqCst);

            handles.push(tokio::spawn(run_worker(
                *kind,
                job,
                self.store.clone(),
                slot.schedule.interval,
                slot.active.clone(),
                slot.running.clone(),
                slot.status.clone(),
            )));
        }

        info!(workers = handles.len(), "Scheduler started");

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Worker terminated abnormally");
            }
        }

        info!("Scheduler stopped");
    }

    /// Ask every worker to exit after its current iteration
    pub fn stop(&self) {
        for slot in self.slots.values() {
            slot.active.store(false, Ordering::SeqCst);
        }
        info!("Scheduler stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.slots.values().any(|s| s.running.load(Ordering::SeqCst))
    }

    pub fn status(&self) -> Vec<JobSnapshot> {
        self.slots
            .iter()
            .map(|(kind, slot)| JobSnapshot {
                job: *kind,
                registered: slot.job.is_some(),
                enabled: slot.schedule.enabled,
                running: slot.running.load(Ordering::SeqCst),
                interval_secs: slot.schedule.interval.as_secs(),
                runs: slot.status.runs.load(Ordering::SeqCst),
                failures: slot.status.failures.load(Ordering::SeqCst),
                last_run: *slot.status.last_run.lock(),
            })
            .collect()
    }
}

async fn run_worker(
    kind: JobKind,
    job: Arc<dyn Job>,
    store: Arc<dyn MetricStore>,
    interval: Duration,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    status: Arc<JobStatus>,
) {
    info!(job = %kind, interval_secs = interval.as_secs(), "Job worker started");

    loop {
        if !active.load(Ordering::SeqCst) {
            info!(job = %kind, "Job disabled or stopped, worker exiting");
            break;
        }

        let started = Instant::now();
        let mut uow = UnitOfWork::new(store.clone());

        match AssertUnwindSafe(job.run(&mut uow)).catch_unwind().await {
            Ok(Ok(())) => {
                status.record(true);
                debug!(job = %kind, elapsed_ms = started.elapsed().as_millis() as u64, "Job iteration complete");
            }
            Ok(Err(e)) => {
                status.record(false);
                error!(job = %kind, error = %e, "Job iteration failed");
            }
            Err(panic) => {
                status.record(false);
                error!(job = %kind, error = %panic_message(panic), "Job iteration panicked");
            }
        }

        if !uow.pending().is_empty() {
            warn!(job = %kind, pending = uow.pending().len(), "Discarding uncommitted changes");
        }

        tokio::time::sleep(interval).await;
    }

    running.store(false, Ordering::SeqCst);
}
