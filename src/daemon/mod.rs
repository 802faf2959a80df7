//! Background job scheduling
//!
//! The [`DaemonScheduler`] runs one worker per named job. Each worker loops:
//! check its flag, run one iteration against a fresh [`UnitOfWork`], sleep
//! the job's interval. Failures and panics are logged and retried at the
//! next interval.
//!
//! [`UnitOfWork`]: crate::storage::UnitOfWork

pub mod fanout;
pub mod jobs;
pub mod scheduler;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::aggregate::AggregateError;
use crate::alerts::ThrottleError;
use crate::detect::DetectError;
use crate::probe::ProbeError;
use crate::storage::{StoreError, UnitOfWork};

pub use fanout::{fan_out, FanOutError};
pub use jobs::{CacheJob, CleanJob, DiscrepancyJob, HealthJob, NotificationJob, PingJob};
pub use scheduler::{DaemonScheduler, JobSnapshot};

/// Named job slots of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ping,
    Cache,
    Clean,
    Demo,
    Discrepancy,
    Notification,
    Health,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::Ping,
        JobKind::Cache,
        JobKind::Clean,
        JobKind::Demo,
        JobKind::Discrepancy,
        JobKind::Notification,
        JobKind::Health,
    ];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Ping => "ping",
            JobKind::Cache => "cache",
            JobKind::Clean => "clean",
            JobKind::Demo => "demo",
            JobKind::Discrepancy => "discrepancy",
            JobKind::Notification => "notification",
            JobKind::Health => "health",
        };
        f.write_str(name)
    }
}

/// One iteration of a scheduled job
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError>;
}

/// Job errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("Notification error: {0}")]
    Notification(#[from] ThrottleError),

    #[error("{0}")]
    Other(String),
}
