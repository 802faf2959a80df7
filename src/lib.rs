//! Vigil: background monitoring and alerting engine
//!
//! Runs a fixed set of repeating jobs against a metric store: probing HTTP
//! targets, recomputing rolling aggregates, detecting anomalies in the
//! collected series and sending throttled notification digests.
//!
//! # Components
//!
//! - **DaemonScheduler**: one worker per named job, polled cancellation
//! - **PingProber**: direct or remote-delegated HTTP probes raced against a timeout
//! - **MetricAggregator**: day/hour min/max/avg and load labels
//! - **DiscrepancyService**: gap and run-length detectors, record/resolve lifecycle
//! - **NotificationThrottle**: per-severity rate-limited digests to log, chat and email
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil::aggregate::MetricAggregator;
//! use vigil::config::MonitorConfig;
//! use vigil::daemon::{CacheJob, DaemonScheduler, JobKind};
//! use vigil::storage::MemoryStore;
//!
//! # async fn run() {
//! let config = MonitorConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! let aggregator = Arc::new(MetricAggregator::new(store.clone()));
//!
//! let scheduler = DaemonScheduler::new(store, &config.jobs)
//!     .with_job(JobKind::Cache, Arc::new(CacheJob::new(aggregator)));
//! scheduler.start().await;
//! # }
//! ```

pub mod aggregate;
pub mod alerts;
pub mod api;
pub mod config;
pub mod daemon;
pub mod data;
pub mod detect;
pub mod health;
pub mod probe;
pub mod retention;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, MonitorConfig};
pub use daemon::{DaemonScheduler, JobKind};
pub use storage::{MemoryStore, MetricStore, StoreError};
