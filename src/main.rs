//! Vigil daemon
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - VIGIL_CONFIG: Path of the YAML config (default: vigil.yml, optional)
//! - VIGIL_STATUS_HOST / VIGIL_STATUS_PORT: Serve the status endpoint
//! - VIGIL_TIME_ZONE: Zone used in notification timestamps
//! - RUST_LOG: Log level (default: info)

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::aggregate::MetricAggregator;
use vigil::alerts::{NotificationThrottle, Notifier};
use vigil::api::{run_server, AppState};
use vigil::daemon::{
    CacheJob, CleanJob, DaemonScheduler, DiscrepancyJob, HealthJob, JobKind, NotificationJob,
    PingJob,
};
use vigil::detect::DiscrepancyService;
use vigil::health::HealthReporter;
use vigil::probe::{HttpProber, Prober, RemoteProber};
use vigil::{MemoryStore, MetricStore, MonitorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::load()?;
    config.validate()?;

    tracing::info!("Vigil configuration:");
    for kind in JobKind::ALL {
        let job = config.jobs.get(kind);
        tracing::info!(
            "  {} job: {} every {} seconds",
            kind,
            if job.enabled { "enabled" } else { "disabled" },
            job.interval.as_secs()
        );
    }
    tracing::info!("  Ping targets: {}", config.ping.targets.len());
    tracing::info!("  Notification channels: {}", config.notification.channels.len());

    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::with_ping_settings(config.ping.targets.clone()));

    let notifier = Notifier::from_config(&config.notification.channels)?;
    let throttle = Arc::new(NotificationThrottle::from_config(
        store.clone(),
        notifier,
        &config.notification,
    )?);

    let prober: Arc<dyn Prober> = match &config.ping.remote_endpoint {
        Some(endpoint) => {
            tracing::info!("  Probing through {}", endpoint);
            Arc::new(RemoteProber::new(endpoint)?)
        }
        None => Arc::new(HttpProber::new()?),
    };

    let discrepancies = Arc::new(DiscrepancyService::new(
        store.clone(),
        throttle.clone(),
        config.discrepancy.clone(),
        *throttle.zone(),
    ));

    let scheduler = Arc::new(
        DaemonScheduler::new(store.clone(), &config.jobs)
            .with_job(JobKind::Ping, Arc::new(PingJob::new(prober)))
            .with_job(
                JobKind::Cache,
                Arc::new(CacheJob::new(Arc::new(MetricAggregator::new(store.clone())))),
            )
            .with_job(JobKind::Clean, Arc::new(CleanJob::new(config.clean.max_age)))
            .with_job(JobKind::Discrepancy, Arc::new(DiscrepancyJob::new(discrepancies)))
            .with_job(JobKind::Notification, Arc::new(NotificationJob::new(throttle)))
            .with_job(
                JobKind::Health,
                Arc::new(HealthJob::new(Arc::new(HealthReporter::new(store.clone())))),
            ),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let status_handle = config.status.clone().map(|status_config| {
        let state = Arc::new(AppState {
            scheduler: scheduler.clone(),
            store: store.clone(),
        });
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = run_server(status_config, state, shutdown).await {
                tracing::error!(error = %e, "Status endpoint failed");
            }
        })
    });

    let workers = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping jobs...");
    scheduler.stop();
    let _ = shutdown_tx.send(true);

    workers.await?;
    if let Some(handle) = status_handle {
        handle.await?;
    }

    tracing::info!("Vigil stopped");
    Ok(())
}
