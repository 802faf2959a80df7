//! Rate-limited notification digests

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::config::{Frequencies, NotificationConfig, Verbosity};
use super::notifier::Notifier;
use crate::data::{DisplayZone, Notification, Severity};
use crate::storage::{ChangeSet, DiscrepancyFilter, MetricStore, StoreError};

/// Queues notifications and flushes them as digests, at most once per
/// severity per configured interval.
pub struct NotificationThrottle {
    store: Arc<dyn MetricStore>,
    notifier: Notifier,
    frequencies: Frequencies,
    verbosity: Verbosity,
    zone: DisplayZone,
    subject: String,
    /// Last dispatch per severity, `None` until seeded from the store
    last_dispatch: Mutex<Option<HashMap<Severity, DateTime<Utc>>>>,
}

impl NotificationThrottle {
    pub fn new(
        store: Arc<dyn MetricStore>,
        notifier: Notifier,
        frequencies: Frequencies,
        verbosity: Verbosity,
        zone: DisplayZone,
    ) -> Self {
        Self {
            store,
            notifier,
            frequencies,
            verbosity,
            zone,
            subject: NotificationConfig::default().subject,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn from_config(
        store: Arc<dyn MetricStore>,
        notifier: Notifier,
        config: &NotificationConfig,
    ) -> Result<Self, ThrottleError> {
        let zone = DisplayZone::parse(config.time_zone.as_deref()).map_err(ThrottleError::Config)?;
        Ok(Self::new(store, notifier, config.frequencies, config.verbosity, zone)
            .with_subject(config.subject.clone()))
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn zone(&self) -> &DisplayZone {
        &self.zone
    }

    /// Queue a notification for the next digest
    pub async fn schedule(&self, message: String, severity: Severity) -> Result<Notification, ThrottleError> {
        let notification = self.store.add_notification(message, severity, Utc::now()).await?;
        debug!(id = notification.id, severity = %severity, "Notification scheduled");
        Ok(notification)
    }

    /// Flush the queue if any queued severity is due. Returns whether a digest went out.
    pub async fn process_queue(&self) -> Result<bool, ThrottleError> {
        self.process_queue_at(Utc::now()).await
    }

    pub async fn process_queue_at(&self, now: DateTime<Utc>) -> Result<bool, ThrottleError> {
        let mut guard = self.last_dispatch.lock().await;
        if guard.is_none() {
            *guard = Some(self.seed().await?);
        }
        let last_dispatch = guard.get_or_insert_with(HashMap::new);

        let queued = self.store.unsent_notifications().await?;
        if queued.is_empty() {
            return Ok(false);
        }

        let due: Vec<Severity> = Severity::ALL
            .into_iter()
            .filter(|s| queued.iter().any(|n| n.severity == *s))
            .filter(|s| self.is_due(&*last_dispatch, *s, now))
            .collect();
        if due.is_empty() {
            debug!(queued = queued.len(), "No severity due, holding notifications");
            return Ok(false);
        }

        let outstanding = self.store.discrepancies(DiscrepancyFilter::Open).await?.len();
        let body = compose(&queued, self.verbosity, &self.zone, outstanding);

        if let Err(e) = self.notifier.notify(&self.subject, &body).await {
            error!(error = %e, "Digest delivery failed on some channels");
        }

        self.store
            .apply(ChangeSet {
                sent: queued.iter().map(|n| (n.id, now)).collect(),
                ..Default::default()
            })
            .await?;

        for notification in &queued {
            last_dispatch.insert(notification.severity, now);
        }

        info!(
            notifications = queued.len(),
            due = ?due,
            "Notification digest sent"
        );
        Ok(true)
    }

    fn is_due(&self, last_dispatch: &HashMap<Severity, DateTime<Utc>>, severity: Severity, now: DateTime<Utc>) -> bool {
        let Some(last) = last_dispatch.get(&severity) else {
            return true;
        };
        match chrono::Duration::from_std(self.frequencies.for_severity(severity)) {
            Ok(interval) => now - *last >= interval,
            Err(_) => false,
        }
    }

    async fn seed(&self) -> Result<HashMap<Severity, DateTime<Utc>>, ThrottleError> {
        let mut seeded = HashMap::new();
        for severity in Severity::ALL {
            if let Some(sent) = self.store.last_sent(severity).await? {
                seeded.insert(severity, sent);
            }
        }
        Ok(seeded)
    }
}

/// Render queued notifications as one digest
pub fn compose(notifications: &[Notification], verbosity: Verbosity, zone: &DisplayZone, outstanding: usize) -> String {
    let line = |n: &Notification| format!("[{}] {}", zone.format(n.date_created), n.message);

    match verbosity {
        Verbosity::Brief => {
            let mut lines: Vec<String> = notifications.iter().map(line).collect();
            lines.push(outstanding_note(outstanding));
            lines.join("\n")
        }
        Verbosity::Normal => {
            let mut letter = String::from("Dear recipient,\n\nFollowing are the notification messages from Status Site.\n\n");

            for severity in Severity::ALL.into_iter().rev() {
                let section: Vec<String> = notifications
                    .iter()
                    .filter(|n| n.severity == severity)
                    .map(line)
                    .collect();
                if section.is_empty() {
                    continue;
                }
                letter.push_str(&format!("Severity {}:\n{}\n\n", severity, section.join("\n")));
            }

            letter.push_str(&outstanding_note(outstanding));
            letter.push_str("\n\nAlways yours,\nNotificator\n");
            letter
        }
    }
}

pub fn outstanding_note(outstanding: usize) -> String {
    match outstanding {
        0 => "There are no outstanding issues. Well done.".to_string(),
        1 => "There is still outstanding 1 issue. See admin panel.".to_string(),
        n => format!("There are still outstanding {} issues. See admin panel.", n),
    }
}

/// Throttle errors
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}
