//! Notification pipeline
//!
//! Subsystems queue notifications through [`NotificationThrottle::schedule`];
//! the notification job flushes them as digests to every configured channel.

pub mod config;
pub mod notifier;
pub mod throttle;

pub use config::{ChannelConfig, Frequencies, NotificationConfig, Verbosity};
pub use notifier::{ChatChannel, EmailChannel, LogChannel, NotificationChannel, Notifier, NotifierError};
pub use throttle::{NotificationThrottle, ThrottleError};
