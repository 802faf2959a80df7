//! Notification channels

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::config::ChannelConfig;

/// Transport a digest is delivered through
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError>;
}

/// Writes digests to the log
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        tracing::warn!(subject = %subject, "Notification digest:\n{}", body);
        Ok(())
    }
}

/// Posts digests to a chat webhook
pub struct ChatChannel {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl ChatChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn name(&self) -> &str {
        "chat"
    }

    async fn send(&self, _subject: &str, body: &str) -> Result<(), NotifierError> {
        let payload = serde_json::json!({ "text": body });

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Chat(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Chat(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(url = %self.url, "Chat notification sent");
        Ok(())
    }
}

/// Sends digests by email
pub struct EmailChannel {
    to: Vec<String>,
    from: String,
    #[cfg(feature = "smtp")]
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl EmailChannel {
    #[cfg(feature = "smtp")]
    pub fn new(
        to: Vec<String>,
        from: String,
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
    ) -> Result<Self, NotifierError> {
        use lettre::transport::smtp::authentication::Credentials;

        let mut builder = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(host)
            .map_err(|e| NotifierError::Email(e.to_string()))?
            .port(port);
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            to,
            from,
            transport: builder.build(),
        })
    }

    #[cfg(not(feature = "smtp"))]
    pub fn new(
        to: Vec<String>,
        from: String,
        _host: &str,
        _port: u16,
        _credentials: Option<(String, String)>,
    ) -> Result<Self, NotifierError> {
        Ok(Self { to, from })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    #[cfg(feature = "smtp")]
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        use lettre::message::Mailbox;
        use lettre::{AsyncTransport, Message};

        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| NotifierError::Email(format!("invalid sender {}: {}", self.from, e)))?;

        for recipient in &self.to {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| NotifierError::Email(format!("invalid recipient {}: {}", recipient, e)))?;
            let email = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_string())
                .map_err(|e| NotifierError::Email(e.to_string()))?;

            self.transport
                .send(email)
                .await
                .map_err(|e| NotifierError::Email(e.to_string()))?;
        }

        tracing::debug!(recipients = ?self.to, "Email notification sent");
        Ok(())
    }

    #[cfg(not(feature = "smtp"))]
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        tracing::info!(
            from = %self.from,
            recipients = ?self.to,
            subject = %subject,
            "Email notification (smtp feature disabled):\n{}",
            body
        );
        Ok(())
    }
}

/// Fans a digest out to every configured channel
#[derive(Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    /// Notifier with no channels
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(channels: &[ChannelConfig]) -> Result<Self, NotifierError> {
        let mut notifier = Self::new();

        for channel in channels {
            notifier = match channel {
                ChannelConfig::Log => notifier.with_channel(Arc::new(LogChannel)),
                ChannelConfig::Chat {
                    webhook_url,
                    headers,
                } => notifier.with_channel(Arc::new(
                    ChatChannel::new(webhook_url.clone()).with_headers(headers.clone()),
                )),
                ChannelConfig::Email {
                    to,
                    from,
                    smtp_host,
                    smtp_port,
                    username,
                    password,
                } => {
                    let credentials = username.clone().zip(password.clone());
                    notifier.with_channel(Arc::new(EmailChannel::new(
                        to.clone(),
                        from.clone(),
                        smtp_host,
                        *smtp_port,
                        credentials,
                    )?))
                }
            };
        }

        Ok(notifier)
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send to every channel, even after one of them fails
    pub async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for channel in &self.channels {
            if let Err(e) = channel.send(subject, body).await {
                tracing::error!(channel = channel.name(), error = %e, "Notification channel failed");
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
