//! Notification module.
//!
//! Renders a check result into a markdown and a plain-text message and
//! sends them to the configured channels: the markdown version to the
//! webhook, the plain version to every pub/sub topic. Channels are tried
//! in order and the first failure aborts the rest.

mod template;
mod topic;
mod webhook;

pub use template::*;
pub use topic::*;
pub use webhook::*;

use std::sync::Arc;
use thiserror::Error;

use crate::db::CheckResult;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to send notification to webhook: {0}")]
    Webhook(String),
    #[error("failed to connect to pub/sub server {0}")]
    Connect(String),
    #[error("failed to publish message to topic {topic:?}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("topics configured without a publisher")]
    NoPublisher,
    #[error("notification template error: {0}")]
    Template(#[from] TemplateError),
}

/// Sends change notifications for one monitored service.
pub struct Notifier {
    markdown: MessageTemplate,
    plain: MessageTemplate,
    webhook: Option<WebhookNotifier>,
    publisher: Option<Arc<dyn TopicPublisher>>,
    topics: Vec<String>,
}

impl Notifier {
    /// Create a notifier using the built-in markdown and plain templates.
    pub fn with_default_templates() -> Result<Self, TemplateError> {
        Ok(Self::new(
            MessageTemplate::parse(DEFAULT_MARKDOWN_TEMPLATE)?,
            MessageTemplate::parse(DEFAULT_PLAIN_TEMPLATE)?,
        ))
    }

    /// Create a notifier with no channels.
    pub fn new(markdown: MessageTemplate, plain: MessageTemplate) -> Self {
        Self {
            markdown,
            plain,
            webhook: None,
            publisher: None,
            topics: Vec::new(),
        }
    }

    pub fn with_markdown_template(mut self, template: MessageTemplate) -> Self {
        self.markdown = template;
        self
    }

    pub fn with_plain_template(mut self, template: MessageTemplate) -> Self {
        self.plain = template;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn with_topics(mut self, publisher: Arc<dyn TopicPublisher>, topics: Vec<String>) -> Self {
        self.publisher = Some(publisher);
        self.topics = topics;
        self
    }

    /// Whether any channel is configured at all.
    pub fn has_channels(&self) -> bool {
        self.webhook.is_some() || !self.topics.is_empty()
    }

    /// Render both templates against the zero value so field errors that
    /// only show up at render time are caught before the first alert.
    pub fn check_templates(&self) -> Result<(), TemplateError> {
        let blank = CheckResult::default();
        self.markdown.render(&blank)?;
        self.plain.render(&blank)?;
        Ok(())
    }

    /// Render `result` and send it to every configured channel.
    pub async fn notify(&self, result: &CheckResult) -> Result<(), NotifyError> {
        let markdown = self.markdown.render(result)?;
        let plain = self.plain.render(result)?;

        if let Some(webhook) = &self.webhook {
            webhook.send(&markdown).await?;
            tracing::debug!("Notification sent to webhook {}", webhook.url());
        }

        if self.topics.is_empty() {
            return Ok(());
        }
        let publisher = self.publisher.as_ref().ok_or(NotifyError::NoPublisher)?;
        for topic in &self.topics {
            publisher.publish(topic, &plain).await?;
            tracing::debug!("Notification published to topic {}", topic);
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records published messages; fails for topics listed in `failing`.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub published: Mutex<Vec<(String, String)>>,
        pub failing: Vec<String>,
    }

    #[async_trait::async_trait]
    impl TopicPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError> {
            if self.failing.iter().any(|t| t == topic) {
                return Err(NotifyError::Publish {
                    topic: topic.to_string(),
                    reason: "no responders".to_string(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.to_string()));
            Ok(())
        }
    }
}
