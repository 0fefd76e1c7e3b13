//! Pub/sub channel.

use bytes::Bytes;

use super::NotifyError;

/// Publishes a message to a named topic on a messaging system.
#[async_trait::async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError>;
}

/// A NATS publisher; topics are NATS subjects.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub async fn connect(server: &str) -> Result<Self, NotifyError> {
        let client = async_nats::connect(server)
            .await
            .map_err(|e| NotifyError::Connect(format!("{}: {}", server, e)))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl TopicPublisher for NatsPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError> {
        let publish_err = |e: String| NotifyError::Publish {
            topic: topic.to_string(),
            reason: e,
        };

        self.client
            .publish(topic.to_string(), Bytes::copy_from_slice(message.as_bytes()))
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        // Surface delivery problems now rather than on a later publish
        self.client
            .flush()
            .await
            .map_err(|e| publish_err(e.to_string()))?;

        Ok(())
    }
}
