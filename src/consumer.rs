//! NATS subscriber for incoming prediction and health requests

use crate::config::NatsConfig;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::info;

/// Which boundary operation a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Predict,
    Health,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Predict => "predict",
            RequestKind::Health => "health",
        }
    }
}

/// Incoming request message tagged with its kind
pub struct IncomingRequest {
    pub kind: RequestKind,
    pub message: Message,
}

/// Consumer for receiving requests from NATS
pub struct RequestConsumer {
    client: Client,
    predict_subject: String,
    health_subject: String,
    queue_group: Option<String>,
}

impl RequestConsumer {
    /// Create a new request consumer
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            predict_subject: config.predict_subject.clone(),
            health_subject: config.health_subject.clone(),
            queue_group: config.queue_group.clone(),
        }
    }

    /// Subscribe to both subjects and merge them into one stream
    pub async fn subscribe(&self) -> Result<BoxStream<'static, IncomingRequest>> {
        let predict = self.subscribe_subject(&self.predict_subject).await?;
        let health = self.subscribe_subject(&self.health_subject).await?;

        let predict = predict.map(|message| IncomingRequest {
            kind: RequestKind::Predict,
            message,
        });
        let health = health.map(|message| IncomingRequest {
            kind: RequestKind::Health,
            message,
        });

        Ok(stream::select(predict, health).boxed())
    }

    async fn subscribe_subject(&self, subject: &str) -> Result<Subscriber> {
        let subscriber = match &self.queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(subject.to_string(), group.clone())
                    .await?
            }
            None => self.client.subscribe(subject.to_string()).await?,
        };
        info!(subject = %subject, queue_group = ?self.queue_group, "Subscribed to request subject");
        Ok(subscriber)
    }

    /// Get the prediction subject name
    pub fn predict_subject(&self) -> &str {
        &self.predict_subject
    }

    /// Get the health subject name
    pub fn health_subject(&self) -> &str {
        &self.health_subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_names() {
        assert_eq!(RequestKind::Predict.as_str(), "predict");
        assert_eq!(RequestKind::Health.as_str(), "health");
    }
}
