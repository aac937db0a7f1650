//! NATS publisher for request replies

use crate::types::response::{Reply, ReplyEnvelope};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes replies to the requester's reply subject
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    /// Create a new reply publisher
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a reply tagged with the request id
    pub async fn publish(&self, reply_to: Subject, reply: Reply, request_id: &str) -> Result<()> {
        let status = reply.status;
        let payload = encode(reply, request_id)?;

        self.client.publish(reply_to.clone(), payload.into()).await?;

        debug!(
            request_id = %request_id,
            reply_to = %reply_to,
            status = ?status,
            "Published reply"
        );

        Ok(())
    }
}

/// Serialize the wire envelope for a reply
pub fn encode(reply: Reply, request_id: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&ReplyEnvelope::new(reply, request_id))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_encode_health_reply() {
        let bytes = encode(Reply::health(), "abc").unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"status": "OK", "code": 200, "request_id": "abc", "body": {"status": "ok"}})
        );
    }
}
