// Publish/subscribe transport used for outbound command notifications

mod memory;
mod nats;

pub use memory::{MemoryBroker, PublishedMessage};
pub use nats::{NatsBroker, NatsConfig};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Keyed message exchanged with the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message key; command IDs for outbound commands.
    pub key: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

pub type MessageStream = BoxStream<'static, Message>;

/// Broker errors
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// The transport connection is down or closed.
    Unavailable(String),
    /// The broker refused or failed to acknowledge the message.
    Rejected(String),
    SubscribeFailed(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Unavailable(detail) => write!(f, "broker unavailable: {}", detail),
            BrokerError::Rejected(detail) => write!(f, "message rejected: {}", detail),
            BrokerError::SubscribeFailed(detail) => write!(f, "subscribe failed: {}", detail),
        }
    }
}

impl std::error::Error for BrokerError {}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one message to a wire topic. No retries.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Streams messages published to a wire topic from now on.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError>;
}

/// Publish/subscribe transport.
///
/// Topics handed to `publish`/`subscribe` are wire topics, produced by
/// [`Broker::format`] from logical topics such as `entities/e1/update`.
#[async_trait]
pub trait Broker: Send + Sync {
    fn publisher(&self) -> &dyn Publisher;

    fn subscriber(&self) -> &dyn Subscriber;

    /// Maps a logical topic to the transport's naming scheme. No I/O.
    fn format(&self, topic: &str) -> String;

    async fn close(&self);
}

/// Joins a prefix and a slash-separated logical topic into a dotted subject:
/// `("esr", "entities/e1/update")` → `esr.entities.e1.update`.
pub fn format_subject(prefix: &str, topic: &str) -> String {
    let topic = topic.trim_matches('/').replace('/', ".");
    if prefix.is_empty() {
        topic
    } else {
        format!("{}.{}", prefix, topic)
    }
}

/// Broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_type")]
    pub broker_type: String,
    #[serde(default)]
    pub nats: NatsConfig,
}

fn default_broker_type() -> String {
    NatsBroker::NAME.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broker_type: default_broker_type(),
            nats: NatsConfig::default(),
        }
    }
}

/// Connects the broker selected by `config.broker_type`.
pub async fn connect_broker(config: &BrokerConfig) -> anyhow::Result<Arc<dyn Broker>> {
    match config.broker_type.as_str() {
        NatsBroker::NAME => Ok(Arc::new(NatsBroker::connect(config.nats.clone()).await?)),
        MemoryBroker::NAME => Ok(Arc::new(MemoryBroker::new(
            config.nats.subject_prefix.clone(),
        ))),
        other => anyhow::bail!("unknown broker type: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_subject() {
        assert_eq!(
            format_subject("esr", "entities/e1/update"),
            "esr.entities.e1.update"
        );
        assert_eq!(format_subject("", "entities/e1/update"), "entities.e1.update");
        assert_eq!(format_subject("esr", "/entities/e1/"), "esr.entities.e1");
    }

    #[tokio::test]
    async fn test_connect_memory_broker() {
        let config = BrokerConfig {
            broker_type: "memory".to_string(),
            nats: NatsConfig::default(),
        };
        let broker = connect_broker(&config).await.unwrap();
        assert_eq!(broker.format("entities/e1/update"), "esr.entities.e1.update");
    }

    #[tokio::test]
    async fn test_connect_unknown_broker() {
        let config = BrokerConfig {
            broker_type: "rabbitmq".to_string(),
            nats: NatsConfig::default(),
        };
        let err = connect_broker(&config).await.err().expect("should fail");
        assert!(err.to_string().contains("rabbitmq"));
    }
}
