use super::{format_subject, Broker, BrokerError, Message, MessageStream, Publisher, Subscriber};
use anyhow::{Context, Result};
use async_nats::connection::State;
use async_nats::jetstream::{self, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// JetStream deduplication header.
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// Carries the message key for consumers that do not read JetStream headers.
const KEY_HEADER: &str = "Esr-Message-Key";

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    /// Prepended to every wire subject
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i64,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_stream_name() -> String {
    "ESR_COMMANDS".to_string()
}

fn default_subject_prefix() -> String {
    "esr".to_string()
}

fn default_max_age_days() -> i64 {
    7
}

fn default_max_bytes() -> i64 {
    1024 * 1024 * 1024 // 1GB
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            stream_name: default_stream_name(),
            subject_prefix: default_subject_prefix(),
            max_age_days: default_max_age_days(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// NATS broker. Publishes through JetStream (acknowledged), subscribes
/// through core NATS.
pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsBroker {
    pub const NAME: &'static str = "nats";

    /// Connect to NATS and initialize JetStream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        let broker = Self {
            client,
            jetstream,
            config,
        };

        broker.ensure_stream().await?;

        Ok(broker)
    }

    /// Ensure the JetStream stream capturing `{prefix}.>` exists
    async fn ensure_stream(&self) -> Result<()> {
        match self.jetstream.get_stream(&self.config.stream_name).await {
            Ok(_existing_stream) => {
                info!("Stream '{}' already exists", self.config.stream_name);
                return Ok(());
            }
            Err(_) => {
                info!("Stream '{}' does not exist, creating...", self.config.stream_name);
            }
        }

        let stream_config = stream::Config {
            name: self.config.stream_name.clone(),
            subjects: vec![format!("{}.>", self.config.subject_prefix)],
            max_age: std::time::Duration::from_secs((self.config.max_age_days * 86400) as u64),
            max_bytes: self.config.max_bytes,
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .context("Failed to create JetStream stream")?;

        info!("Created JetStream stream '{}'", self.config.stream_name);
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        match self.client.connection_state() {
            State::Connected => Ok(()),
            other => Err(BrokerError::Unavailable(format!("connection state {:?}", other))),
        }
    }
}

/// Key of an inbound message: the key header, else the dedup ID.
fn message_key(headers: Option<&HeaderMap>) -> Option<String> {
    let headers = headers?;
    [KEY_HEADER, MSG_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .map(|value| value.as_str())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Publisher for NatsBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let mut headers = HeaderMap::new();
        headers.insert(MSG_ID_HEADER, message.key.as_str());
        headers.insert(KEY_HEADER, message.key.as_str());

        debug!(
            key = %message.key,
            subject = %topic,
            bytes = message.payload.len(),
            "Publishing message to NATS"
        );

        self.jetstream
            .publish_with_headers(topic.to_string(), headers, message.payload.into())
            .await
            .map_err(|e| BrokerError::Rejected(format!("publish to '{}': {}", topic, e)))?
            .await
            .map_err(|e| BrokerError::Rejected(format!("ack from '{}': {}", topic, e)))?;

        Ok(())
    }
}

#[async_trait]
impl Subscriber for NatsBroker {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError> {
        self.ensure_connected()?;

        let subscription = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| BrokerError::SubscribeFailed(e.to_string()))?;

        info!(subject = %topic, "Subscribed to NATS subject");

        let stream = subscription.map(|msg| {
            let key = message_key(msg.headers.as_ref()).unwrap_or_else(|| {
                warn!(subject = %msg.subject, "Received message without a key header");
                String::new()
            });
            Message::new(key, msg.payload.to_vec())
        });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl Broker for NatsBroker {
    fn publisher(&self) -> &dyn Publisher {
        self
    }

    fn subscriber(&self) -> &dyn Subscriber {
        self
    }

    fn format(&self, topic: &str) -> String {
        format_subject(&self.config.subject_prefix, topic)
    }

    async fn close(&self) {
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection on close");
        }
        info!("NATS broker closed");
    }
}
