use super::{format_subject, Broker, BrokerError, Message, MessageStream, Publisher, Subscriber};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A message accepted by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub message: Message,
    pub published_at: DateTime<Utc>,
}

/// In-process broker. Keeps a log of everything published and fans messages
/// out to live subscribers. Availability can be switched off to simulate a
/// transport outage.
pub struct MemoryBroker {
    prefix: String,
    published: Mutex<Vec<PublishedMessage>>,
    available: AtomicBool,
    tx: broadcast::Sender<PublishedMessage>,
}

impl MemoryBroker {
    pub const NAME: &'static str = "memory";

    pub fn new(prefix: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            prefix: prefix.into(),
            published: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            tx,
        }
    }

    /// While unavailable, publish and subscribe fail with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        match self.published.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new("esr")
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        self.ensure_available()?;

        let record = PublishedMessage {
            topic: topic.to_string(),
            message,
            published_at: Utc::now(),
        };

        debug!(key = %record.message.key, topic = %topic, "Published message in memory");

        self.published
            .lock()
            .map_err(|_| BrokerError::Rejected("message log poisoned".to_string()))?
            .push(record.clone());

        // No receivers is fine
        let _ = self.tx.send(record);
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError> {
        self.ensure_available()?;

        let topic = topic.to_string();
        let rx = self.tx.subscribe();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(record) => return Some((record, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Memory subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter_map(move |record| {
            let matched = (record.topic == topic).then_some(record.message);
            async move { matched }
        });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn publisher(&self) -> &dyn Publisher {
        self
    }

    fn subscriber(&self) -> &dyn Subscriber {
        self
    }

    fn format(&self, topic: &str) -> String {
        format_subject(&self.prefix, topic)
    }

    async fn close(&self) {
        self.set_available(false);
    }
}
