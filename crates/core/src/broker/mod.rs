//! Broker client: a thin wrapper over `rdkafka` providing the producer used
//! by the Message Writer (C6) and Outbox Dispatcher (C8), and the consumer
//! construction used by the Delivery (C9) and Indexer (C10) consumers.
//!
//! Ordering guarantee: producers key every publish by `conversation_id`,
//! giving per-conversation ordering within a partition; no ordering is
//! promised across conversations or across consumer-group replicas.

use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct Producer {
    inner: FutureProducer,
    topic_prefix: String,
}

impl Producer {
    /// # Errors
    /// Returns [`AppError::Internal`] if the producer cannot be constructed.
    pub fn new(brokers: &str, topic_prefix: &str) -> AppResult<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| AppError::Internal(format!("kafka producer init failed: {e}")))?;
        Ok(Self {
            inner,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    fn topic(&self, name: &str) -> String {
        if self.topic_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{name}", self.topic_prefix)
        }
    }

    /// Publish `payload` on `topic`, keyed by `key`, with the given
    /// per-message timeout.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the broker rejects or times out
    /// the publish.
    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> AppResult<()> {
        let full_topic = self.topic(topic);
        let record = FutureRecord::to(&full_topic).key(key).payload(payload);
        self.inner
            .send(record, timeout)
            .await
            .map_err(|(err, _)| AppError::Internal(format!("kafka publish failed: {err}")))?;
        Ok(())
    }
}

/// Build a `StreamConsumer` subscribed to `topics` under `group_id`.
///
/// # Errors
/// Returns [`AppError::Internal`] if the consumer cannot be constructed or
/// subscribed.
pub fn consumer(brokers: &str, group_id: &str, topics: &[&str]) -> AppResult<StreamConsumer> {
    use rdkafka::consumer::Consumer;

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| AppError::Internal(format!("kafka consumer init failed: {e}")))?;
    consumer
        .subscribe(topics)
        .map_err(|e| AppError::Internal(format!("kafka subscribe failed: {e}")))?;
    Ok(consumer)
}
