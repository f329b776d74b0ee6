//! Kafka broker implementation.
//!
//! - Admin: `AdminClient` metadata listing and topic creation
//! - Producer: `FutureProducer` with `acks=all`, one acknowledgment per send
//! - Consumer: `StreamConsumer` in a consumer group, earliest offset, auto-commit

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::ClientConfig;
use tracing::{debug, info, warn};

use super::{
    Broker, BusError, Consumer, Delivery, Producer, RawMessage, Result, TopicAdmin, TopicSpec,
};
use crate::config::SecurityConfig;

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaBrokerConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// How long a send may wait for acknowledgment.
    pub send_timeout: Duration,
    /// Timeout for metadata requests and topic creation.
    pub admin_timeout: Duration,
    pub security: SecurityConfig,
}

impl KafkaBrokerConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            send_timeout: Duration::from_secs(5),
            admin_timeout: Duration::from_secs(10),
            security: SecurityConfig::default(),
        }
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_admin_timeout(mut self, timeout: Duration) -> Self {
        self.admin_timeout = timeout;
        self
    }

    /// Settings shared by every client: bootstrap servers and security.
    fn base_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        for (key, value) in self.security.client_properties() {
            config.set(key, value);
        }
        config
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = self.base_config();
        config
            .set("message.timeout.ms", self.send_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true");
        config
    }

    fn build_consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = self.base_config();
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest");
        config
    }
}

/// Kafka broker.
///
/// Each call opens a fresh librdkafka client; the session keeps the producer
/// and consumer for its lifetime.
pub struct KafkaBroker {
    config: KafkaBrokerConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaBrokerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KafkaBrokerConfig {
        &self.config
    }
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> BusError {
    BusError::BrokerUnavailable(format!("{}: {}", what, e))
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn admin(&self) -> Result<Box<dyn TopicAdmin>> {
        let client: AdminClient<DefaultClientContext> = self
            .config
            .base_config()
            .create()
            .map_err(|e| unavailable("Failed to create Kafka admin client", e))?;

        Ok(Box::new(KafkaAdmin {
            client: Arc::new(client),
            timeout: self.config.admin_timeout,
        }))
    }

    async fn producer(&self) -> Result<Arc<dyn Producer>> {
        let producer: FutureProducer = self
            .config
            .build_producer_config()
            .create()
            .map_err(|e| unavailable("Failed to create Kafka producer", e))?;

        // librdkafka connects lazily; fetch metadata so an unreachable cluster fails here.
        let client = producer.clone();
        let timeout = self.config.admin_timeout;
        tokio::task::spawn_blocking(move || client.client().fetch_metadata(None, timeout))
            .await
            .map_err(|e| unavailable("Metadata task failed", e))?
            .map_err(|e| unavailable("Kafka broker unreachable", e))?;

        info!(
            bootstrap_servers = %self.config.bootstrap_servers,
            "Connected Kafka producer"
        );

        Ok(Arc::new(KafkaProducer {
            producer,
            send_timeout: self.config.send_timeout,
        }))
    }

    async fn consumer(&self, topic: &str, group: &str) -> Result<Box<dyn Consumer>> {
        let consumer: StreamConsumer = self
            .config
            .build_consumer_config(group)
            .create()
            .map_err(|e| unavailable("Failed to create Kafka consumer", e))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| unavailable("Failed to subscribe to topic", e))?;

        info!(topic = %topic, group = %group, "Subscribed to Kafka topic");

        Ok(Box::new(KafkaConsumer {
            consumer,
            closed: false,
        }))
    }
}

struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn list_topics(&self) -> Result<Vec<String>> {
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;

        // fetch_metadata blocks the calling thread.
        let metadata = tokio::task::spawn_blocking(move || {
            client.inner().fetch_metadata(None, timeout)
        })
        .await
        .map_err(|e| unavailable("Metadata task failed", e))?
        .map_err(|e| unavailable("Failed to list topics", e))?;

        Ok(metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions as i32,
            TopicReplication::Fixed(spec.replication_factor as i32),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self
            .client
            .create_topics([&topic], &options)
            .await
            .map_err(|e| unavailable("Failed to create topic", e))?;

        for result in results {
            match result {
                Ok(name) => debug!(topic = %name, "Topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Topic created concurrently")
                }
                Err((name, code)) => {
                    return Err(BusError::Admin(format!(
                        "Failed to create topic '{}': {}",
                        name, code
                    )))
                }
            }
        }

        Ok(())
    }

    async fn close(&self) {
        // The client shuts down when the last reference drops.
        debug!("Kafka admin client released");
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<Delivery> {
        let mut record = FutureRecord::to(topic).payload(payload);

        if let Some(k) = key {
            record = record.key(k);
        }

        let (partition, offset) = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| unavailable("Failed to publish", e))?;

        Ok(Delivery { partition, offset })
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        match tokio::task::spawn_blocking(move || producer.flush(timeout)).await {
            Ok(Ok(())) => debug!("Kafka producer flushed"),
            Ok(Err(e)) => warn!(error = %e, "Failed to flush Kafka producer"),
            Err(e) => warn!(error = %e, "Kafka producer flush task failed"),
        }
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    closed: bool,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn recv(&mut self) -> Result<RawMessage> {
        if self.closed {
            return Err(BusError::Closed);
        }

        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        Ok(RawMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(|k| k.to_vec()),
            payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.consumer.unsubscribe();
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests;
