//! Message broker access.
//!
//! This module contains:
//! - `Broker` trait: factory for admin, producer and consumer handles
//! - `TopicAdmin`, `Producer`, `Consumer` traits: the handles themselves
//! - `BrokerSession`: lifecycle owner of one producer and one consumer on a topic
//! - Implementations: in-process channel broker, Kafka

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{BrokerConfig, BrokerType};
use crate::event::DecodeError;

// Implementation modules
#[cfg(feature = "channel")]
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
mod session;

// Re-exports
#[cfg(feature = "channel")]
pub use channel::{ChannelBroker, ChannelConfig};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaBrokerConfig};
pub use session::{BrokerSession, EventStream, Provisioning, SessionConfig};

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Broker session not started")]
    NotStarted,

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Topic administration failed: {0}")]
    Admin(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] DecodeError),

    #[error("Subscription already handed out")]
    SubscriptionTaken,

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Consumer closed")]
    Closed,
}

// ============================================================================
// Types
// ============================================================================

/// Topic provisioning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: u32,
    pub replication_factor: u32,
}

impl TopicSpec {
    /// Single partition, single replica. Safe for a one-node development broker.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
        }
    }
}

/// Broker acknowledgment for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// A message as read from the broker, before decoding.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

// ============================================================================
// Traits
// ============================================================================

/// Administrative connection used for topic provisioning.
///
/// Callers must call `close` when done, whatever the outcome.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Names of all topics known to the broker.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Create a topic. Creating a topic that already exists is not an error.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;

    /// Release the connection.
    async fn close(&self);
}

/// Publish handle. Safe to share between concurrent publishers.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Send one message and wait for the broker to acknowledge it.
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<Delivery>;

    /// Flush pending sends and release the handle.
    async fn close(&self);
}

/// Subscribe handle bound to one topic and consumer group.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next message.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose or duplicate a message. Returns `BusError::Closed` once closed.
    async fn recv(&mut self) -> Result<RawMessage>;

    /// Leave the consumer group and release the handle.
    async fn close(&mut self);
}

/// Factory for broker handles.
///
/// Implementations:
/// - `ChannelBroker`: in-process topics, no external dependencies
/// - `KafkaBroker`: Apache Kafka via librdkafka
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open an administrative connection.
    async fn admin(&self) -> Result<Box<dyn TopicAdmin>>;

    /// Open a publish handle.
    async fn producer(&self) -> Result<Arc<dyn Producer>>;

    /// Open a subscribe handle for `topic` in consumer group `group`.
    async fn consumer(&self, topic: &str, group: &str) -> Result<Box<dyn Consumer>>;
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize a broker backend based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: `--features channel` (included in default)
/// - Kafka: `--features kafka`
pub fn init_broker(
    config: &BrokerConfig,
) -> std::result::Result<Arc<dyn Broker>, Box<dyn std::error::Error + Send + Sync>> {
    match config.broker_type {
        BrokerType::Channel => {
            #[cfg(feature = "channel")]
            {
                info!(broker_type = "channel", "Broker initialized");
                Ok(Arc::new(ChannelBroker::new(ChannelConfig::default())))
            }

            #[cfg(not(feature = "channel"))]
            {
                Err("Channel broker requires the 'channel' feature. Rebuild with --features channel".into())
            }
        }
        BrokerType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka_config = KafkaBrokerConfig::new(&config.bootstrap_servers)
                    .with_security(config.security.clone());

                info!(
                    broker_type = "kafka",
                    bootstrap_servers = %config.bootstrap_servers,
                    "Broker initialized"
                );
                Ok(Arc::new(KafkaBroker::new(kafka_config)))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
