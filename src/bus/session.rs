//! Broker session: one producer and one consumer bound to a topic.
//!
//! ```text
//! start():  [ensure topic] -> open producer -> open consumer
//! stop():   close consumer -> close producer
//! ```
//!
//! The consumer is handed out once, as an [`EventStream`], to the task that
//! drains the topic. That task hands it back with
//! [`BrokerSession::restore_subscription`] when it exits so `stop` can close it.
//! A stream that never comes back is replaced with
//! [`BrokerSession::reset_subscription`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{Broker, BusError, Consumer, Delivery, Producer, Result, TopicAdmin, TopicSpec};
use crate::config::BrokerConfig;
use crate::event::{self, IncomingEvent};

/// Pause after a transport error before polling the consumer again.
const CONSUMER_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Inputs to [`BrokerSession::start`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Topic events are published to and consumed from.
    pub topic: TopicSpec,
    /// Consumer group the subscribe handle joins.
    pub consumer_group: String,
    /// Provision the topic on start.
    pub create_topics: bool,
}

impl SessionConfig {
    pub fn new(topic: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            topic: TopicSpec::single(topic),
            consumer_group: consumer_group.into(),
            create_topics: true,
        }
    }

    pub fn with_create_topics(mut self, create: bool) -> Self {
        self.create_topics = create;
        self
    }

    pub fn with_topic_spec(mut self, topic: TopicSpec) -> Self {
        self.topic = topic;
        self
    }
}

impl From<&BrokerConfig> for SessionConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            topic: TopicSpec {
                name: config.topic.clone(),
                partitions: config.topic_partitions,
                replication_factor: config.replication_factor,
            },
            consumer_group: config.consumer_group.clone(),
            create_topics: config.create_topics,
        }
    }
}

/// Outcome of topic provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    /// The topic was already present; nothing was changed.
    Exists,
    /// The topic was created.
    Created,
    /// Provisioning failed and was skipped. The broker may still auto-create the topic.
    Skipped,
}

/// Publish and subscribe handles for one topic.
pub struct BrokerSession {
    broker: Arc<dyn Broker>,
    config: SessionConfig,
    producer: RwLock<Option<Arc<dyn Producer>>>,
    consumer: Mutex<Option<Box<dyn Consumer>>>,
}

impl BrokerSession {
    pub fn new(broker: Arc<dyn Broker>, config: SessionConfig) -> Self {
        Self {
            broker,
            config,
            producer: RwLock::new(None),
            consumer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn topic(&self) -> &str {
        &self.config.topic.name
    }

    /// Whether `start` has completed and `stop` has not been called since.
    pub async fn is_started(&self) -> bool {
        self.producer.read().await.is_some()
    }

    /// Provision the topic (if enabled) and open both handles.
    ///
    /// Topic provisioning failures are logged and ignored. Failing to open
    /// the producer or the consumer is returned to the caller.
    pub async fn start(&self) -> Result<()> {
        let mut producer_slot = self.producer.write().await;
        if producer_slot.is_some() {
            debug!(topic = %self.topic(), "Broker session already started");
            return Ok(());
        }

        if self.config.create_topics {
            self.ensure_topic().await;
        }

        let producer = self.broker.producer().await?;

        let consumer = match self
            .broker
            .consumer(self.topic(), &self.config.consumer_group)
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                producer.close().await;
                return Err(e);
            }
        };

        *producer_slot = Some(producer);
        *self.consumer.lock().await = Some(consumer);

        info!(
            topic = %self.topic(),
            consumer_group = %self.config.consumer_group,
            "Broker session started"
        );
        Ok(())
    }

    /// Close the consumer, then the producer. Safe to call when not started.
    pub async fn stop(&self) {
        if let Some(mut consumer) = self.consumer.lock().await.take() {
            consumer.close().await;
            debug!(topic = %self.topic(), "Consumer closed");
        }

        if let Some(producer) = self.producer.write().await.take() {
            producer.close().await;
            debug!(topic = %self.topic(), "Producer closed");
        }

        info!(topic = %self.topic(), "Broker session stopped");
    }

    /// Make sure the topic exists. Never fails; see [`Provisioning`].
    ///
    /// The administrative connection is closed on every path.
    pub async fn ensure_topic(&self) -> Provisioning {
        let spec = &self.config.topic;
        if spec.partitions > 1 {
            warn!(
                topic = %spec.name,
                partitions = spec.partitions,
                "Multi-partition topic: ordering is only guaranteed within a partition"
            );
        }

        let admin = match self.broker.admin().await {
            Ok(admin) => admin,
            Err(e) => {
                error!(topic = %spec.name, error = %e, "Could not create topic (continuing)");
                return Provisioning::Skipped;
            }
        };

        let outcome = Self::provision(admin.as_ref(), spec).await;
        admin.close().await;

        match outcome {
            Ok(Provisioning::Created) => {
                info!(
                    topic = %spec.name,
                    partitions = spec.partitions,
                    replication_factor = spec.replication_factor,
                    "Created topic"
                );
                Provisioning::Created
            }
            Ok(other) => {
                debug!(topic = %spec.name, "Topic already exists");
                other
            }
            Err(e) => {
                error!(topic = %spec.name, error = %e, "Could not create topic (continuing)");
                Provisioning::Skipped
            }
        }
    }

    async fn provision(admin: &dyn TopicAdmin, spec: &TopicSpec) -> Result<Provisioning> {
        let topics = admin.list_topics().await?;
        if topics.iter().any(|t| t == &spec.name) {
            return Ok(Provisioning::Exists);
        }
        admin.create_topic(spec).await?;
        Ok(Provisioning::Created)
    }

    /// Encode and publish an event, waiting for broker acknowledgment.
    ///
    /// Messages are keyed by event type.
    pub async fn publish(&self, event: &IncomingEvent) -> Result<Delivery> {
        let producer = self
            .producer
            .read()
            .await
            .clone()
            .ok_or(BusError::NotStarted)?;

        let payload = event::encode(event)?;
        let delivery = producer
            .send(self.topic(), Some(&event.event_type), &payload)
            .await?;

        debug!(
            topic = %self.topic(),
            event_type = %event.event_type,
            partition = delivery.partition,
            offset = delivery.offset,
            "Published event"
        );
        Ok(delivery)
    }

    /// Hand out the subscribe handle as a stream of decoded events.
    ///
    /// Only one stream exists at a time; it is returned with
    /// [`restore_subscription`](Self::restore_subscription).
    pub async fn subscribe_stream(&self) -> Result<EventStream> {
        if !self.is_started().await {
            return Err(BusError::NotStarted);
        }
        let consumer = self
            .consumer
            .lock()
            .await
            .take()
            .ok_or(BusError::SubscriptionTaken)?;

        Ok(EventStream {
            consumer,
            topic: self.topic().to_string(),
        })
    }

    /// Return a stream's consumer to the session so `stop` closes it.
    ///
    /// If the session was stopped in the meantime the consumer is closed here.
    pub async fn restore_subscription(&self, stream: EventStream) {
        let mut consumer = stream.into_consumer();
        if !self.is_started().await {
            consumer.close().await;
            return;
        }
        *self.consumer.lock().await = Some(consumer);
    }

    /// Replace the subscribe handle with a freshly opened consumer.
    ///
    /// Used when a stream was lost instead of restored, for example when the
    /// task holding it was aborted. Any consumer still held is closed first.
    /// The new consumer resumes from the group's committed offset.
    /// No-op when the session is not started.
    pub async fn reset_subscription(&self) -> Result<()> {
        if !self.is_started().await {
            return Ok(());
        }

        let mut slot = self.consumer.lock().await;
        if let Some(mut stale) = slot.take() {
            stale.close().await;
        }

        let consumer = self
            .broker
            .consumer(self.topic(), &self.config.consumer_group)
            .await?;
        *slot = Some(consumer);

        info!(
            topic = %self.topic(),
            consumer_group = %self.config.consumer_group,
            "Subscription reopened"
        );
        Ok(())
    }
}

/// Endless sequence of decoded events from a topic.
///
/// Messages that fail to decode are logged and skipped. Transport errors are
/// logged and polling resumes after a short pause.
pub struct EventStream {
    consumer: Box<dyn Consumer>,
    topic: String,
}

impl EventStream {
    /// Wrap a consumer directly, bypassing a session.
    pub fn new(consumer: Box<dyn Consumer>, topic: impl Into<String>) -> Self {
        Self {
            consumer,
            topic: topic.into(),
        }
    }

    /// Wait for the next well-formed event.
    ///
    /// Cancel-safe. Returns `None` only once the consumer has been closed.
    pub async fn next(&mut self) -> Option<IncomingEvent> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => match event::decode(&message.payload) {
                    Ok(event) => {
                        debug!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            event_type = %event.event_type,
                            "Received event"
                        );
                        return Some(event);
                    }
                    Err(e) => {
                        warn!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Failed to decode message, skipping"
                        );
                    }
                },
                Err(BusError::Closed) => {
                    info!(topic = %self.topic, "Consumer closed, event stream ended");
                    return None;
                }
                Err(e) => {
                    error!(topic = %self.topic, error = %e, "Consumer error");
                    tokio::time::sleep(CONSUMER_ERROR_BACKOFF).await;
                }
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn into_consumer(self) -> Box<dyn Consumer> {
        self.consumer
    }
}

#[cfg(all(test, feature = "channel"))]
mod tests;
