//! In-process channel broker for standalone mode.
//!
//! Topics are append-only logs held in memory. Each consumer group keeps a
//! committed offset per topic, so a consumer re-opened in the same group
//! resumes after the last delivered message and a new group starts from the
//! earliest one. Ideal for local development and testing without external
//! dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{
    Broker, BusError, Consumer, Delivery, Producer, RawMessage, Result, TopicAdmin, TopicSpec,
};

/// Configuration for the channel broker.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Publishing to a missing topic creates it with a single partition.
    pub auto_create_topics: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            auto_create_topics: true,
        }
    }
}

struct Message {
    key: Option<Vec<u8>>,
    payload: Arc<[u8]>,
}

struct Topic {
    partitions: u32,
    log: Vec<Message>,
    /// Consumer group -> next offset to deliver.
    committed: HashMap<String, usize>,
}

impl Topic {
    fn new(partitions: u32) -> Self {
        Self {
            partitions,
            log: Vec::new(),
            committed: HashMap::new(),
        }
    }
}

struct Inner {
    config: ChannelConfig,
    topics: Mutex<HashMap<String, Topic>>,
    appended: Notify,
    unavailable: AtomicBool,
    admin_failure: AtomicBool,
    open_admins: AtomicUsize,
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::BrokerUnavailable(
                "channel broker marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Topic>> {
        // Poisoning only happens if a holder panicked; the map itself stays consistent.
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory broker shared by every handle it creates.
///
/// Cloning yields another handle onto the same topics.
#[derive(Clone)]
pub struct ChannelBroker {
    inner: Arc<Inner>,
}

impl ChannelBroker {
    pub fn new(config: ChannelConfig) -> Self {
        info!(
            auto_create_topics = config.auto_create_topics,
            "Channel broker initialized"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                topics: Mutex::new(HashMap::new()),
                appended: Notify::new(),
                unavailable: AtomicBool::new(false),
                admin_failure: AtomicBool::new(false),
                open_admins: AtomicUsize::new(0),
            }),
        }
    }

    /// Make every connection and send fail with `BrokerUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make topic listing and creation fail after the admin connection opens.
    pub fn set_admin_failure(&self, fail: bool) {
        self.inner.admin_failure.store(fail, Ordering::SeqCst);
    }

    /// Number of admin connections opened and not yet closed.
    pub fn open_admin_connections(&self) -> usize {
        self.inner.open_admins.load(Ordering::SeqCst)
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn partitions(&self, topic: &str) -> Option<u32> {
        self.inner.topics().get(topic).map(|t| t.partitions)
    }

    /// Number of messages appended to a topic.
    pub fn message_count(&self, topic: &str) -> usize {
        self.inner.topics().get(topic).map_or(0, |t| t.log.len())
    }
}

impl Default for ChannelBroker {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl Broker for ChannelBroker {
    async fn admin(&self) -> Result<Box<dyn TopicAdmin>> {
        self.inner.check_available()?;
        self.inner.open_admins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChannelAdmin {
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    async fn producer(&self) -> Result<Arc<dyn Producer>> {
        self.inner.check_available()?;
        Ok(Arc::new(ChannelProducer {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn consumer(&self, topic: &str, group: &str) -> Result<Box<dyn Consumer>> {
        self.inner.check_available()?;
        debug!(topic = %topic, group = %group, "Channel consumer opened");
        Ok(Box::new(ChannelConsumer {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            group: group.to_string(),
            closed: false,
        }))
    }
}

struct ChannelAdmin {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl ChannelAdmin {
    fn check(&self) -> Result<()> {
        self.inner.check_available()?;
        if self.inner.admin_failure.load(Ordering::SeqCst) {
            return Err(BusError::Admin("injected admin failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicAdmin for ChannelAdmin {
    async fn list_topics(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.inner.topics().keys().cloned().collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        self.check()?;
        if spec.partitions == 0 {
            return Err(BusError::Admin(format!(
                "topic '{}' needs at least one partition",
                spec.name
            )));
        }
        self.inner
            .topics()
            .entry(spec.name.clone())
            .or_insert_with(|| Topic::new(spec.partitions));
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.open_admins.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct ChannelProducer {
    inner: Arc<Inner>,
}

#[async_trait]
impl Producer for ChannelProducer {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<Delivery> {
        self.inner.check_available()?;

        let offset = {
            let mut topics = self.inner.topics();
            if !topics.contains_key(topic) && self.inner.config.auto_create_topics {
                debug!(topic = %topic, "Auto-creating topic on publish");
                topics.insert(topic.to_string(), Topic::new(1));
            }
            let Some(entry) = topics.get_mut(topic) else {
                return Err(BusError::BrokerUnavailable(format!(
                    "unknown topic '{}'",
                    topic
                )));
            };
            entry.log.push(Message {
                key: key.map(|k| k.as_bytes().to_vec()),
                payload: Arc::from(payload),
            });
            entry.log.len() - 1
        };

        self.inner.appended.notify_waiters();

        Ok(Delivery {
            partition: 0,
            offset: offset as i64,
        })
    }

    async fn close(&self) {}
}

struct ChannelConsumer {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    closed: bool,
}

impl ChannelConsumer {
    /// Take the next message for this group, committing it.
    fn poll(&self) -> Option<RawMessage> {
        let mut topics = self.inner.topics();
        let topic = topics.get_mut(&self.topic)?;
        let next = topic.committed.get(&self.group).copied().unwrap_or(0);
        let message = topic.log.get(next)?;
        let raw = RawMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset: next as i64,
            key: message.key.clone(),
            payload: message.payload.to_vec(),
        };
        topic.committed.insert(self.group.clone(), next + 1);
        Some(raw)
    }
}

#[async_trait]
impl Consumer for ChannelConsumer {
    async fn recv(&mut self) -> Result<RawMessage> {
        loop {
            if self.closed {
                return Err(BusError::Closed);
            }

            // Register for wakeups before polling so an append between the
            // poll and the await is not missed.
            let appended = self.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(message) = self.poll() {
                return Ok(message);
            }

            appended.await;
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
