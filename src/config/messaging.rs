//! Broker configuration types.

use serde::Deserialize;

/// Broker type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    /// In-process channel broker (no external broker).
    #[default]
    Channel,
    /// Apache Kafka.
    Kafka,
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker type discriminator.
    #[serde(rename = "type")]
    pub broker_type: BrokerType,
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic incoming events are queued on.
    pub topic: String,
    /// Consumer group of the persistence loop.
    pub consumer_group: String,
    /// Create the topic on startup if it does not exist.
    pub create_topics: bool,
    /// Partition count used when creating the topic.
    /// Ordering is only guaranteed within a partition.
    pub topic_partitions: u32,
    /// Replication factor used when creating the topic.
    pub replication_factor: u32,
    /// Authentication and transport security for Kafka clients.
    pub security: SecurityConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broker_type: BrokerType::Channel,
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "demo.events.incoming".to_string(),
            consumer_group: "demo.consumer".to_string(),
            create_topics: true,
            topic_partitions: 1,
            replication_factor: 1,
            security: SecurityConfig::default(),
        }
    }
}

/// Kafka client security settings, applied to admin, producer and consumer alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL.
    pub protocol: Option<String>,
    /// PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512.
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// CA certificate path for SSL connections.
    pub ssl_ca_location: Option<String>,
}

impl SecurityConfig {
    /// SASL credentials over SSL.
    pub fn sasl_ssl(
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        Self {
            protocol: Some("SASL_SSL".to_string()),
            sasl_mechanism: Some(mechanism.into()),
            sasl_username: Some(username.into()),
            sasl_password: Some(password.into()),
            ssl_ca_location: None,
        }
    }

    /// librdkafka property pairs for the settings that are present.
    pub fn client_properties(&self) -> Vec<(&'static str, &str)> {
        [
            ("security.protocol", &self.protocol),
            ("sasl.mechanism", &self.sasl_mechanism),
            ("sasl.username", &self.sasl_username),
            ("sasl.password", &self.sasl_password),
            ("ssl.ca.location", &self.ssl_ca_location),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}
