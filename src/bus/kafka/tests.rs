use super::*;

#[test]
fn test_default_config() {
    let config = KafkaBrokerConfig::new("localhost:9092");
    assert_eq!(config.bootstrap_servers, "localhost:9092");
    assert_eq!(config.send_timeout, Duration::from_secs(5));
    assert_eq!(config.admin_timeout, Duration::from_secs(10));
    assert_eq!(config.security, SecurityConfig::default());
}

#[test]
fn test_sasl_settings_reach_every_client() {
    let config = KafkaBrokerConfig::new("localhost:9092")
        .with_security(SecurityConfig::sasl_ssl("user", "pass", "SCRAM-SHA-256"));

    for client in [
        config.base_config(),
        config.build_producer_config(),
        config.build_consumer_config("demo.consumer"),
    ] {
        assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(client.get("sasl.username"), Some("user"));
        assert_eq!(client.get("sasl.password"), Some("pass"));
        assert_eq!(client.get("ssl.ca.location"), None);
    }
}

#[test]
fn test_plaintext_config_sets_no_security_properties() {
    let config = KafkaBrokerConfig::new("localhost:9092").base_config();
    assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
    assert_eq!(config.get("security.protocol"), None);
}

#[test]
fn test_producer_config_waits_for_all_replicas() {
    let config = KafkaBrokerConfig::new("localhost:9092")
        .with_send_timeout(Duration::from_millis(2500))
        .build_producer_config();
    assert_eq!(config.get("acks"), Some("all"));
    assert_eq!(config.get("message.timeout.ms"), Some("2500"));
}

#[test]
fn test_consumer_config_uses_group_and_earliest_offset() {
    let config = KafkaBrokerConfig::new("localhost:9092")
        .with_security(SecurityConfig {
            protocol: Some("SASL_PLAINTEXT".to_string()),
            ..SecurityConfig::default()
        })
        .build_consumer_config("demo.consumer");
    assert_eq!(config.get("group.id"), Some("demo.consumer"));
    assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
    assert_eq!(config.get("enable.auto.commit"), Some("true"));
    assert_eq!(config.get("security.protocol"), Some("SASL_PLAINTEXT"));
}
