use super::*;
use crate::bus::ChannelBroker;
use serde_json::json;

fn event(event_type: &str, value: serde_json::Value) -> IncomingEvent {
    let payload = match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("payload must be an object"),
    };
    IncomingEvent::new(event_type, payload)
}

fn session_on(broker: &ChannelBroker) -> BrokerSession {
    BrokerSession::new(
        Arc::new(broker.clone()),
        SessionConfig::new("demo.events.incoming", "demo.consumer"),
    )
}

#[tokio::test]
async fn test_ensure_topic_twice_is_idempotent() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);

    assert_eq!(session.ensure_topic().await, Provisioning::Created);
    assert_eq!(session.ensure_topic().await, Provisioning::Exists);

    assert_eq!(broker.topic_names(), vec!["demo.events.incoming".to_string()]);
    assert_eq!(broker.partitions("demo.events.incoming"), Some(1));
    assert_eq!(broker.open_admin_connections(), 0);
}

#[tokio::test]
async fn test_ensure_topic_failure_is_swallowed_and_admin_closed() {
    let broker = ChannelBroker::default();
    broker.set_admin_failure(true);
    let session = session_on(&broker);

    assert_eq!(session.ensure_topic().await, Provisioning::Skipped);
    assert_eq!(broker.open_admin_connections(), 0);
}

#[tokio::test]
async fn test_start_survives_provisioning_failure() {
    let broker = ChannelBroker::default();
    broker.set_admin_failure(true);
    let session = session_on(&broker);

    session.start().await.unwrap();
    assert!(session.is_started().await);

    // Publishing auto-creates the topic, as brokers with auto-create do.
    session
        .publish(&event("demo.test", json!({"hello": "world"})))
        .await
        .unwrap();
    assert_eq!(broker.message_count("demo.events.incoming"), 1);
}

#[tokio::test]
async fn test_start_skips_provisioning_when_disabled() {
    let broker = ChannelBroker::default();
    let session = BrokerSession::new(
        Arc::new(broker.clone()),
        SessionConfig::new("demo.events.incoming", "demo.consumer").with_create_topics(false),
    );

    session.start().await.unwrap();
    assert!(broker.topic_names().is_empty());
}

#[tokio::test]
async fn test_start_fails_when_broker_unavailable() {
    let broker = ChannelBroker::default();
    broker.set_unavailable(true);
    let session = session_on(&broker);

    let result = session.start().await;
    assert!(matches!(result, Err(BusError::BrokerUnavailable(_))));
    assert!(!session.is_started().await);
}

#[tokio::test]
async fn test_publish_before_start_is_not_started() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);

    let result = session.publish(&event("demo.test", json!({}))).await;
    assert!(matches!(result, Err(BusError::NotStarted)));
}

#[tokio::test]
async fn test_subscribe_before_start_is_not_started() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);

    assert!(matches!(
        session.subscribe_stream().await,
        Err(BusError::NotStarted)
    ));
}

#[tokio::test]
async fn test_publish_after_stop_is_not_started() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();
    session.stop().await;

    let result = session.publish(&event("demo.test", json!({}))).await;
    assert!(matches!(result, Err(BusError::NotStarted)));
}

#[tokio::test]
async fn test_publish_unacknowledged_is_broker_unavailable() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();
    broker.set_unavailable(true);

    let result = session.publish(&event("demo.test", json!({}))).await;
    assert!(matches!(result, Err(BusError::BrokerUnavailable(_))));
}

#[tokio::test]
async fn test_stream_yields_published_events_in_order() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();

    for i in 0..3 {
        session
            .publish(&event("demo.seq", json!({"n": i})))
            .await
            .unwrap();
    }

    let mut stream = session.subscribe_stream().await.unwrap();
    for i in 0..3 {
        let received = stream.next().await.unwrap();
        assert_eq!(received.event_type, "demo.seq");
        assert_eq!(received.payload["n"], json!(i));
    }
}

#[tokio::test]
async fn test_stream_skips_malformed_messages() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();

    let raw = broker.producer().await.unwrap();
    raw.send(session.topic(), None, b"{not json").await.unwrap();
    raw.send(session.topic(), None, &[0xff, 0x00]).await.unwrap();
    session
        .publish(&event("demo.ok", json!({"a": 1})))
        .await
        .unwrap();

    let mut stream = session.subscribe_stream().await.unwrap();
    let received = stream.next().await.unwrap();
    assert_eq!(received.event_type, "demo.ok");
}

#[tokio::test]
async fn test_subscription_is_handed_out_once() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();

    let stream = session.subscribe_stream().await.unwrap();
    assert!(matches!(
        session.subscribe_stream().await,
        Err(BusError::SubscriptionTaken)
    ));

    session.restore_subscription(stream).await;
    assert!(session.subscribe_stream().await.is_ok());
}

#[tokio::test]
async fn test_restore_after_stop_closes_consumer() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();

    let stream = session.subscribe_stream().await.unwrap();
    session.stop().await;
    session.restore_subscription(stream).await;

    assert!(!session.is_started().await);
    assert!(matches!(
        session.subscribe_stream().await,
        Err(BusError::NotStarted)
    ));
}

#[tokio::test]
async fn test_stream_ends_when_consumer_closed() {
    let broker = ChannelBroker::default();
    let mut consumer = broker.consumer("demo.events.incoming", "g").await.unwrap();
    consumer.close().await;

    let mut stream = EventStream::new(consumer, "demo.events.incoming");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);

    session.stop().await;
    session.start().await.unwrap();
    session.stop().await;
    session.stop().await;
    assert!(!session.is_started().await);
}

#[tokio::test]
async fn test_reset_replaces_lost_subscription() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);
    session.start().await.unwrap();

    session.publish(&event("demo.first", json!({}))).await.unwrap();
    let mut lost = session.subscribe_stream().await.unwrap();
    assert_eq!(lost.next().await.unwrap().event_type, "demo.first");
    drop(lost);

    session.reset_subscription().await.unwrap();
    session.publish(&event("demo.second", json!({}))).await.unwrap();

    // The replacement resumes after what the lost stream already read.
    let mut stream = session.subscribe_stream().await.unwrap();
    assert_eq!(stream.next().await.unwrap().event_type, "demo.second");
}

#[tokio::test]
async fn test_reset_before_start_is_noop() {
    let broker = ChannelBroker::default();
    let session = session_on(&broker);

    session.reset_subscription().await.unwrap();
    assert!(matches!(
        session.subscribe_stream().await,
        Err(BusError::NotStarted)
    ));
}
