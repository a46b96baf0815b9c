//! Relay -> ingress -> hub -> reconciler, end to end over loopback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use parley::clock::LogicalClock;
use parley::config::RelayConfig;
use parley::event::Event;
use parley::hub::{BroadcastHub, Registration};
use parley::ingress::EventIngress;
use parley::reconciler::{ApplyOutcome, ClientReconciler, CoordinatorView};
use parley::relay::{RelayPublisher, TopicRelay};
use parley::rpc::ServerInfo;

struct Pipeline {
    relay: Arc<TopicRelay>,
    clock: Arc<LogicalClock>,
    hub: Arc<BroadcastHub>,
    publisher: RelayPublisher,
}

impl Pipeline {
    async fn start() -> Self {
        let config = RelayConfig {
            inbound_addr: "127.0.0.1:0".to_string(),
            outbound_addr: "127.0.0.1:0".to_string(),
            high_water_mark: 1000,
        };
        let relay = Arc::new(TopicRelay::bind(&config).await.unwrap());
        let addrs = relay.local_addrs().unwrap();
        let running = Arc::clone(&relay);
        tokio::spawn(async move { running.run().await });

        let clock = Arc::new(LogicalClock::new());
        let hub = Arc::new(BroadcastHub::default());
        let ingress = EventIngress::new(
            addrs.outbound.to_string(),
            Arc::clone(&clock),
            Arc::clone(&hub),
        );
        tokio::spawn(async move { ingress.run().await });

        for _ in 0..200 {
            if relay.subscriber_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(relay.subscriber_count(), 1, "ingress never attached");

        let publisher = RelayPublisher::connect(&addrs.inbound.to_string())
            .await
            .unwrap();
        Self {
            relay,
            clock,
            hub,
            publisher,
        }
    }

    async fn publish(&mut self, topic: &str, payload: serde_json::Value) {
        let body = serde_json::to_vec(&payload).unwrap();
        self.publisher.publish(topic, body).await.unwrap();
    }
}

async fn next_event(consumer: &mut Registration) -> Event {
    let line = timeout(Duration::from_secs(5), consumer.receiver.recv())
        .await
        .expect("timed out waiting for hub event")
        .expect("consumer closed");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_channel_post_reaches_consumers_without_clock_merge() {
    let mut pipeline = Pipeline::start().await;
    let mut general = pipeline.hub.register().await;
    let mut random = pipeline.hub.register().await;

    pipeline
        .publish(
            "general",
            json!({"user": "alice", "channel": "general", "message": "hi", "timestamp": 1000}),
        )
        .await;

    let seen_by_general = next_event(&mut general).await;
    let seen_by_random = next_event(&mut random).await;
    assert_eq!(seen_by_general, seen_by_random);
    assert_eq!(seen_by_general.topic, "general");
    assert_eq!(pipeline.clock.current(), 0);

    let mut in_general = ClientReconciler::new("bob");
    in_general.select_channel("general");
    let mut in_random = ClientReconciler::new("carol");
    in_random.select_channel("random");

    assert!(in_general.apply(&seen_by_general).rendered().is_some());
    assert_eq!(in_random.apply(&seen_by_random), ApplyOutcome::NotActive);
}

#[tokio::test]
async fn test_relayed_clock_is_merged() {
    let mut pipeline = Pipeline::start().await;
    let mut consumer = pipeline.hub.register().await;

    pipeline
        .publish(
            "bob",
            json!({"src": "alice", "dst": "bob", "message": "hey", "timestamp": 1000, "clock": 12}),
        )
        .await;

    let event = next_event(&mut consumer).await;
    assert_eq!(event.clock, Some(12));
    assert_eq!(pipeline.clock.current(), 13);
}

#[tokio::test]
async fn test_bad_payload_does_not_stop_ingress() {
    let mut pipeline = Pipeline::start().await;
    let mut consumer = pipeline.hub.register().await;

    pipeline
        .publisher
        .publish("general", &b"\xff not json"[..])
        .await
        .unwrap();
    pipeline
        .publish("general", json!({"user": "alice", "message": "after"}))
        .await;

    let event = next_event(&mut consumer).await;
    assert_eq!(event.to_record()["message"], "after");
}

#[tokio::test]
async fn test_election_overrides_roster_guess() {
    let mut pipeline = Pipeline::start().await;
    let mut consumer = pipeline.hub.register().await;

    let mut reconciler = ClientReconciler::new("bob");
    reconciler.select_channel("general");
    reconciler.infer_from_roster(&[
        ServerInfo {
            name: "server_1".to_string(),
            rank: 1,
        },
        ServerInfo {
            name: "server_2".to_string(),
            rank: 2,
        },
    ]);
    assert_eq!(
        reconciler.coordinator(),
        &CoordinatorView::Inferred("server_1".to_string())
    );

    pipeline
        .publish(
            "servers",
            json!({"service": "election", "data": {"coordinator": "server_2"}}),
        )
        .await;

    let event = next_event(&mut consumer).await;
    assert_eq!(
        reconciler.apply(&event),
        ApplyOutcome::CoordinatorChanged("server_2".to_string())
    );
    assert_eq!(
        reconciler.coordinator(),
        &CoordinatorView::Confirmed("server_2".to_string())
    );
}

#[tokio::test]
async fn test_disconnected_consumer_is_skipped() {
    let mut pipeline = Pipeline::start().await;
    let mut staying = pipeline.hub.register().await;
    let leaving = pipeline.hub.register().await;
    assert_eq!(pipeline.hub.consumer_count().await, 2);

    drop(leaving);
    pipeline
        .publish("general", json!({"user": "alice", "channel": "general", "message": "one"}))
        .await;
    next_event(&mut staying).await;

    for _ in 0..200 {
        if pipeline.hub.consumer_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pipeline.hub.consumer_count().await, 1);

    pipeline
        .publish("general", json!({"user": "alice", "channel": "general", "message": "two"}))
        .await;
    let event = next_event(&mut staying).await;
    assert_eq!(event.to_record()["message"], "two");
    assert!(pipeline.relay.forwarded_count() >= 2);
}
