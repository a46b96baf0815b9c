//! Topic relay fan-out over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use parley::config::RelayConfig;
use parley::relay::{RelayAddrs, RelayPublisher, RelaySubscriber, TopicRelay};
use parley::wire::Multipart;

async fn start_relay() -> (Arc<TopicRelay>, RelayAddrs) {
    let config = RelayConfig {
        inbound_addr: "127.0.0.1:0".to_string(),
        outbound_addr: "127.0.0.1:0".to_string(),
        high_water_mark: 1000,
    };
    let relay = Arc::new(TopicRelay::bind(&config).await.unwrap());
    let addrs = relay.local_addrs().unwrap();
    let running = Arc::clone(&relay);
    tokio::spawn(async move { running.run().await });
    (relay, addrs)
}

async fn subscribe(relay: &TopicRelay, addrs: &RelayAddrs, expected: usize) -> RelaySubscriber {
    let subscriber = RelaySubscriber::connect(&addrs.outbound.to_string())
        .await
        .unwrap();
    for _ in 0..200 {
        if relay.subscriber_count() >= expected {
            return subscriber;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("subscriber never attached");
}

async fn recv(subscriber: &mut RelaySubscriber) -> Multipart {
    timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .expect("timed out waiting for relayed message")
        .unwrap()
}

#[tokio::test]
async fn test_per_publisher_order_is_preserved() {
    const PER_PUBLISHER: usize = 200;

    let (relay, addrs) = start_relay().await;
    let mut first = subscribe(&relay, &addrs, 1).await;
    let mut second = subscribe(&relay, &addrs, 2).await;

    let mut tasks = Vec::new();
    for name in ["a", "b"] {
        let inbound = addrs.inbound.to_string();
        tasks.push(tokio::spawn(async move {
            let mut publisher = RelayPublisher::connect(&inbound).await.unwrap();
            for seq in 0..PER_PUBLISHER {
                let payload = format!("{{\"from\":\"{name}\",\"seq\":{seq}}}");
                publisher.publish(name, payload).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for subscriber in [&mut first, &mut second] {
        let mut next = [0usize; 2];
        for _ in 0..PER_PUBLISHER * 2 {
            let message = recv(subscriber).await;
            let frames = message.frames();
            let slot = if frames[0].as_ref() == b"a" { 0 } else { 1 };
            let body: serde_json::Value = serde_json::from_slice(&frames[1]).unwrap();
            assert_eq!(body["seq"], next[slot], "publisher {slot} reordered");
            next[slot] += 1;
        }
        assert_eq!(next, [PER_PUBLISHER, PER_PUBLISHER]);
    }
}

#[tokio::test]
async fn test_frames_are_forwarded_verbatim() {
    let (relay, addrs) = start_relay().await;
    let mut subscriber = subscribe(&relay, &addrs, 1).await;

    let message = Multipart::new(vec![
        Bytes::from_static(b"general"),
        Bytes::from_static(b"\x00\x01not json at all"),
        Bytes::new(),
    ]);
    let mut publisher = RelayPublisher::connect(&addrs.inbound.to_string())
        .await
        .unwrap();
    publisher.send(&message).await.unwrap();

    assert_eq!(recv(&mut subscriber).await, message);
}

#[tokio::test]
async fn test_late_subscriber_sees_only_later_messages() {
    let (relay, addrs) = start_relay().await;
    let mut early = subscribe(&relay, &addrs, 1).await;

    let mut publisher = RelayPublisher::connect(&addrs.inbound.to_string())
        .await
        .unwrap();
    publisher.publish("general", "{\"n\":1}").await.unwrap();
    recv(&mut early).await;

    let mut late = subscribe(&relay, &addrs, 2).await;
    publisher.publish("general", "{\"n\":2}").await.unwrap();

    let got = recv(&mut late).await;
    assert_eq!(got.frames()[1].as_ref(), b"{\"n\":2}");
}
