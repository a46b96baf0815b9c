use std::time::Duration;

use super::*;
use crate::event::{ChannelMessage, Event};

fn post(text: &str) -> Event {
    Event::channel_message(
        "general",
        ChannelMessage {
            user: "alice".to_string(),
            channel: "general".to_string(),
            message: text.to_string(),
            timestamp: Some(1000.0),
        },
        None,
    )
}

async fn wait_for_count(hub: &BroadcastHub, expected: usize) {
    for _ in 0..100 {
        if hub.consumer_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("consumer count never reached {expected}");
}

#[tokio::test]
async fn test_publish_with_no_consumers() {
    let hub = BroadcastHub::default();
    assert_eq!(hub.publish(&post("hi")).await, 0);
}

#[tokio::test]
async fn test_publish_reaches_all_consumers_in_order() {
    let hub = BroadcastHub::default();
    let mut a = hub.register().await;
    let mut b = hub.register().await;

    assert_eq!(hub.publish(&post("one")).await, 2);
    assert_eq!(hub.publish(&post("two")).await, 2);

    for reg in [&mut a, &mut b] {
        let first: Event = serde_json::from_str(&reg.receiver.recv().await.unwrap()).unwrap();
        let second: Event = serde_json::from_str(&reg.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(first, post("one"));
        assert_eq!(second, post("two"));
    }
}

#[tokio::test]
async fn test_late_consumer_gets_no_replay() {
    let hub = BroadcastHub::default();
    hub.publish(&post("early")).await;

    let mut late = hub.register().await;
    hub.publish(&post("later")).await;

    let got: Event = serde_json::from_str(&late.receiver.recv().await.unwrap()).unwrap();
    assert_eq!(got, post("later"));
    assert!(late.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnected_consumer_removed_and_others_served() {
    let hub = BroadcastHub::default();
    let gone = hub.register().await;
    let mut stays = hub.register().await;

    drop(gone.receiver);

    // next publish must not fail and must skip the departed consumer
    assert_eq!(hub.publish(&post("after")).await, 1);
    assert!(stays.receiver.recv().await.is_some());
    wait_for_count(&hub, 1).await;
}

#[tokio::test]
async fn test_drop_triggers_watcher_unregister() {
    let hub = BroadcastHub::default();
    let reg = hub.register().await;
    assert_eq!(hub.consumer_count().await, 1);

    drop(reg);
    wait_for_count(&hub, 0).await;
}

#[tokio::test]
async fn test_full_consumer_dropped_and_stream_ends() {
    let hub = BroadcastHub::new(1);
    let mut slow = hub.register().await;

    assert_eq!(hub.publish(&post("fits")).await, 1);
    assert_eq!(hub.publish(&post("overflows")).await, 0);
    assert_eq!(hub.consumer_count().await, 0);

    // queued event still readable, then the stream closes
    assert!(slow.receiver.recv().await.is_some());
    let closed = tokio::time::timeout(Duration::from_secs(1), slow.receiver.recv()).await;
    assert_eq!(closed.unwrap(), None);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let hub = BroadcastHub::default();
    let reg = hub.register().await;

    assert!(hub.unregister(reg.id).await);
    assert!(!hub.unregister(reg.id).await);
    assert_eq!(hub.consumer_count().await, 0);
}
