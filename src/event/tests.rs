use serde_json::json;

use super::*;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[test]
fn test_channel_post_classified() {
    let event = Event::from_record(
        "general",
        record(json!({"user": "alice", "channel": "general", "message": "hi", "timestamp": 1000})),
    );

    assert_eq!(event.topic, "general");
    assert_eq!(event.clock, None);
    match event.payload {
        EventPayload::ChannelMessage(m) => {
            assert_eq!(m.user, "alice");
            assert_eq!(m.channel, "general");
            assert_eq!(m.message, "hi");
            assert_eq!(m.timestamp, Some(1000.0));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_private_message_classified_by_dst() {
    let event = Event::from_record(
        "bob",
        record(json!({"src": "alice", "dst": "bob", "message": "hey", "timestamp": 1.5, "clock": 4})),
    );

    assert_eq!(event.clock, Some(4));
    assert!(matches!(
        event.payload,
        EventPayload::PrivateMessage(PrivateMessage { ref src, ref dst, .. })
            if src == "alice" && dst == "bob"
    ));
}

#[test]
fn test_election_classified_before_other_fields() {
    let event = Event::from_record(
        "servers",
        record(json!({"service": "election", "data": {"coordinator": "server_2"}, "message": "x"})),
    );

    assert_eq!(
        event.payload,
        EventPayload::TopologyAnnouncement(TopologyAnnouncement {
            coordinator: "server_2".to_string()
        })
    );
}

#[test]
fn test_election_without_coordinator_is_other() {
    let event = Event::from_record("servers", record(json!({"service": "election", "data": {}})));
    assert!(matches!(event.payload, EventPayload::Other(_)));
}

#[test]
fn test_frame_topic_wins_over_record_topic() {
    let event = Event::from_record(
        "general",
        record(json!({"topic": "spoofed", "user": "a", "message": "m"})),
    );
    assert_eq!(event.topic, "general");
}

#[test]
fn test_serialized_shape_is_flat() {
    let event = Event::from_record(
        "general",
        record(json!({"user": "alice", "channel": "general", "message": "hi", "timestamp": 1000, "clock": 3})),
    );

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["topic"], "general");
    assert_eq!(value["user"], "alice");
    assert_eq!(value["channel"], "general");
    assert_eq!(value["message"], "hi");
    assert_eq!(value["clock"], 3);
    assert_eq!(value["timestamp"].as_f64(), Some(1000.0));
}

#[test]
fn test_other_payload_forwarded_untouched() {
    let raw = json!({"service": "heartbeat", "data": {"user": "server_1"}});
    let event = Event::from_record("servers", record(raw.clone()));

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["service"], raw["service"]);
    assert_eq!(value["data"], raw["data"]);
    assert_eq!(value["topic"], "servers");
}

#[test]
fn test_deserialize_from_push_stream_json() {
    let event: Event = serde_json::from_str(
        r#"{"topic":"servers","service":"election","data":{"coordinator":"server_1"}}"#,
    )
    .unwrap();

    assert_eq!(event, Event::election("server_1"));
}

#[test]
fn test_decode_rejects_non_object() {
    assert!(matches!(
        decode_event("general", b"[1,2,3]"),
        Err(DecodeError::NotAnObject)
    ));
    assert!(matches!(
        decode_event("general", b"\x93\x01"),
        Err(DecodeError::Json(_))
    ));
}

#[test]
fn test_unmodelled_fields_are_forwarded() {
    let event = decode_event(
        "general",
        br#"{"user":"alice","channel":"general","message":"hi","timestamp":1000,"id":"m-1"}"#,
    )
    .unwrap();

    assert!(matches!(event.payload, EventPayload::ChannelMessage(_)));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "topic": "general",
            "user": "alice",
            "channel": "general",
            "message": "hi",
            "timestamp": 1000,
            "id": "m-1",
        })
    );
}

#[test]
fn test_integer_timestamp_keeps_its_encoding() {
    let event = decode_event(
        "bob",
        br#"{"src":"alice","dst":"bob","message":"hey","timestamp":1700000000123,"clock":7}"#,
    )
    .unwrap();

    let line = serde_json::to_string(&event).unwrap();
    assert!(line.contains(r#""timestamp":1700000000123"#), "{line}");
    assert!(!line.contains("1700000000123.0"), "{line}");
    assert_eq!(event.clock, Some(7));
}

#[test]
fn test_election_data_extras_survive() {
    let event = decode_event(
        "servers",
        br#"{"service":"election","data":{"coordinator":"server_2","timestamp":5.5,"clock":4}}"#,
    )
    .unwrap();

    assert_eq!(
        event.payload,
        EventPayload::TopologyAnnouncement(TopologyAnnouncement {
            coordinator: "server_2".to_string()
        })
    );
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value["data"],
        json!({"coordinator": "server_2", "timestamp": 5.5, "clock": 4})
    );
}

#[test]
fn test_non_positive_clock_is_forwarded_but_not_merged() {
    let event = decode_event("general", br#"{"user":"a","message":"m","clock":0}"#).unwrap();

    assert_eq!(event.clock, None);
    assert_eq!(event.fields()["clock"], 0);
    assert_eq!(serde_json::to_value(&event).unwrap()["clock"], 0);
}

#[test]
fn test_push_stream_round_trip_is_stable() {
    let event = decode_event(
        "general",
        r#"{"user":"alice","message":"olá","timestamp":1000,"extra":{"k":[1,2]}}"#.as_bytes(),
    )
    .unwrap();

    let again: Event = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
    assert_eq!(again, event);
}
