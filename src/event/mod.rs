//! Event model shared by ingress, hub and reconciler.
//!
//! On the wire an event is one flat JSON object: the relay topic plus
//! every decoded payload field (`{"topic": .., "user": .., ...}`). The
//! decoded fields are kept as received; [`EventPayload`] is a classified
//! view over them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::positive_clock;

/// Topic assigned when a relayed message lacks a topic frame.
pub const UNKNOWN_TOPIC: &str = "unknown";

/// Service name carried by coordinator announcements.
pub const ELECTION_SERVICE: &str = "election";

/// Conventional topic for topology announcements.
pub const SERVERS_TOPIC: &str = "servers";

/// Flat JSON record.
pub type Record = Map<String, Value>;

/// Errors decoding a relayed payload frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Post to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub user: String,
    /// Empty when the producer relied on the topic alone.
    pub channel: String,
    pub message: String,
    pub timestamp: Option<f64>,
}

/// Message between two users.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateMessage {
    pub src: String,
    pub dst: String,
    pub message: String,
    pub timestamp: Option<f64>,
}

/// Coordinator election result.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyAnnouncement {
    pub coordinator: String,
}

/// Classified payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ChannelMessage(ChannelMessage),
    PrivateMessage(PrivateMessage),
    TopologyAnnouncement(TopologyAnnouncement),
    /// Anything else; forwarded untouched and never rendered.
    Other(Record),
}

impl EventPayload {
    /// Classify a decoded record by which fields are present.
    ///
    /// Order matters: an election announcement wins over everything, then a
    /// `dst` field marks a private message, then a `message` field marks a
    /// channel post.
    pub fn from_record(record: Record) -> Self {
        if record.get("service").and_then(Value::as_str) == Some(ELECTION_SERVICE) {
            let coordinator = record
                .get("data")
                .and_then(|d| d.get("coordinator"))
                .and_then(Value::as_str);
            if let Some(coordinator) = coordinator {
                return EventPayload::TopologyAnnouncement(TopologyAnnouncement {
                    coordinator: coordinator.to_string(),
                });
            }
        }

        if let Some(dst) = record.get("dst").and_then(Value::as_str) {
            return EventPayload::PrivateMessage(PrivateMessage {
                src: string_field(&record, "src"),
                dst: dst.to_string(),
                message: string_field(&record, "message"),
                timestamp: record.get("timestamp").and_then(Value::as_f64),
            });
        }

        if record.contains_key("message") {
            return EventPayload::ChannelMessage(ChannelMessage {
                user: string_field(&record, "user"),
                channel: string_field(&record, "channel"),
                message: string_field(&record, "message"),
                timestamp: record.get("timestamp").and_then(Value::as_f64),
            });
        }

        EventPayload::Other(record)
    }

    /// Minimal record for a locally built payload (without topic or clock).
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        match self {
            EventPayload::ChannelMessage(m) => {
                record.insert("user".into(), Value::from(m.user.clone()));
                if !m.channel.is_empty() {
                    record.insert("channel".into(), Value::from(m.channel.clone()));
                }
                record.insert("message".into(), Value::from(m.message.clone()));
                insert_timestamp(&mut record, m.timestamp);
            }
            EventPayload::PrivateMessage(m) => {
                record.insert("src".into(), Value::from(m.src.clone()));
                record.insert("dst".into(), Value::from(m.dst.clone()));
                record.insert("message".into(), Value::from(m.message.clone()));
                insert_timestamp(&mut record, m.timestamp);
            }
            EventPayload::TopologyAnnouncement(t) => {
                record.insert("service".into(), Value::from(ELECTION_SERVICE));
                let mut data = Record::new();
                data.insert("coordinator".into(), Value::from(t.coordinator.clone()));
                record.insert("data".into(), Value::Object(data));
            }
            EventPayload::Other(r) => record = r.clone(),
        }
        record
    }
}

/// A relayed event after ingress.
///
/// `topic` comes from the relay's first frame and is never rewritten.
/// `fields` holds the decoded payload exactly as the producer sent it
/// (minus any `topic` key); `payload` and `clock` are read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Record", into = "Record")]
pub struct Event {
    pub topic: String,
    pub payload: EventPayload,
    pub clock: Option<u64>,
    fields: Record,
}

impl Event {
    /// Build from a topic and a decoded record.
    ///
    /// A `topic` key inside the record is discarded in favor of `topic`.
    pub fn from_record(topic: impl Into<String>, mut record: Record) -> Self {
        record.remove("topic");
        let clock = positive_clock(record.get("clock"));
        let mut classified = record.clone();
        classified.remove("clock");
        Self {
            topic: topic.into(),
            payload: EventPayload::from_record(classified),
            clock,
            fields: record,
        }
    }

    fn from_payload(topic: String, payload: EventPayload, clock: Option<u64>) -> Self {
        let fields = payload.to_record();
        Self {
            topic,
            payload,
            clock,
            fields,
        }
    }

    pub fn channel_message(topic: &str, message: ChannelMessage, clock: Option<u64>) -> Self {
        Self::from_payload(
            topic.to_string(),
            EventPayload::ChannelMessage(message),
            clock,
        )
    }

    pub fn private_message(message: PrivateMessage, clock: Option<u64>) -> Self {
        Self::from_payload(
            message.dst.clone(),
            EventPayload::PrivateMessage(message),
            clock,
        )
    }

    pub fn election(coordinator: &str) -> Self {
        Self::from_payload(
            SERVERS_TOPIC.to_string(),
            EventPayload::TopologyAnnouncement(TopologyAnnouncement {
                coordinator: coordinator.to_string(),
            }),
            None,
        )
    }

    /// Decoded producer fields, without topic.
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Flat JSON record: every decoded field plus topic and clock.
    pub fn to_record(&self) -> Record {
        let mut record = self.fields.clone();
        record.insert("topic".into(), Value::from(self.topic.clone()));
        if let Some(clock) = self.clock {
            record.insert("clock".into(), Value::from(clock));
        }
        record
    }
}

impl From<Record> for Event {
    fn from(mut record: Record) -> Self {
        let topic = match record.remove("topic") {
            Some(Value::String(t)) => t,
            _ => UNKNOWN_TOPIC.to_string(),
        };
        Event::from_record(topic, record)
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        event.to_record()
    }
}

/// Decode a relayed payload frame into an event for `topic`.
pub fn decode_event(topic: &str, payload: &[u8]) -> Result<Event, DecodeError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(record) => Ok(Event::from_record(topic, record)),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn string_field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn insert_timestamp(record: &mut Record, timestamp: Option<f64>) {
    if let Some(ts) = timestamp.and_then(serde_json::Number::from_f64) {
        record.insert("timestamp".into(), Value::Number(ts));
    }
}

#[cfg(test)]
mod tests;
