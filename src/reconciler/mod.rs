//! Client-side reconciliation of the push stream.
//!
//! Each consumer runs one [`ClientReconciler`]. It classifies incoming
//! events, decides whether they belong to the conversation currently in
//! focus, and suppresses duplicates that arrive through more than one path
//! (history load, optimistic local echo, push stream).

pub mod sse;

use std::collections::HashSet;

use tracing::{debug, info};

use crate::event::{ChannelMessage, Event, EventPayload, PrivateMessage};
use crate::rpc::ServerInfo;

/// Timestamps below this are taken to be seconds rather than milliseconds.
const SECONDS_THRESHOLD: f64 = 1e11;

/// Normalize a wall-clock timestamp to integer milliseconds.
pub fn normalize_timestamp(timestamp: f64) -> i64 {
    if timestamp.abs() < SECONDS_THRESHOLD {
        (timestamp * 1000.0).round() as i64
    } else {
        timestamp.round() as i64
    }
}

/// Composite identity of a rendered message.
///
/// Two events with the same id are never both rendered into one transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenderedMessageId {
    Private {
        sender: String,
        dest: String,
        timestamp_ms: Option<i64>,
        clock: Option<u64>,
    },
    Channel {
        user: String,
        channel: String,
        message: String,
        timestamp_ms: Option<i64>,
        clock: Option<u64>,
    },
}

impl RenderedMessageId {
    fn private(message: &PrivateMessage, clock: Option<u64>) -> Self {
        RenderedMessageId::Private {
            sender: message.src.clone(),
            dest: message.dst.clone(),
            timestamp_ms: message.timestamp.map(normalize_timestamp),
            clock,
        }
    }

    fn channel(channel: &str, message: &ChannelMessage, clock: Option<u64>) -> Self {
        RenderedMessageId::Channel {
            user: message.user.clone(),
            channel: channel.to_string(),
            message: message.message.clone(),
            timestamp_ms: message.timestamp.map(normalize_timestamp),
            clock,
        }
    }
}

/// Which conversation is in focus. Channel and private focus are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    None,
    Channel(String),
    Private(String),
}

/// Local belief about the current coordinator.
///
/// `Inferred` is a roster-based guess for display only; `Confirmed` comes
/// from an election announcement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CoordinatorView {
    #[default]
    Unknown,
    Inferred(String),
    Confirmed(String),
}

impl CoordinatorView {
    pub fn name(&self) -> Option<&str> {
        match self {
            CoordinatorView::Unknown => None,
            CoordinatorView::Inferred(name) | CoordinatorView::Confirmed(name) => Some(name),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, CoordinatorView::Confirmed(_))
    }
}

/// Whether a message is a channel post or a private message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Channel,
    Private,
}

/// A line accepted into the visible transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub id: RenderedMessageId,
    pub kind: MessageKind,
    pub author: String,
    /// Channel name, or the other party of a private conversation.
    pub conversation: String,
    pub text: String,
    pub timestamp_ms: Option<i64>,
    /// Authored by the local user.
    pub own: bool,
}

/// Result of feeding one event to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Rendered(RenderedMessage),
    /// Already rendered in the current conversation.
    Duplicate,
    /// Channel post for a channel that is not in focus.
    NotActive,
    /// Private message between two other users.
    NotAddressed,
    CoordinatorChanged(String),
    /// Not a chat or topology event.
    Ignored,
}

impl ApplyOutcome {
    pub fn rendered(&self) -> Option<&RenderedMessage> {
        match self {
            ApplyOutcome::Rendered(message) => Some(message),
            _ => None,
        }
    }
}

/// Per-consumer view over the event stream.
#[derive(Debug)]
pub struct ClientReconciler {
    current_user: String,
    focus: Focus,
    seen: HashSet<RenderedMessageId>,
    coordinator: CoordinatorView,
}

impl ClientReconciler {
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            current_user: current_user.into(),
            focus: Focus::None,
            seen: HashSet::new(),
            coordinator: CoordinatorView::Unknown,
        }
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn active_channel(&self) -> Option<&str> {
        match &self.focus {
            Focus::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn active_private_peer(&self) -> Option<&str> {
        match &self.focus {
            Focus::Private(peer) => Some(peer),
            _ => None,
        }
    }

    pub fn coordinator(&self) -> &CoordinatorView {
        &self.coordinator
    }

    /// Number of ids remembered for the current conversation.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Focus a channel. The transcript restarts, so remembered ids are dropped.
    pub fn select_channel(&mut self, channel: impl Into<String>) {
        self.set_focus(Focus::Channel(channel.into()));
    }

    /// Focus a private conversation with `peer`.
    pub fn select_private_peer(&mut self, peer: impl Into<String>) {
        self.set_focus(Focus::Private(peer.into()));
    }

    fn set_focus(&mut self, focus: Focus) {
        debug!(from = ?self.focus, to = ?focus, "Focus changed");
        self.focus = focus;
        self.seen.clear();
    }

    /// Classify, route and deduplicate one event.
    pub fn apply(&mut self, event: &Event) -> ApplyOutcome {
        match &event.payload {
            EventPayload::TopologyAnnouncement(announcement) => {
                let name = announcement.coordinator.clone();
                info!(coordinator = %name, "Coordinator confirmed by election");
                self.coordinator = CoordinatorView::Confirmed(name.clone());
                ApplyOutcome::CoordinatorChanged(name)
            }
            EventPayload::PrivateMessage(message) => self.apply_private(message, event.clock),
            EventPayload::ChannelMessage(message) => {
                self.apply_channel(&event.topic, message, event.clock)
            }
            EventPayload::Other(_) => ApplyOutcome::Ignored,
        }
    }

    /// Echo a message the local user just sent, before the push stream
    /// delivers it. Shares the dedup path with [`apply`](Self::apply).
    pub fn render_local(&mut self, event: &Event) -> ApplyOutcome {
        self.apply(event)
    }

    /// Replay a history page for the focused conversation.
    ///
    /// Events are ordered by normalized timestamp (untimestamped first,
    /// otherwise stable) and each goes through the normal dedup path.
    pub fn load_history(&mut self, events: Vec<Event>) -> Vec<RenderedMessage> {
        let mut events = events;
        events.sort_by_key(event_timestamp_ms);
        events
            .iter()
            .filter_map(|event| match self.apply(event) {
                ApplyOutcome::Rendered(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Guess the coordinator as the lowest-ranked server in `roster`.
    ///
    /// Ignored once an election has confirmed a coordinator. Returns the
    /// inferred name when the view changed.
    pub fn infer_from_roster(&mut self, roster: &[ServerInfo]) -> Option<String> {
        if self.coordinator.is_confirmed() {
            return None;
        }
        let lowest = roster.iter().min_by_key(|server| server.rank)?;
        if self.coordinator.name() == Some(lowest.name.as_str()) {
            return None;
        }
        debug!(coordinator = %lowest.name, rank = lowest.rank, "Coordinator inferred from roster");
        self.coordinator = CoordinatorView::Inferred(lowest.name.clone());
        Some(lowest.name.clone())
    }

    fn apply_private(&mut self, message: &PrivateMessage, clock: Option<u64>) -> ApplyOutcome {
        let own = message.src == self.current_user;
        if !own && message.dst != self.current_user {
            return ApplyOutcome::NotAddressed;
        }
        let peer = if own { &message.dst } else { &message.src };

        if self.active_private_peer() != Some(peer.as_str()) {
            info!(peer = %peer, "Switching to private conversation");
            self.select_private_peer(peer.clone());
        }

        let id = RenderedMessageId::private(message, clock);
        self.render(id.clone(), || RenderedMessage {
            id,
            kind: MessageKind::Private,
            author: message.src.clone(),
            conversation: peer.clone(),
            text: message.message.clone(),
            timestamp_ms: message.timestamp.map(normalize_timestamp),
            own,
        })
    }

    fn apply_channel(
        &mut self,
        topic: &str,
        message: &ChannelMessage,
        clock: Option<u64>,
    ) -> ApplyOutcome {
        let channel = if message.channel.is_empty() {
            topic
        } else {
            message.channel.as_str()
        };
        if self.active_channel() != Some(channel) {
            return ApplyOutcome::NotActive;
        }

        let own = message.user == self.current_user;
        let id = RenderedMessageId::channel(channel, message, clock);
        self.render(id.clone(), || RenderedMessage {
            id,
            kind: MessageKind::Channel,
            author: message.user.clone(),
            conversation: channel.to_string(),
            text: message.message.clone(),
            timestamp_ms: message.timestamp.map(normalize_timestamp),
            own,
        })
    }

    fn render(
        &mut self,
        id: RenderedMessageId,
        build: impl FnOnce() -> RenderedMessage,
    ) -> ApplyOutcome {
        if !self.seen.insert(id) {
            return ApplyOutcome::Duplicate;
        }
        ApplyOutcome::Rendered(build())
    }
}

fn event_timestamp_ms(event: &Event) -> Option<i64> {
    let timestamp = match &event.payload {
        EventPayload::ChannelMessage(m) => m.timestamp,
        EventPayload::PrivateMessage(m) => m.timestamp,
        _ => None,
    };
    timestamp.map(normalize_timestamp)
}
