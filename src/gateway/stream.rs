//! Push stream over server-sent events.
//!
//! Each connection registers one hub consumer. The stream opens with a
//! `retry` hint, then carries one `event: message` per hub event. Dropping
//! the response (peer disconnect) drops the receiver, which unregisters the
//! consumer.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::GatewayState;

/// Interval between keep-alive comments.
const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// SSE event name for hub events.
const MESSAGE_EVENT: &str = "message";

pub(super) async fn events(
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let registration = state.hub.register().await;
    debug!(consumer = %registration.id, "Push stream opened");

    let retry = state.retry;
    let hint = stream::once(async move { Ok::<_, Infallible>(SseEvent::default().retry(retry)) });
    let lines = ReceiverStream::new(registration.receiver).map(|line| {
        Ok::<_, Infallible>(SseEvent::default().event(MESSAGE_EVENT).data(line.as_ref()))
    });

    Sse::new(hint.chain(lines)).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}
