//! parley-client: terminal consumer
//!
//! Logs in through the gateway, follows the push stream and prints whatever
//! the client reconciler decides to render. Lines typed on stdin are sent
//! to the focused conversation.
//!
//! ## Commands
//! - `/join <channel>`: focus a channel (created if missing) and load its history
//! - `/dm <user>`: focus a private conversation and load its history
//! - `/msg <user> <text>`: send a private message
//! - `/servers`: refresh the coordinator guess from the server roster
//! - `/quit`
//!
//! ## Configuration
//! - `client.gateway_url`, `client.user`, `client.channel`
//! - PARLEY_LOG: tracing filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use parley::clock::positive_clock;
use parley::config::Config;
use parley::event::{Event, PrivateMessage, Record};
use parley::reconciler::sse::SseParser;
use parley::reconciler::{ApplyOutcome, ClientReconciler, CoordinatorView, MessageKind};
use parley::rpc::{parse_roster, reply_data};
use parley::utils::bootstrap::{init_tracing, parse_config_path};

type Shared = Arc<Mutex<ClientReconciler>>;

/// HTTP session against one gateway.
#[derive(Clone)]
struct Session {
    http: reqwest::Client,
    base: String,
    user: String,
}

impl Session {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> reqwest::Result<Record> {
        self.http
            .get(self.url(path))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Result<Record> {
        self.http
            .post(self.url(path))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let session = Session {
        http: reqwest::Client::new(),
        base: config.client.gateway_url.clone(),
        user: config.client.user.clone(),
    };
    info!(user = %session.user, gateway = %session.base, "Starting parley-client");

    let login = session.post("/api/login", json!({ "user": session.user })).await?;
    report_failure(&login);

    let channels = session.get("/api/channels", &[]).await?;
    let names = list_field(&channels, "channels");
    println!("channels: {}", names.join(", "));

    let reconciler: Shared = Arc::new(Mutex::new(ClientReconciler::new(session.user.clone())));
    refresh_coordinator(&session, &reconciler).await;

    if let Some(channel) = config.client.channel.as_deref() {
        join(&session, &reconciler, channel).await;
    }

    let follower = tokio::spawn(follow_forever(session.clone(), Arc::clone(&reconciler)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = handle_input(&session, &reconciler, line).await {
            warn!(error = %e, "Request failed");
        }
    }

    follower.abort();
    Ok(())
}

async fn handle_input(session: &Session, reconciler: &Shared, line: &str) -> reqwest::Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/join" if !rest.is_empty() => join(session, reconciler, rest.trim()).await,
        "/dm" if !rest.is_empty() => open_private(session, reconciler, rest.trim()).await,
        "/msg" => match rest.split_once(' ') {
            Some((peer, text)) => send_private(session, reconciler, peer, text).await?,
            None => println!("usage: /msg <user> <text>"),
        },
        "/servers" => refresh_coordinator(session, reconciler).await,
        _ if command.starts_with('/') => println!("unknown command: {command}"),
        _ => send_to_focus(session, reconciler, line).await?,
    }
    Ok(())
}

/// Send to whatever conversation is focused.
async fn send_to_focus(session: &Session, reconciler: &Shared, text: &str) -> reqwest::Result<()> {
    let (channel, peer) = {
        let r = reconciler.lock().await;
        (
            r.active_channel().map(str::to_string),
            r.active_private_peer().map(str::to_string),
        )
    };
    match (channel, peer) {
        (Some(channel), _) => {
            let reply = session
                .post(
                    "/api/publish",
                    json!({ "user": session.user, "channel": channel, "message": text }),
                )
                .await?;
            report_failure(&reply);
        }
        (None, Some(peer)) => send_private(session, reconciler, &peer, text).await?,
        (None, None) => println!("join a channel first: /join <channel>"),
    }
    Ok(())
}

/// Send a private message and echo it locally without waiting for the stream.
async fn send_private(
    session: &Session,
    reconciler: &Shared,
    peer: &str,
    text: &str,
) -> reqwest::Result<()> {
    let reply = session
        .post(
            "/api/message",
            json!({ "src": session.user, "dst": peer, "message": text }),
        )
        .await?;
    if report_failure(&reply) {
        return Ok(());
    }

    let data = reply_data(&reply);
    let timestamp = data
        .and_then(|d| d.get("timestamp"))
        .and_then(Value::as_f64)
        .unwrap_or_else(now_seconds);
    let clock = positive_clock(data.and_then(|d| d.get("clock")));

    let echo = Event::private_message(
        PrivateMessage {
            src: session.user.clone(),
            dst: peer.to_string(),
            message: text.to_string(),
            timestamp: Some(timestamp),
        },
        clock,
    );
    let outcome = reconciler.lock().await.render_local(&echo);
    print_outcome(&outcome);
    Ok(())
}

async fn join(session: &Session, reconciler: &Shared, channel: &str) {
    match session.post("/api/channel", json!({ "channel": channel })).await {
        Ok(reply) => debug!(channel = %channel, reply = ?reply, "Channel ensured"),
        Err(e) => warn!(channel = %channel, error = %e, "Failed to create channel"),
    }

    reconciler.lock().await.select_channel(channel);
    println!("-- #{channel} --");
    match session.get("/api/history", &[("channel", channel)]).await {
        Ok(reply) => replay(reconciler, &reply).await,
        Err(e) => warn!(channel = %channel, error = %e, "Failed to load history"),
    }
}

async fn open_private(session: &Session, reconciler: &Shared, peer: &str) {
    reconciler.lock().await.select_private_peer(peer);
    println!("-- @{peer} --");
    let query = [("user1", session.user.as_str()), ("user2", peer)];
    match session.get("/api/private-history", &query).await {
        Ok(reply) => replay(reconciler, &reply).await,
        Err(e) => warn!(peer = %peer, error = %e, "Failed to load private history"),
    }
}

async fn replay(reconciler: &Shared, reply: &Record) {
    let events: Vec<Event> = reply_data(reply)
        .and_then(|d| d.get("messages"))
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.as_object().cloned())
                .map(Event::from)
                .collect()
        })
        .unwrap_or_default();

    let rendered = reconciler.lock().await.load_history(events);
    for message in &rendered {
        print_outcome(&ApplyOutcome::Rendered(message.clone()));
    }
}

async fn refresh_coordinator(session: &Session, reconciler: &Shared) {
    let roster = match session.get("/api/servers", &[]).await {
        Ok(reply) => parse_roster(&reply),
        Err(e) => {
            warn!(error = %e, "Failed to fetch server roster");
            return;
        }
    };
    match roster {
        Ok(roster) => {
            let mut r = reconciler.lock().await;
            r.infer_from_roster(&roster);
            print_coordinator(r.coordinator());
        }
        Err(e) => warn!(error = %e, "Unreadable server roster"),
    }
}

/// Follow the push stream, reconnecting with the server's retry hint.
async fn follow_forever(session: Session, reconciler: Shared) {
    let mut retry = Duration::from_secs(1);
    loop {
        match follow(&session, &reconciler, &mut retry).await {
            Ok(()) => info!("Push stream closed by gateway"),
            Err(e) => warn!(error = %e, "Push stream failed"),
        }
        tokio::time::sleep(retry).await;
    }
}

async fn follow(session: &Session, reconciler: &Shared, retry: &mut Duration) -> reqwest::Result<()> {
    let response = session
        .http
        .get(session.url("/api/events"))
        .send()
        .await?
        .error_for_status()?;
    info!("Following push stream");

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    while let Some(chunk) = body.next().await {
        for frame in parser.push(&chunk?) {
            if let Some(hint) = frame.retry {
                *retry = hint;
            }
            if !frame.is_message() || frame.data.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&frame.data) {
                Ok(event) => {
                    let outcome = reconciler.lock().await.apply(&event);
                    print_outcome(&outcome);
                }
                Err(e) => debug!(error = %e, "Skipping undecodable push event"),
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Rendered(message) => {
            let place = match message.kind {
                MessageKind::Channel => format!("#{}", message.conversation),
                MessageKind::Private => format!("@{}", message.conversation),
            };
            let time = message
                .timestamp_ms
                .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("[{place}] {time} {}: {}", message.author, message.text);
        }
        ApplyOutcome::CoordinatorChanged(name) => {
            print_coordinator(&CoordinatorView::Confirmed(name.clone()))
        }
        _ => {}
    }
}

fn print_coordinator(view: &CoordinatorView) {
    match view {
        CoordinatorView::Unknown => println!("* coordinator: unknown"),
        CoordinatorView::Inferred(name) => println!("* coordinator: {name} (guess)"),
        CoordinatorView::Confirmed(name) => println!("* coordinator: {name}"),
    }
}

/// Print a backend-reported failure. Returns true when there was one.
fn report_failure(reply: &Record) -> bool {
    let description = reply_data(reply)
        .and_then(|d| d.get("description"))
        .and_then(Value::as_str);
    match description {
        Some(description) => {
            println!("! {description}");
            true
        }
        None => false,
    }
}

fn list_field(reply: &Record, key: &str) -> Vec<String> {
    reply_data(reply)
        .and_then(|d| d.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
