//! Request handlers backed by the RPC client.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{GatewayError, GatewayState};
use crate::event::Record;

type ApiResult = Result<Json<Record>, GatewayError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginRequest {
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ChannelRequest {
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PublishRequest {
    user: Option<String>,
    channel: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct MessageRequest {
    src: Option<String>,
    dst: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct HistoryQuery {
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PrivateHistoryQuery {
    user1: Option<String>,
    user2: Option<String>,
}

/// A present, non-empty field.
fn required(value: Option<String>, name: &'static str) -> Result<String, GatewayError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::MissingField(name))
}

pub(super) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(super) async fn clock(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "clock": state.clock.current() }))
}

pub(super) async fn login(
    State(state): State<GatewayState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult {
    let user = required(req.user, "user")?;
    Ok(Json(state.backend.login(&user).await?))
}

pub(super) async fn users(State(state): State<GatewayState>) -> ApiResult {
    Ok(Json(state.backend.users().await?))
}

pub(super) async fn channels(State(state): State<GatewayState>) -> ApiResult {
    Ok(Json(state.backend.channels().await?))
}

pub(super) async fn create_channel(
    State(state): State<GatewayState>,
    Json(req): Json<ChannelRequest>,
) -> ApiResult {
    let channel = required(req.channel, "channel")?;
    Ok(Json(state.backend.create_channel(&channel).await?))
}

pub(super) async fn publish(
    State(state): State<GatewayState>,
    Json(req): Json<PublishRequest>,
) -> ApiResult {
    let user = required(req.user, "user")?;
    let channel = required(req.channel, "channel")?;
    let message = required(req.message, "message")?;
    Ok(Json(state.backend.publish(&user, &channel, &message).await?))
}

pub(super) async fn message(
    State(state): State<GatewayState>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    let src = required(req.src, "src")?;
    let dst = required(req.dst, "dst")?;
    let message = required(req.message, "message")?;
    Ok(Json(state.backend.message(&src, &dst, &message).await?))
}

pub(super) async fn history(
    State(state): State<GatewayState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult {
    let channel = required(query.channel, "channel")?;
    Ok(Json(state.backend.history(&channel).await?))
}

pub(super) async fn private_history(
    State(state): State<GatewayState>,
    Query(query): Query<PrivateHistoryQuery>,
) -> ApiResult {
    let user1 = required(query.user1, "user1")?;
    let user2 = required(query.user2, "user2")?;
    Ok(Json(state.backend.private_history(&user1, &user2).await?))
}

pub(super) async fn servers(State(state): State<GatewayState>) -> ApiResult {
    Ok(Json(state.backend.list().await?))
}
