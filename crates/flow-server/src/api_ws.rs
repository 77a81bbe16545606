//! Persistent subscriptions over WebSocket.
//!
//! `GET /ws?prefix=..&format=..` upgrades after the bearer token and the
//! prefix have both been validated, so a rejected handshake never touches
//! the registry. The first frame on every connection is
//! `{"type":"connected","prefix_used":..}`; event notifications follow.

use crate::liveness::{IdleAction, Liveness};
use crate::middleware::{bearer_token, resolve_principal, Principal};
use crate::registry::ConnectionId;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, Query, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use flow_ids::{resolve_prefix, Prefix, PrefixFormat};
use flow_types::{format_timestamp, now_micros};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ApiError;

/// Query parameters for the WebSocket handshake.
///
/// `token` is accepted for clients that cannot set headers; the
/// `Authorization` header takes precedence when both are present.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub prefix: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Ping,
}

/// Frames the server sends besides event notifications.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Connected { prefix_used: Prefix },
    Heartbeat { timestamp: String },
    Pong { timestamp: String },
    Error { message: String },
}

/// Builds the reply to a text frame from the client.
///
/// Anything that is not a recognised message gets an error frame; the
/// connection stays open.
pub fn reply_to(text: &str) -> OutgoingMessage {
    match serde_json::from_str::<IncomingMessage>(text) {
        Ok(IncomingMessage::Ping) => OutgoingMessage::Pong {
            timestamp: format_timestamp(now_micros()),
        },
        Err(e) => OutgoingMessage::Error {
            message: format!("invalid message format: {}", e),
        },
    }
}

/// `GET /ws`: authenticates, resolves the prefix and upgrades.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
) -> Response {
    let Some(token) = bearer_token(&headers).or(params.token.clone()) else {
        tracing::warn!(remote_addr = %addr, "websocket connect missing bearer token");
        return ApiError::Unauthorized("missing bearer token".to_string()).into_response();
    };

    let prefix = match parse_subscription(&params) {
        Ok(prefix) => prefix,
        Err(e) => {
            tracing::warn!(remote_addr = %addr, "websocket connect with invalid prefix: {}", e);
            return e.into_response();
        }
    };

    let principal = match resolve_principal(&state, token).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(remote_addr = %addr, "websocket auth failed: {}", e);
            return e.into_response();
        }
    };

    tracing::info!(
        remote_addr = %addr,
        principal = %principal.label(),
        prefix = %prefix,
        "websocket auth success"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, principal, prefix))
}

fn parse_subscription(params: &WsConnectParams) -> Result<Prefix, ApiError> {
    let format = match params.format.as_deref() {
        Some(tag) => tag.parse::<PrefixFormat>()?,
        None => PrefixFormat::default(),
    };
    Ok(resolve_prefix(&params.prefix, format)?)
}

type WsSink = SplitSink<WebSocket, AxumMessage>;

async fn send_frame(sink: &mut WsSink, frame: &OutgoingMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sink.send(AxumMessage::Text(json.into())).await,
        Err(e) => {
            tracing::error!("failed to serialize WebSocket frame: {}", e);
            Ok(())
        }
    }
}

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy)]
enum CloseReason {
    ClientClosed,
    Transport,
    Unresponsive,
    Evicted,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, principal: Principal, prefix: Prefix) {
    let settings = state.liveness;
    let registry = state.dispatcher.registry().clone();
    let mut liveness = Liveness::new(settings, Instant::now());

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(settings.outbound_buffer);

    // Registering before the acknowledgement means no event appended after
    // the client sees `connected` can be missed. Queued notifications are
    // only drained by this loop, so they still arrive after the ack.
    let connection_id: ConnectionId = registry.register(prefix.clone(), tx).await;
    liveness.open(Instant::now());

    tracing::info!(
        connection_id = %connection_id,
        principal = %principal.label(),
        prefix = %prefix,
        "subscriber connected"
    );

    let reason = if send_frame(
        &mut sink,
        &OutgoingMessage::Connected {
            prefix_used: prefix.clone(),
        },
    )
    .await
    .is_err()
    {
        CloseReason::Transport
    } else {
        run_connection(&mut sink, &mut stream, &mut rx, &mut liveness, settings.heartbeat_interval).await
    };

    liveness.begin_close();
    registry.unregister(&prefix, connection_id).await;
    if let Err(e) = sink.close().await {
        tracing::debug!(connection_id = %connection_id, "websocket close failed: {}", e);
    }
    liveness.finish_close();

    tracing::info!(
        connection_id = %connection_id,
        prefix = %prefix,
        reason = ?reason,
        "subscriber disconnected"
    );
}

async fn run_connection(
    sink: &mut WsSink,
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
    rx: &mut mpsc::Receiver<String>,
    liveness: &mut Liveness,
    heartbeat_interval: std::time::Duration,
) -> CloseReason {
    let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = liveness.deadline();
        tokio::select! {
            incoming = stream.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("websocket receive failed: {}", e);
                        return CloseReason::Transport;
                    }
                    None => return CloseReason::ClientClosed,
                };
                liveness.record_traffic(Instant::now());
                let reply = match msg {
                    AxumMessage::Text(text) => Some(reply_to(text.as_str())),
                    AxumMessage::Binary(_) => Some(OutgoingMessage::Error {
                        message: "binary frames are not supported".to_string(),
                    }),
                    AxumMessage::Close(_) => return CloseReason::ClientClosed,
                    AxumMessage::Ping(_) | AxumMessage::Pong(_) => None,
                };
                if let Some(reply) = reply {
                    if send_frame(sink, &reply).await.is_err() {
                        return CloseReason::Transport;
                    }
                }
            }
            outbound = rx.recv() => {
                let Some(frame) = outbound else {
                    // The dispatcher dropped our sender after a failed delivery.
                    return CloseReason::Evicted;
                };
                if sink.send(AxumMessage::Text(frame.into())).await.is_err() {
                    return CloseReason::Transport;
                }
            }
            _ = heartbeat.tick() => {
                let frame = OutgoingMessage::Heartbeat {
                    timestamp: format_timestamp(now_micros()),
                };
                if send_frame(sink, &frame).await.is_err() {
                    return CloseReason::Transport;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                match liveness.on_deadline(Instant::now()) {
                    IdleAction::Probe => {
                        if sink.send(AxumMessage::Ping(Bytes::new())).await.is_err() {
                            return CloseReason::Transport;
                        }
                    }
                    IdleAction::Close => return CloseReason::Unresponsive,
                }
            }
        }
    }
}
