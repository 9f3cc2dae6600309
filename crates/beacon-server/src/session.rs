//! WebSocket session glue.
//!
//! Each connected client gets one session task that decodes JSON
//! command frames, feeds them through the dispatch core, and fans
//! subscribed broadcasts back out over the socket. Client identity
//! comes from the fronting proxy (`x-beacon-user` header) or a
//! `user_id` query parameter; token verification happens upstream.

use crate::http::AppState;
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use beacon_core::{
    ChannelPath, ClientInfo, Dispatcher, Envelope, LiveError, PublishEvent, SessionId,
    SubscribeEvent,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// JSON command frames exchanged over the live socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Subscribe to a channel.
    Subscribe { id: u64, channel: String },

    /// Unsubscribe from a channel.
    Unsubscribe { id: u64, channel: String },

    /// Publish on a channel.
    Publish {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        channel: String,
        payload: Value,
    },

    /// Client liveness probe.
    Ping,

    /// Session established.
    Connected { session: String },

    /// Request accepted.
    Ack { id: u64 },

    /// Request rejected.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        code: u16,
        message: String,
    },

    /// Broadcast delivery.
    Message { channel: String, payload: Value },

    /// Liveness reply.
    Pong,
}

/// Build the rejection frame for an error, leaking no internal detail.
fn rejection_frame(id: Option<u64>, err: &LiveError) -> Frame {
    let message = if err.is_client_fault() {
        err.to_string()
    } else {
        "internal error".to_string()
    };
    Frame::Error {
        id,
        code: err.code(),
        message,
    }
}

/// Decode an envelope payload for delivery; non-JSON payloads are
/// delivered as a string.
fn delivery_payload(envelope: &Envelope) -> Value {
    serde_json::from_slice(&envelope.payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&envelope.payload).into_owned()))
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user_id = headers
        .get("x-beacon-user")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| params.get("user_id").cloned())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    ws.on_upgrade(move |socket| handle_session(socket, state, user_id))
}

/// Handle one WebSocket session.
async fn handle_session(socket: WebSocket, state: Arc<AppState>, user_id: i64) {
    let _metrics_guard = SessionMetricsGuard::new();

    let client = ClientInfo::new(SessionId::generate(), user_id);
    debug!(session = %client.session, user_id, "Session connected");

    let (mut sender, mut receiver) = socket.split();

    let connected = Frame::Connected {
        session: client.session.as_str().to_string(),
    };
    if send_frame(&mut sender, &connected).await.is_err() {
        return;
    }

    // Forwarder task per subscription, fanned into one mpsc.
    let mut forwarders: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<Arc<Envelope>>();

    loop {
        tokio::select! {
            biased;

            Some(envelope) = sub_rx.recv() => {
                let frame = Frame::Message {
                    channel: envelope.channel.clone(),
                    payload: delivery_payload(&envelope),
                };
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(
                            &text,
                            &client,
                            &state,
                            &mut sender,
                            &mut forwarders,
                            &sub_tx,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        if handle_text(
                            &text,
                            &client,
                            &state,
                            &mut sender,
                            &mut forwarders,
                            &sub_tx,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = %client.session, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %client.session, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    for (_, handle) in forwarders {
        handle.abort();
    }
    state.dispatcher.session_closed(&client);

    let stats = state.dispatcher.bus().stats();
    metrics::set_active_channels(stats.channel_count);
    metrics::set_active_subscriptions(stats.total_subscriptions);

    debug!(session = %client.session, "Session disconnected");
}

/// Decode and handle one inbound frame.
async fn handle_text(
    text: &str,
    client: &ClientInfo,
    state: &Arc<AppState>,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    forwarders: &mut HashMap<String, tokio::task::JoinHandle<()>>,
    sub_tx: &mpsc::UnboundedSender<Arc<Envelope>>,
) -> Result<()> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            let err = LiveError::InvalidPayload(e.to_string());
            return send_frame(sender, &rejection_frame(None, &err)).await;
        }
    };

    let start = Instant::now();
    handle_frame(&frame, client, state, sender, forwarders, sub_tx).await?;
    metrics::record_dispatch_latency(start.elapsed().as_secs_f64());
    Ok(())
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: &Frame,
    client: &ClientInfo,
    state: &Arc<AppState>,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    forwarders: &mut HashMap<String, tokio::task::JoinHandle<()>>,
    sub_tx: &mpsc::UnboundedSender<Arc<Envelope>>,
) -> Result<()> {
    let dispatcher = &state.dispatcher;
    match frame {
        Frame::Subscribe { id, channel } => {
            debug!(session = %client.session, channel = %channel, "Subscribe request");

            let response = match subscribe(dispatcher, client, channel).await {
                Ok(mut rx) => {
                    let tx = sub_tx.clone();
                    let handle = tokio::spawn(async move {
                        loop {
                            match rx.recv().await {
                                Ok(envelope) => {
                                    if tx.send(envelope).is_err() {
                                        break; // Session gone
                                    }
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            }
                        }
                    });
                    forwarders.insert(channel.clone(), handle);
                    metrics::record_subscribe("accepted");
                    let stats = dispatcher.bus().stats();
                    metrics::set_active_channels(stats.channel_count);
                    metrics::set_active_subscriptions(stats.total_subscriptions);
                    Frame::Ack { id: *id }
                }
                Err(e) => {
                    Dispatcher::log_rejection(channel, &e);
                    metrics::record_subscribe("rejected");
                    if matches!(e, LiveError::NoHandlerForPath(_)) {
                        metrics::record_routing_miss();
                    }
                    rejection_frame(Some(*id), &e)
                }
            };

            send_frame(sender, &response).await?;
        }

        Frame::Unsubscribe { id, channel } => {
            debug!(session = %client.session, channel = %channel, "Unsubscribe request");

            if let Some(handle) = forwarders.remove(channel) {
                handle.abort();
            }

            let response = match unsubscribe(dispatcher, client, channel) {
                Ok(()) => {
                    let stats = dispatcher.bus().stats();
                    metrics::set_active_channels(stats.channel_count);
                    metrics::set_active_subscriptions(stats.total_subscriptions);
                    Frame::Ack { id: *id }
                }
                Err(e) => rejection_frame(Some(*id), &e),
            };

            send_frame(sender, &response).await?;
        }

        Frame::Publish {
            id,
            channel,
            payload,
        } => {
            debug!(session = %client.session, channel = %channel, "Publish");

            let response = match publish(state, client, channel, payload).await {
                Ok(outcome) => {
                    metrics::record_publish(if outcome.broadcast {
                        "broadcast"
                    } else {
                        "swallowed"
                    });
                    id.map(|id| Frame::Ack { id })
                }
                Err(e) => {
                    Dispatcher::log_rejection(channel, &e);
                    metrics::record_publish("rejected");
                    if matches!(e, LiveError::NoHandlerForPath(_)) {
                        metrics::record_routing_miss();
                    }
                    Some(rejection_frame(*id, &e))
                }
            };

            if let Some(response) = response {
                send_frame(sender, &response).await?;
            }
        }

        Frame::Ping => {
            send_frame(sender, &Frame::Pong).await?;
        }

        _ => {
            warn!(session = %client.session, frame = ?frame, "Unexpected frame from client");
        }
    }

    Ok(())
}

async fn subscribe(
    dispatcher: &Dispatcher,
    client: &ClientInfo,
    channel: &str,
) -> Result<broadcast::Receiver<Arc<Envelope>>, LiveError> {
    let path = ChannelPath::parse(channel)?;
    let subscription = dispatcher
        .handle_subscribe(client, SubscribeEvent::new(path))
        .await?;
    Ok(subscription.receiver)
}

fn unsubscribe(
    dispatcher: &Dispatcher,
    client: &ClientInfo,
    channel: &str,
) -> Result<(), LiveError> {
    let path = ChannelPath::parse(channel)?;
    dispatcher.handle_unsubscribe(client, &path)
}

async fn publish(
    state: &Arc<AppState>,
    client: &ClientInfo,
    channel: &str,
    payload: &Value,
) -> Result<beacon_core::PublishOutcome, LiveError> {
    let path = ChannelPath::parse(channel)?;
    let bytes = serde_json::to_vec(payload)
        .map_err(|e| LiveError::InvalidPayload(e.to_string()))?;
    if bytes.len() > state.config.limits.max_payload_size {
        return Err(LiveError::InvalidPayload("payload too large".into()));
    }
    state
        .dispatcher
        .handle_publish(client, PublishEvent::new(path, Bytes::from(bytes)))
        .await
}

/// Send a frame to the WebSocket.
async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &Frame,
) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    sender.send(Message::Text(text)).await?;
    Ok(())
}
