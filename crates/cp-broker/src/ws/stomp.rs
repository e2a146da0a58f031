//! STOMP session over a WebSocket.
//!
//! Each socket gets a reader loop (this task) and a writer task fed by an
//! unbounded channel, so the registry can push MESSAGE frames from any
//! publisher without touching the socket.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use cp_protocol::{Command, Frame, HeartBeat};

use super::framing::Framing;
use crate::AppState;

const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];
const SUPPORTED_VERSIONS: [&str; 3] = ["1.0", "1.1", "1.2"];
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain STOMP-over-WebSocket upgrade at `/ws`.
pub async fn stomp_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!(%addr, "STOMP WebSocket upgrade");
    ws.protocols(STOMP_SUBPROTOCOLS)
        .max_message_size(cp_protocol::MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, Framing::Plain))
}

/// SockJS websocket transport at `/ws/{server}/{session}/websocket`.
pub async fn sockjs_ws_handler(
    ws: WebSocketUpgrade,
    Path((server, session)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!(%server, %session, "SockJS WebSocket upgrade");
    ws.max_message_size(cp_protocol::MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, Framing::SockJs))
}

/// SockJS `/info` endpoint. Only the websocket transport is offered.
pub async fn sockjs_info() -> Json<Value> {
    Json(json!({
        "websocket": true,
        "cookie_needed": false,
        "origins": ["*:*"],
        "entropy": Uuid::new_v4().as_u128() as u32,
    }))
}

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, framing: Framing) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let peer_id = Uuid::new_v4();

    if let Some(open) = framing.open() {
        if ws_sender.send(Message::Text(open.into())).await.is_err() {
            return;
        }
    }

    // ─── Handshake ───────────────────────────────────────────

    let handshake =
        tokio::time::timeout(HANDSHAKE_TIMEOUT, read_connect(&mut ws_receiver, framing)).await;
    let (connect, pipelined) = match handshake {
        Ok(Ok(received)) => received,
        Ok(Err(reason)) => {
            tracing::warn!(%peer_id, %reason, "STOMP handshake failed");
            reject(&mut ws_sender, framing, &reason).await;
            return;
        }
        Err(_) => {
            tracing::warn!(%peer_id, "STOMP handshake timed out");
            reject(&mut ws_sender, framing, "Handshake timed out").await;
            return;
        }
    };

    if let Some(offered) = connect.get("accept-version") {
        if !offered
            .split(',')
            .any(|v| SUPPORTED_VERSIONS.contains(&v.trim()))
        {
            reject(&mut ws_sender, framing, "Supported protocol versions are 1.0,1.1,1.2").await;
            return;
        }
    }

    let every = state.config.broker.heartbeat_ms;
    let ours = HeartBeat::new(every, every);
    let theirs = connect
        .get("heart-beat")
        .and_then(HeartBeat::parse)
        .unwrap_or_default();
    let (send_every, expect_every) = ours.negotiate(theirs);

    let connected = Frame::connected(&peer_id.to_string(), ours);
    if ws_sender
        .send(Message::Text(framing.encode(&connected).into()))
        .await
        .is_err()
    {
        return;
    }

    tracing::info!(
        %peer_id,
        host = connect.get("host").unwrap_or(""),
        ?send_every,
        ?expect_every,
        "STOMP session connected"
    );

    // ─── Session ─────────────────────────────────────────────

    let (tx, rx) = mpsc::unbounded_channel::<Frame>();
    state.registry.register(peer_id, tx.clone());
    let send_task = tokio::spawn(write_loop(ws_sender, rx, framing, send_every));

    let session = Session {
        peer_id,
        state: state.clone(),
        tx,
    };
    let grace = expect_every.map(|d| d * 2);

    'session: {
        for frame in pipelined {
            if session.handle(frame).is_break() {
                break 'session;
            }
        }

        loop {
            let next = match grace {
                Some(grace) => match tokio::time::timeout(grace, ws_receiver.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(%peer_id, "No heart-beat from client, closing");
                        break 'session;
                    }
                },
                None => ws_receiver.next().await,
            };

            let text = match next {
                Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        session.error("Frame is not valid UTF-8", "");
                        break 'session;
                    }
                },
                Some(Ok(Message::Close(_))) | None => break 'session,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(%peer_id, "WebSocket error: {}", e);
                    break 'session;
                }
            };

            match framing.decode(&text) {
                Ok(frames) => {
                    for frame in frames.into_iter().flatten() {
                        if session.handle(frame).is_break() {
                            break 'session;
                        }
                    }
                }
                Err(e) => {
                    session.error("Malformed frame", &e.to_string());
                    break 'session;
                }
            }
        }
    }

    // Cleanup
    state.registry.unregister(&peer_id);
    drop(session);
    if let Err(e) = send_task.await {
        tracing::warn!(%peer_id, "Writer task failed: {}", e);
    }
    tracing::info!(%peer_id, "STOMP session closed");
}

/// Wait for CONNECT (or STOMP). Frames pipelined behind it are returned too.
async fn read_connect(
    ws_receiver: &mut WsStream,
    framing: Framing,
) -> Result<(Frame, Vec<Frame>), String> {
    loop {
        let text = match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Close(_))) | None => return Err("Connection closed".into()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.to_string()),
        };
        let mut frames = framing
            .decode(&text)
            .map_err(|e| e.to_string())?
            .into_iter()
            .flatten();
        let Some(first) = frames.next() else {
            continue;
        };
        return match first.command {
            Command::Connect | Command::Stomp => Ok((first, frames.collect())),
            other => Err(format!("Expected CONNECT, got {}", other)),
        };
    }
}

async fn reject(ws_sender: &mut WsSink, framing: Framing, reason: &str) {
    let error = Frame::error(reason, "");
    let _ = ws_sender
        .send(Message::Text(framing.encode(&error).into()))
        .await;
    if let Some(close) = framing.close(1002, reason) {
        let _ = ws_sender.send(Message::Text(close.into())).await;
    }
    let _ = ws_sender.close().await;
}

/// Forward queued frames to the socket and emit heart-beats. Ends after an
/// ERROR frame or once every sender is gone.
async fn write_loop(
    mut ws_sender: WsSink,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    framing: Framing,
    send_every: Option<Duration>,
) {
    let period = send_every.unwrap_or(Duration::from_secs(3600));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let fatal = frame.command == Command::Error;
                if ws_sender
                    .send(Message::Text(framing.encode(&frame).into()))
                    .await
                    .is_err()
                {
                    return;
                }
                if fatal {
                    break;
                }
            }
            _ = heartbeat.tick(), if send_every.is_some() => {
                if ws_sender.send(Message::Text(framing.heartbeat().into())).await.is_err() {
                    return;
                }
            }
        }
    }

    if let Some(close) = framing.close(3000, "Go away!") {
        let _ = ws_sender.send(Message::Text(close.into())).await;
    }
    let _ = ws_sender.close().await;
}

/// Per-connection command handling.
struct Session {
    peer_id: Uuid,
    state: Arc<AppState>,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Session {
    fn send(&self, frame: Frame) {
        let _ = self.tx.send(frame);
    }

    fn error(&self, message: &str, details: &str) {
        tracing::warn!(peer_id = %self.peer_id, %message, "Sending ERROR frame");
        self.send(Frame::error(message, details));
    }

    fn handle(&self, frame: Frame) -> ControlFlow<()> {
        let registry = &self.state.registry;
        match frame.command {
            Command::Subscribe => {
                let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination"))
                else {
                    self.error("SUBSCRIBE requires id and destination headers", "");
                    return ControlFlow::Break(());
                };
                if !registry.subscribe(&self.peer_id, id, destination) {
                    self.error("Duplicate subscription id", id);
                    return ControlFlow::Break(());
                }
            }
            Command::Unsubscribe => {
                let Some(id) = frame.get("id") else {
                    self.error("UNSUBSCRIBE requires an id header", "");
                    return ControlFlow::Break(());
                };
                registry.unsubscribe(&self.peer_id, id);
            }
            Command::Send => {
                let Some(destination) = frame.get("destination") else {
                    self.error("SEND requires a destination header", "");
                    return ControlFlow::Break(());
                };
                if !destination.starts_with("/topic/") {
                    self.error("Only /topic/ destinations are supported", destination);
                    return ControlFlow::Break(());
                }
                registry.publish(destination, &frame.body);
            }
            Command::Disconnect => {
                if let Some(receipt) = frame.get("receipt") {
                    self.send(Frame::receipt(receipt));
                }
                tracing::debug!(peer_id = %self.peer_id, "DISCONNECT");
                return ControlFlow::Break(());
            }
            Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => {
                tracing::debug!(peer_id = %self.peer_id, command = %frame.command, "Ignored");
            }
            Command::Connect | Command::Stomp => {
                self.error("Already connected", "");
                return ControlFlow::Break(());
            }
            Command::Connected | Command::Message | Command::Receipt | Command::Error => {
                self.error("Unexpected server command", frame.command.as_str());
                return ControlFlow::Break(());
            }
        }

        if let Some(receipt) = frame.get("receipt") {
            self.send(Frame::receipt(receipt));
        }
        ControlFlow::Continue(())
    }
}
