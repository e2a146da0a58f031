//! Connection lifecycle manager.
//!
//! One task per started client owns the socket. It connects, performs the
//! STOMP handshake, replays the desired subscriptions, pumps frames into the
//! fan-out and, when the link drops, retries with exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use cp_protocol::{Command, Frame, HeartBeat};

use crate::backoff::Backoff;
use crate::client::Shared;
use crate::events::Event;
use crate::registry::SubscriptionId;
use crate::transport::{Packet, PacketSink, PacketStream, TransportError};

/// Connection lifecycle states reported to status listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// STOMP session established
    Connected,
    /// Link lost, waiting to retry
    Reconnecting,
    /// Not connected: never started, stopped, or the last attempt failed
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests from client handles to the manager task.
#[derive(Debug)]
pub(crate) enum ManagerCommand {
    /// Subscribe any desired topic that has no live handle yet.
    Reconcile,
    /// Send UNSUBSCRIBE for a handle the registry already dropped.
    Release(SubscriptionId),
    /// Send DISCONNECT and exit.
    Shutdown,
}

/// An open STOMP session.
struct Session {
    sink: PacketSink,
    stream: PacketStream,
    send_every: Option<Duration>,
    expect_every: Option<Duration>,
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(TransportError),
}

/// Long-lived manager: connect, run the session, back off, repeat.
pub(crate) async fn connection_manager(
    shared: Arc<Shared>,
    generation: u64,
    mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
) {
    let mut backoff = Backoff::new(shared.options.reconnect);

    loop {
        let attempt = tokio::select! {
            result = tokio::time::timeout(shared.options.connect_timeout, open_session(&shared)) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
            _ = until_shutdown(&mut commands) => return,
        };

        match attempt {
            Ok(session) => {
                if !shared.is_current(generation) {
                    let mut sink = session.sink;
                    let _ = sink.send(Frame::disconnect(None).into()).await;
                    let _ = sink.close().await;
                    return;
                }
                info!(endpoint = %shared.options.endpoint, "STOMP session established");
                backoff.reset();
                shared.set_state(generation, ConnectionState::Connected);

                let end = run_session(&shared, generation, session, &mut commands).await;
                shared.invalidate(generation);
                match end {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Closed => info!("Connection closed"),
                    SessionEnd::Failed(e) => {
                        warn!("Connection failed: {}", e);
                        shared.set_state(generation, ConnectionState::Disconnected);
                    }
                }
            }
            Err(e) => {
                warn!(endpoint = %shared.options.endpoint, "Connect attempt failed: {}", e);
                shared.set_state(generation, ConnectionState::Disconnected);
            }
        }

        if !shared.is_current(generation) {
            return;
        }
        shared.set_state(generation, ConnectionState::Reconnecting);

        let delay = backoff.next_delay();
        info!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = until_shutdown(&mut commands) => return,
        }

        if !shared.is_current(generation) {
            debug!("Client disconnected while waiting to reconnect");
            return;
        }
    }
}

/// Resolve once a shutdown is requested; the last client handle sends one
/// when dropped. Other commands are meaningless without a session and are
/// dropped.
async fn until_shutdown(commands: &mut mpsc::UnboundedReceiver<ManagerCommand>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, ManagerCommand::Shutdown) {
            return;
        }
    }
}

/// Open the transport and complete the CONNECT / CONNECTED exchange.
async fn open_session(shared: &Shared) -> Result<Session, TransportError> {
    let endpoint = &shared.options.endpoint;
    let (mut sink, mut stream) = shared.connector.connect(endpoint).await?;

    let ours = shared.options.heart_beat;
    let host = endpoint.host_str().unwrap_or("localhost");
    sink.send(Frame::connect(host, ours).into()).await?;

    let connected = loop {
        match stream.next().await {
            None => return Err(TransportError::Closed),
            Some(Err(e)) => return Err(e),
            Some(Ok(Packet::Heartbeat)) => continue,
            Some(Ok(Packet::Frame(frame))) => match frame.command {
                Command::Connected => break frame,
                Command::Error => {
                    let message = frame.get("message").unwrap_or("no message").to_string();
                    return Err(TransportError::Rejected(message));
                }
                other => debug!(command = %other, "Ignoring frame before CONNECTED"),
            },
        }
    };

    let theirs = connected
        .get("heart-beat")
        .and_then(HeartBeat::parse)
        .unwrap_or_default();
    let (send_every, expect_every) = ours.negotiate(theirs);
    debug!(
        version = connected.get("version").unwrap_or("1.0"),
        ?send_every,
        ?expect_every,
        "CONNECTED"
    );

    Ok(Session {
        sink,
        stream,
        send_every,
        expect_every,
    })
}

/// Pump one session until it ends.
async fn run_session(
    shared: &Shared,
    generation: u64,
    session: Session,
    commands: &mut mpsc::UnboundedReceiver<ManagerCommand>,
) -> SessionEnd {
    let Session {
        mut sink,
        mut stream,
        send_every,
        expect_every,
    } = session;

    if let Err(e) = subscribe_desired(shared, generation, &mut sink).await {
        return SessionEnd::Failed(e);
    }

    // Intervals are only polled when negotiated; the placeholder period is never used.
    let period = send_every.unwrap_or(Duration::from_secs(3600));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Silence for two expected periods counts as a dead link.
    let grace = expect_every.map(|d| d * 2);
    let idle = tokio::time::sleep(grace.unwrap_or(Duration::from_secs(3600)));
    tokio::pin!(idle);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(ManagerCommand::Shutdown) => {
                    let _ = sink.send(Frame::disconnect(None).into()).await;
                    let _ = sink.close().await;
                    info!("STOMP session closed by client");
                    return SessionEnd::Shutdown;
                }
                Some(ManagerCommand::Reconcile) => {
                    if let Err(e) = subscribe_desired(shared, generation, &mut sink).await {
                        return SessionEnd::Failed(e);
                    }
                }
                Some(ManagerCommand::Release(id)) => {
                    debug!(subscription = %id, "UNSUBSCRIBE");
                    if let Err(e) = sink.send(Frame::unsubscribe(&id.to_string()).into()).await {
                        return SessionEnd::Failed(e);
                    }
                }
            },

            packet = stream.next() => {
                if let Some(grace) = grace {
                    idle.as_mut().reset(Instant::now() + grace);
                }
                match packet {
                    None | Some(Err(TransportError::Closed)) => return SessionEnd::Closed,
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    Some(Ok(Packet::Heartbeat)) => {}
                    Some(Ok(Packet::Frame(frame))) => handle_frame(shared, generation, frame),
                }
            }

            _ = heartbeat.tick(), if send_every.is_some() => {
                if let Err(e) = sink.send(Packet::Heartbeat).await {
                    return SessionEnd::Failed(e);
                }
            }

            _ = &mut idle, if grace.is_some() => {
                warn!("No heart-beat from broker, dropping connection");
                return SessionEnd::Closed;
            }
        }
    }
}

async fn subscribe_desired(
    shared: &Shared,
    generation: u64,
    sink: &mut PacketSink,
) -> Result<(), TransportError> {
    for (id, topic) in shared.reconcile(generation) {
        debug!(subscription = %id, destination = %topic, "SUBSCRIBE");
        sink.send(Frame::subscribe(&id.to_string(), topic.destination()).into())
            .await?;
    }
    Ok(())
}

/// Route one inbound frame. Nothing here can end the session.
fn handle_frame(shared: &Shared, generation: u64, frame: Frame) {
    match frame.command {
        Command::Message => {
            let Some(subscription) = frame.get("subscription") else {
                debug!("MESSAGE without subscription header");
                return;
            };
            let Some(topic) = shared.resolve(generation, subscription) else {
                debug!(%subscription, "Dropping message for released subscription");
                return;
            };
            match Event::decode(topic.kind(), &frame.body) {
                Ok(event) => {
                    shared.dispatch(generation, &event);
                }
                Err(e) => warn!(destination = %topic, "Dropping malformed payload: {}", e),
            }
        }
        Command::Error => {
            error!(
                message = frame.get("message").unwrap_or(""),
                body = %frame.body,
                "Broker sent ERROR frame"
            );
        }
        Command::Receipt => debug!(receipt = frame.get("receipt-id").unwrap_or(""), "RECEIPT"),
        other => debug!(command = %other, "Ignoring unexpected frame"),
    }
}
