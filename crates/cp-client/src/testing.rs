//! In-memory connector for lifecycle tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use cp_protocol::{Command, Frame, HeartBeat};

use crate::client::ClientOptions;
use crate::transport::{Connector, Packet, PacketSink, PacketStream, TransportError};

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Refuse,
    Accept,
    /// Never completes; only the connect timeout ends the attempt.
    Hang,
}

/// Broker side of one accepted connection. Dropping it closes the link.
pub struct MockServer {
    to_client: mpsc::UnboundedSender<Result<Packet, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Packet>,
}

impl MockServer {
    /// Next frame from the client, skipping heart-beats.
    pub async fn expect_frame(&mut self) -> Frame {
        loop {
            match self.from_client.recv().await {
                Some(Packet::Frame(frame)) => return frame,
                Some(Packet::Heartbeat) => continue,
                None => panic!("client closed the link"),
            }
        }
    }

    /// Frame already queued by the client, if any.
    pub fn try_frame(&mut self) -> Option<Frame> {
        while let Ok(packet) = self.from_client.try_recv() {
            if let Packet::Frame(frame) = packet {
                return Some(frame);
            }
        }
        None
    }

    /// Next packet from the client, heart-beats included. `None` once closed.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        self.from_client.recv().await
    }

    /// Answer CONNECT with CONNECTED, heart-beats disabled.
    pub async fn handshake(&mut self) {
        self.handshake_with(HeartBeat::new(0, 0)).await;
    }

    /// Answer CONNECT with CONNECTED offering `heart_beat`. Returns the
    /// heart-beats the client offered.
    pub async fn handshake_with(&mut self, heart_beat: HeartBeat) -> HeartBeat {
        let connect = self.expect_frame().await;
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.get("accept-version"), Some(cp_protocol::ACCEPT_VERSION));
        self.send(Frame::connected("session-1", heart_beat));
        connect.get("heart-beat").and_then(HeartBeat::parse).unwrap()
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.to_client.send(Ok(Packet::Frame(frame)));
    }

    pub fn send_heartbeat(&self) {
        let _ = self.to_client.send(Ok(Packet::Heartbeat));
    }
}

pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// Connector following `script`; once it runs out every attempt is refused.
    pub fn new(
        script: Vec<Outcome>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<MockServer>,
        Arc<Mutex<Vec<Instant>>>,
    ) {
        let (servers, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let connector = Self {
            script: Mutex::new(script.into()),
            attempts: Arc::clone(&attempts),
            servers,
        };
        (connector, rx, attempts)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &Url) -> Result<(PacketSink, PacketStream), TransportError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Refuse);

        match outcome {
            Outcome::Refuse => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
            Outcome::Hang => std::future::pending().await,
            Outcome::Accept => {
                let (client_tx, from_client) = mpsc::unbounded_channel::<Packet>();
                let (to_client, client_rx) = mpsc::unbounded_channel();

                let sink: PacketSink = Box::pin(sink::unfold(client_tx, |tx, packet: Packet| async move {
                    tx.send(packet).map_err(|_| TransportError::Closed)?;
                    Ok::<_, TransportError>(tx)
                }));
                let stream: PacketStream = Box::pin(stream::unfold(client_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                }));

                let _ = self.servers.send(MockServer {
                    to_client,
                    from_client,
                });
                Ok((sink, stream))
            }
        }
    }
}

/// Options for tests: heart-beats off, default backoff.
pub fn options() -> ClientOptions {
    let mut options = ClientOptions::new(Url::parse("ws://localhost:8080/ws").unwrap());
    options.heart_beat = HeartBeat::new(0, 0);
    options.connect_timeout = Duration::from_secs(5);
    options
}
