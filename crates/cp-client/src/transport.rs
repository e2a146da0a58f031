//! Transport adapter: moves STOMP packets over a WebSocket.
//!
//! [`Connector`] is the seam between the lifecycle manager and the socket.
//! [`WsConnector`] speaks either plain WebSocket or the SockJS websocket
//! transport; tests plug in an in-memory connector.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, stream, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite};
use url::Url;

use cp_common::TransportMode;
use cp_protocol::sockjs::{self, SockJsFrame};
use cp_protocol::{Frame, FrameError};

/// Transport-level failures. None of these reach listeners; they only
/// drive the connection state machine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("Handshake rejected: {0}")]
    Rejected(String),

    #[error("Handshake timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,
}

/// What travels over the socket: a frame or a bare-EOL heart-beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Frame(Frame),
    Heartbeat,
}

impl Packet {
    pub fn encode(&self) -> String {
        match self {
            Self::Frame(frame) => frame.encode(),
            Self::Heartbeat => "\n".to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(match Frame::decode(text)? {
            Some(frame) => Self::Frame(frame),
            None => Self::Heartbeat,
        })
    }
}

impl From<Frame> for Packet {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

pub type PacketSink = Pin<Box<dyn Sink<Packet, Error = TransportError> + Send>>;
pub type PacketStream = Pin<Box<dyn Stream<Item = Result<Packet, TransportError>> + Send>>;

/// Opens a packet link to the broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> Result<(PacketSink, PacketStream), TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector {
    mode: TransportMode,
}

impl WsConnector {
    pub fn new(mode: TransportMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Url) -> Result<(PacketSink, PacketStream), TransportError> {
        let url = websocket_url(endpoint, self.mode)?;
        tracing::debug!(%url, mode = ?self.mode, "Opening WebSocket");

        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        let (ws_write, ws_read) = ws_stream.split();

        let (sink, stream): (PacketSink, PacketStream) = match self.mode {
            TransportMode::Websocket => (
                Box::pin(ws_write.with(
                    |packet: Packet| {
                        future::ready(Ok::<_, TransportError>(tungstenite::Message::Text(
                            packet.encode(),
                        )))
                    },
                )),
                Box::pin(
                    ws_read
                        .map(|msg| stream::iter(websocket_packets(msg)))
                        .flatten(),
                ),
            ),
            TransportMode::Sockjs => (
                Box::pin(ws_write.with(
                    |packet: Packet| {
                        let text = sockjs::encode_messages(&[packet.encode()]);
                        future::ready(Ok::<_, TransportError>(tungstenite::Message::Text(text)))
                    },
                )),
                Box::pin(
                    ws_read
                        .map(|msg| stream::iter(sockjs_packets(msg)))
                        .flatten(),
                ),
            ),
        };

        Ok((sink, stream))
    }
}

/// Resolve the socket URL for a mode. `http(s)` endpoints map to `ws(s)`;
/// SockJS appends `/{server}/{session}/websocket`.
pub fn websocket_url(endpoint: &Url, mode: TransportMode) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(endpoint.to_string()))?;

    if mode == TransportMode::Sockjs {
        let session = uuid::Uuid::new_v4();
        let server = session.as_u128() % 1000;
        let path = format!(
            "{}/{:03}/{}/websocket",
            url.path().trim_end_matches('/'),
            server,
            session.simple()
        );
        url.set_path(&path);
    }
    Ok(url)
}

fn websocket_packets(
    msg: Result<tungstenite::Message, tungstenite::Error>,
) -> Vec<Result<Packet, TransportError>> {
    match msg {
        Ok(tungstenite::Message::Text(text)) => vec![Packet::decode(&text).map_err(Into::into)],
        Ok(tungstenite::Message::Binary(data)) => match String::from_utf8(data) {
            Ok(text) => vec![Packet::decode(&text).map_err(Into::into)],
            Err(_) => vec![Err(FrameError::InvalidUtf8.into())],
        },
        Ok(tungstenite::Message::Close(_)) => vec![Err(TransportError::Closed)],
        Ok(_) => Vec::new(),
        Err(e) => vec![Err(e.into())],
    }
}

fn sockjs_packets(
    msg: Result<tungstenite::Message, tungstenite::Error>,
) -> Vec<Result<Packet, TransportError>> {
    let text = match msg {
        Ok(tungstenite::Message::Text(text)) => text,
        Ok(tungstenite::Message::Close(_)) => return vec![Err(TransportError::Closed)],
        Ok(_) => return Vec::new(),
        Err(e) => return vec![Err(e.into())],
    };
    match SockJsFrame::decode(&text) {
        Ok(SockJsFrame::Open) => Vec::new(),
        Ok(SockJsFrame::Heartbeat) => vec![Ok(Packet::Heartbeat)],
        Ok(SockJsFrame::Messages(messages)) => messages
            .iter()
            .map(|m| Packet::decode(m).map_err(Into::into))
            .collect(),
        Ok(SockJsFrame::Close { code, reason }) => {
            tracing::info!(code, %reason, "SockJS session closed by server");
            vec![Err(TransportError::Closed)]
        }
        Err(e) => vec![Err(e.into())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_schemes() {
        let url = Url::parse("http://localhost:8080/ws").unwrap();
        assert_eq!(
            websocket_url(&url, TransportMode::Websocket).unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        let url = Url::parse("https://labs.example.edu/ws").unwrap();
        assert_eq!(
            websocket_url(&url, TransportMode::Websocket).unwrap().scheme(),
            "wss"
        );
        let url = Url::parse("ftp://labs.example.edu/ws").unwrap();
        assert!(websocket_url(&url, TransportMode::Websocket).is_err());
    }

    #[test]
    fn test_sockjs_url_shape() {
        let url = Url::parse("ws://localhost:8080/ws/").unwrap();
        let sock = websocket_url(&url, TransportMode::Sockjs).unwrap();
        let segments: Vec<&str> = sock.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], "ws");
        assert_eq!(segments[1].len(), 3);
        assert_eq!(segments[2].len(), 32);
        assert_eq!(segments[3], "websocket");
    }

    #[test]
    fn test_packet_decoding() {
        assert_eq!(Packet::decode("\n").unwrap(), Packet::Heartbeat);
        let frame = Frame::unsubscribe("sub-1");
        assert_eq!(
            Packet::decode(&frame.encode()).unwrap(),
            Packet::Frame(frame)
        );
    }

    #[test]
    fn test_sockjs_message_batch() {
        let frame = Frame::receipt("r-1");
        let text = SockJsFrame::Messages(vec![frame.encode(), "\n".into()]).encode();
        let packets = sockjs_packets(Ok(tungstenite::Message::Text(text)));
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[0], Ok(Packet::Frame(ref f)) if f == &frame));
        assert!(matches!(packets[1], Ok(Packet::Heartbeat)));

        let open = sockjs_packets(Ok(tungstenite::Message::Text("o".into())));
        assert!(open.is_empty());
        let closed = sockjs_packets(Ok(tungstenite::Message::Text(r#"c[3000,"bye"]"#.into())));
        assert!(matches!(closed[0], Err(TransportError::Closed)));
    }
}
