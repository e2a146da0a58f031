//! How STOMP text travels inside WebSocket messages for each endpoint.

use cp_protocol::sockjs::{self, SockJsFrame};
use cp_protocol::{Frame, FrameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One STOMP frame (or heart-beat) per text message.
    Plain,
    /// SockJS websocket transport: `a[...]` out, JSON string arrays in.
    SockJs,
}

impl Framing {
    /// Text sent once the socket is up, before any STOMP traffic.
    pub fn open(&self) -> Option<String> {
        match self {
            Self::Plain => None,
            Self::SockJs => Some(SockJsFrame::Open.encode()),
        }
    }

    pub fn encode(&self, frame: &Frame) -> String {
        match self {
            Self::Plain => frame.encode(),
            Self::SockJs => SockJsFrame::Messages(vec![frame.encode()]).encode(),
        }
    }

    pub fn heartbeat(&self) -> String {
        match self {
            Self::Plain => "\n".to_string(),
            Self::SockJs => SockJsFrame::Heartbeat.encode(),
        }
    }

    /// Text sent before closing, if the framing has one.
    pub fn close(&self, code: u16, reason: &str) -> Option<String> {
        match self {
            Self::Plain => None,
            Self::SockJs => Some(
                SockJsFrame::Close {
                    code,
                    reason: reason.to_string(),
                }
                .encode(),
            ),
        }
    }

    /// Decode one inbound text message. `None` entries are heart-beats.
    pub fn decode(&self, text: &str) -> Result<Vec<Option<Frame>>, FrameError> {
        match self {
            Self::Plain => Ok(vec![Frame::decode(text)?]),
            Self::SockJs => sockjs::decode_messages(text)?
                .iter()
                .map(|m| Frame::decode(m))
                .collect(),
        }
    }
}
