//! SockJS websocket-transport framing.
//!
//! When the broker endpoint is reached through SockJS, each WebSocket text
//! message from the server is one of `o` (open), `h` (heartbeat),
//! `a[...]` (array of JSON-encoded messages) or `c[code,"reason"]` (close).
//! Client messages travel as a JSON array of strings.

use crate::frame::FrameError;

/// A server-to-client SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

impl SockJsFrame {
    pub fn encode(&self) -> String {
        match self {
            Self::Open => "o".to_string(),
            Self::Heartbeat => "h".to_string(),
            Self::Messages(messages) => format!("a{}", encode_messages(messages)),
            Self::Close { code, reason } => {
                format!("c{}", serde_json::json!([code, reason]))
            }
        }
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let Some(kind) = chars.next() else {
            return Err(FrameError::SockJs("empty frame".into()));
        };
        let rest = chars.as_str();
        match kind {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => decode_messages(rest).map(Self::Messages),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(rest)
                    .map_err(|e| FrameError::SockJs(format!("close frame: {}", e)))?;
                Ok(Self::Close { code, reason })
            }
            other => Err(FrameError::SockJs(format!("unknown frame type '{}'", other))),
        }
    }
}

/// Encode outgoing messages as a JSON array of strings.
pub fn encode_messages(messages: &[String]) -> String {
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a JSON array of strings, as sent by SockJS clients.
pub fn decode_messages(text: &str) -> Result<Vec<String>, FrameError> {
    serde_json::from_str(text).map_err(|e| FrameError::SockJs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_server_frames() {
        assert_eq!(SockJsFrame::decode("o"), Ok(SockJsFrame::Open));
        assert_eq!(SockJsFrame::decode("h"), Ok(SockJsFrame::Heartbeat));
        assert_eq!(
            SockJsFrame::decode(r#"a["CONNECTED\nversion:1.2\n\n\u0000"]"#),
            Ok(SockJsFrame::Messages(vec![
                "CONNECTED\nversion:1.2\n\n\0".to_string()
            ]))
        );
        assert_eq!(
            SockJsFrame::decode(r#"c[3000,"Go away!"]"#),
            Ok(SockJsFrame::Close {
                code: 3000,
                reason: "Go away!".into()
            })
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SockJsFrame::decode("").is_err());
        assert!(SockJsFrame::decode("x").is_err());
        assert!(SockJsFrame::decode("a{not an array}").is_err());
    }

    #[test]
    fn test_messages_escape_nul() {
        let encoded = SockJsFrame::Messages(vec!["SEND\n\n\0".into()]).encode();
        assert_eq!(encoded, r#"a["SEND\n\n\u0000"]"#);
        let decoded = decode_messages(&encode_messages(&["x\ny".to_string()])).unwrap();
        assert_eq!(decoded, vec!["x\ny".to_string()]);
    }
}
