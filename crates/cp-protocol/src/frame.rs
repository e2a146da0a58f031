//! STOMP 1.2 frame codec.
//!
//! A frame is a command line, header lines, a blank line, the body and a
//! terminating NUL. Bare EOLs between frames are heart-beats and decode to
//! `None`.

use std::fmt;
use std::time::Duration;

/// Errors produced while decoding a STOMP frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated")]
    Truncated,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("Frame body is not NUL terminated")]
    MissingNull,

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Frame exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Malformed SockJS frame: {0}")]
    SockJs(String),
}

/// STOMP client and server commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED headers are sent verbatim; every other frame
    /// escapes `\r`, `\n`, `:` and `\`.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `heart-beat` header value: `<outgoing ms>,<incoming ms>` from the sender's
/// point of view. Zero means "cannot send" / "do not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (cx, cy) = value.split_once(',')?;
        Some(Self {
            outgoing_ms: cx.trim().parse().ok()?,
            incoming_ms: cy.trim().parse().ok()?,
        })
    }

    /// Negotiate intervals from our side given the peer's header.
    ///
    /// Returns `(send_every, expect_every)`; `None` disables that direction.
    pub fn negotiate(&self, peer: HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        (
            pick(self.outgoing_ms, peer.incoming_ms),
            pick(self.incoming_ms, peer.outgoing_ms),
        )
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}

/// A single STOMP frame with a UTF-8 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header. Repeated headers resolve to the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ─── Constructors ────────────────────────────────────────

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", crate::ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.to_string())
    }

    pub fn connected(session: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connected)
            .header("version", crate::STOMP_VERSION)
            .header("session", session)
            .header("heart-beat", heart_beat.to_string())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn message(
        destination: &str,
        subscription: &str,
        message_id: &str,
        body: impl Into<String>,
    ) -> Self {
        Self::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn receipt(receipt_id: &str) -> Self {
        Self::new(Command::Receipt).header("receipt-id", receipt_id)
    }

    pub fn error(message: &str, details: impl Into<String>) -> Self {
        Self::new(Command::Error)
            .header("message", message)
            .header("content-type", "text/plain")
            .with_body(details)
    }

    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Self::new(Command::Disconnect);
        match receipt {
            Some(id) => frame.header("receipt", id),
            None => frame,
        }
    }

    // ─── Codec ───────────────────────────────────────────────

    /// Serialize to wire text. A `content-length` header is added for
    /// non-empty bodies unless one is already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Leading EOLs are heart-beats; input made only of EOLs yields `None`.
    /// Anything after the terminating NUL other than EOLs is ignored.
    pub fn decode(input: &str) -> Result<Option<Frame>, FrameError> {
        if input.len() > crate::MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(crate::MAX_FRAME_SIZE));
        }
        let input = input.trim_start_matches(['\r', '\n']);
        if input.is_empty() {
            return Ok(None);
        }

        let mut cursor = input;
        let command_line = next_line(&mut cursor).ok_or(FrameError::Truncated)?;
        let command = Command::parse(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut cursor).ok_or(FrameError::Truncated)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.clone());

        let body = match content_length {
            Some(raw) => {
                let len: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(raw.clone()))?;
                if cursor.len() <= len {
                    return Err(FrameError::Truncated);
                }
                if !cursor.is_char_boundary(len) {
                    return Err(FrameError::InvalidContentLength(raw));
                }
                if cursor.as_bytes()[len] != 0 {
                    return Err(FrameError::MissingNull);
                }
                &cursor[..len]
            }
            None => {
                let end = cursor.find('\0').ok_or(FrameError::MissingNull)?;
                &cursor[..end]
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(destination) = self.get("destination") {
            write!(f, " {}", destination)?;
        }
        Ok(())
    }
}

/// Split off the next line, accepting both `\n` and `\r\n`.
fn next_line<'a>(cursor: &mut &'a str) -> Option<&'a str> {
    let idx = cursor.find('\n')?;
    let line = &cursor[..idx];
    *cursor = &cursor[idx + 1..];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe() {
        let frame = Frame::subscribe("sub-0", "/topic/labs/L1/checkpoints");
        assert_eq!(
            frame.encode(),
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/labs/L1/checkpoints\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_encode_adds_content_length() {
        let encoded = Frame::send("/topic/group-updates", "{}").encode();
        assert!(encoded.contains("content-length:2\n"));
        assert!(encoded.ends_with("\n\n{}\0"));
    }

    #[test]
    fn test_decode_message() {
        let wire = "MESSAGE\ndestination:/topic/groups/g1/status\nsubscription:sub-3\nmessage-id:7\n\n{\"a\":1}\0\n";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-3"));
        assert_eq!(frame.get("destination"), Some("/topic/groups/g1/status"));
        assert_eq!(frame.body, "{\"a\":1}");
    }

    #[test]
    fn test_decode_heartbeat_only() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n\n").unwrap(), None);
    }

    #[test]
    fn test_decode_skips_leading_heartbeats_and_crlf() {
        let wire = "\n\nCONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
    }

    #[test]
    fn test_content_length_allows_embedded_nul() {
        let wire = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_header_escaping() {
        let frame = Frame::new(Command::Send).header("note", "a:b\nc\\d");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\nc\\\\d\n"));
        let decoded = Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.get("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn test_connect_headers_not_escaped() {
        let encoded = Frame::connect("localhost:8080", HeartBeat::new(10_000, 10_000)).encode();
        assert!(encoded.contains("host:localhost:8080\n"));
        let decoded = Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.get("host"), Some("localhost:8080"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let wire = "MESSAGE\nfoo:1\nfoo:2\n\n\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Frame::decode("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".into()))
        );
        assert_eq!(Frame::decode("MESSAGE\nfoo:bar\n"), Err(FrameError::Truncated));
        assert_eq!(Frame::decode("MESSAGE\n\nbody"), Err(FrameError::MissingNull));
        assert_eq!(
            Frame::decode("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader("nocolon".into()))
        );
        assert_eq!(
            Frame::decode("MESSAGE\nx:a\\tb\n\n\0"),
            Err(FrameError::InvalidEscape("a\\tb".into()))
        );
        assert_eq!(
            Frame::decode("MESSAGE\ncontent-length:9\n\nabc\0"),
            Err(FrameError::Truncated)
        );
    }

    #[test]
    fn test_heart_beat_negotiation() {
        let ours = HeartBeat::new(10_000, 10_000);
        let (send, expect) = ours.negotiate(HeartBeat::new(5_000, 20_000));
        assert_eq!(send, Some(Duration::from_millis(20_000)));
        assert_eq!(expect, Some(Duration::from_millis(10_000)));

        let (send, expect) = ours.negotiate(HeartBeat::new(0, 0));
        assert_eq!(send, None);
        assert_eq!(expect, None);

        assert_eq!(HeartBeat::parse("100, 200"), Some(HeartBeat::new(100, 200)));
        assert_eq!(HeartBeat::parse("nope"), None);
    }
}
