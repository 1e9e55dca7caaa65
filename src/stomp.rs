//! Minimal STOMP 1.2 frame codec.
//!
//! The room engine speaks STOMP over WebSocket through a simple broker:
//! intents are SENT to `/app/...` endpoints, events arrive as MESSAGE frames
//! from `/topic/...` and `/user/queue/...` destinations. Each WebSocket text
//! message carries exactly one frame, so the codec works on whole strings
//! rather than a streaming buffer.
//!
//! Only the subset of STOMP the protocol needs is implemented: the commands
//! in [`StompCommand`], STOMP 1.2 header octet escaping (not applied to
//! CONNECT/CONNECTED frames), and bare-EOL heartbeat frames.

use crate::error::{BuzzerError, Result};

/// Frame commands used by the buzzer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    // Client → server
    Connect,
    Subscribe,
    Unsubscribe,
    Send,
    Disconnect,
    // Server → client
    Connected,
    Message,
    Error,
    Receipt,
}

impl StompCommand {
    /// The wire name of this command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
            Self::Receipt => "RECEIPT",
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        match line {
            "CONNECT" | "STOMP" => Some(Self::Connect),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "SEND" => Some(Self::Send),
            "DISCONNECT" => Some(Self::Disconnect),
            "CONNECTED" => Some(Self::Connected),
            "MESSAGE" => Some(Self::Message),
            "ERROR" => Some(Self::Error),
            "RECEIPT" => Some(Self::Receipt),
            _ => None,
        }
    }

    /// CONNECT and CONNECTED frames predate header escaping and must not
    /// apply it.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// One decoded STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Result of parsing one inbound WebSocket text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// A complete frame.
    Frame(StompFrame),
    /// A bare-EOL heartbeat.
    Heartbeat,
}

impl StompFrame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header. Repeated names are kept in order; STOMP treats the
    /// first occurrence as authoritative.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the frame body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for the given header name, if present.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Encode to the wire representation (`COMMAND\nheaders\n\nbody\0`).
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
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
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one inbound WebSocket text message.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::TransportReceive`] on an unknown command or a
    /// malformed header line. Malformed frames never panic.
    pub fn parse(raw: &str) -> Result<ParsedFrame> {
        // Heartbeats are a bare EOL.
        if raw.is_empty() || raw == "\n" || raw == "\r\n" {
            return Ok(ParsedFrame::Heartbeat);
        }

        // Tolerate CRLF line endings alongside the canonical LF.
        let (head, body) = match raw.split_once("\r\n\r\n").or_else(|| raw.split_once("\n\n")) {
            Some(parts) => parts,
            None => (raw, ""),
        };

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or("").trim_end_matches('\r');
        let command = StompCommand::from_line(command_line).ok_or_else(|| {
            BuzzerError::TransportReceive(format!("unknown STOMP command: {command_line:?}"))
        })?;

        let escape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                BuzzerError::TransportReceive(format!("malformed STOMP header: {line:?}"))
            })?;
            if escape {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        // The body runs to the NUL terminator; a missing NUL is tolerated.
        let body = body.strip_suffix('\0').unwrap_or(body).to_string();

        Ok(ParsedFrame::Frame(StompFrame {
            command,
            headers,
            body,
        }))
    }
}

/// The wire bytes of a heartbeat frame.
pub const HEARTBEAT: &str = "\n";

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            other => {
                return Err(BuzzerError::TransportReceive(format!(
                    "invalid STOMP header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn encode_send_frame() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", "/app/press-button")
            .header("content-type", "application/json")
            .body(r#"{"roomCode":"AB12"}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/press-button\ncontent-type:application/json\n\n{\"roomCode\":\"AB12\"}\0"
        );
    }

    #[test]
    fn parse_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/room/AB12\nsubscription:sub-0\nmessage-id:7\n\n{\"type\":\"ROUND_STARTED\"}\0";
        let parsed = StompFrame::parse(raw).unwrap();
        let frame = match parsed {
            ParsedFrame::Frame(f) => f,
            ParsedFrame::Heartbeat => panic!("expected frame"),
        };
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header_value("destination"), Some("/topic/room/AB12"));
        assert_eq!(frame.body, "{\"type\":\"ROUND_STARTED\"}");
    }

    #[test]
    fn parse_heartbeat() {
        assert_eq!(StompFrame::parse("\n").unwrap(), ParsedFrame::Heartbeat);
        assert_eq!(StompFrame::parse("\r\n").unwrap(), ParsedFrame::Heartbeat);
        assert_eq!(StompFrame::parse("").unwrap(), ParsedFrame::Heartbeat);
    }

    #[test]
    fn round_trip_escaped_headers() {
        let frame = StompFrame::new(StompCommand::Message)
            .header("destination", "/topic/room/AB12")
            .header("odd:name", "line\nbreak\\slash");
        let parsed = StompFrame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed, ParsedFrame::Frame(frame));
    }

    #[test]
    fn connected_headers_are_not_escaped() {
        let frame = StompFrame::new(StompCommand::Connected)
            .header("version", "1.2")
            .header("heart-beat", "4000,4000");
        // No backslash escapes in the encoding of a CONNECTED frame.
        assert!(!frame.encode().contains('\\'));
        let raw = "CONNECTED\nversion:1.2\nheart-beat:4000,4000\n\n\0";
        let parsed = StompFrame::parse(raw).unwrap();
        match parsed {
            ParsedFrame::Frame(f) => {
                assert_eq!(f.header_value("heart-beat"), Some("4000,4000"));
            }
            ParsedFrame::Heartbeat => panic!("expected frame"),
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = StompFrame::parse("NONSENSE\n\n\0").unwrap_err();
        assert!(matches!(err, BuzzerError::TransportReceive(_)));
    }

    #[test]
    fn malformed_header_is_an_error() {
        let err = StompFrame::parse("MESSAGE\nno-colon-here\n\nbody\0").unwrap_err();
        assert!(matches!(err, BuzzerError::TransportReceive(_)));
    }

    #[test]
    fn missing_nul_is_tolerated() {
        let parsed = StompFrame::parse("MESSAGE\ndestination:/x\n\nbody").unwrap();
        match parsed {
            ParsedFrame::Frame(f) => assert_eq!(f.body, "body"),
            ParsedFrame::Heartbeat => panic!("expected frame"),
        }
    }

    #[test]
    fn empty_body_frame() {
        let raw = "RECEIPT\nreceipt-id:42\n\n\0";
        match StompFrame::parse(raw).unwrap() {
            ParsedFrame::Frame(f) => {
                assert_eq!(f.command, StompCommand::Receipt);
                assert!(f.body.is_empty());
            }
            ParsedFrame::Heartbeat => panic!("expected frame"),
        }
    }
}
