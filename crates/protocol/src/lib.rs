//! Centrifugo client protocol definitions (JSON encoding).
//!
//! All communication uses JSON frames over WebSocket.
//!
//! Frame types:
//! - `Command`: client → server, one method per frame, correlated by `id`
//! - `Reply`: server → client, either a command result (same `id`), an
//!   error, or an asynchronous `push` (no `id`)
//!
//! An empty object `{}` in either direction is a ping/pong. The server may
//! batch several replies into one WebSocket message separated by newlines.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s
pub const COMMAND_TIMEOUT_MS: u64 = 10_000; // 10s
pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB, Centrifugo default

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const INTERNAL: u32 = 100;
    pub const UNAUTHORIZED: u32 = 101;
    pub const UNKNOWN_CHANNEL: u32 = 102;
    pub const PERMISSION_DENIED: u32 = 103;
    pub const METHOD_NOT_FOUND: u32 = 104;
    pub const ALREADY_SUBSCRIBED: u32 = 105;
    pub const LIMIT_EXCEEDED: u32 = 106;
    pub const BAD_REQUEST: u32 = 107;
    pub const NOT_AVAILABLE: u32 = 108;
    pub const TOKEN_EXPIRED: u32 = 109;
    pub const EXPIRED: u32 = 110;
    pub const TOO_MANY_REQUESTS: u32 = 111;
    pub const UNRECOVERABLE_POSITION: u32 = 112;
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame exceeds {limit} bytes ({size} bytes)")]
    TooLarge { size: usize, limit: usize },
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temporary: bool,
}

impl ErrorShape {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            temporary: false,
        }
    }

    pub fn is_token_expired(&self) -> bool {
        self.code == error_codes::TOKEN_EXPIRED
    }
}

impl std::fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Client → server command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    #[serde(flatten)]
    pub request: Request,
}

impl Command {
    pub fn new(id: u32, request: Request) -> Self {
        Self { id, request }
    }

    /// Method name, used for logging and timeout messages.
    pub fn method(&self) -> &'static str {
        self.request.method()
    }
}

/// The single method carried by a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Connect(ConnectRequest),
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
    Publish(PublishRequest),
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Publish(_) => "publish",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    pub data: serde_json::Value,
}

// ── Replies ──────────────────────────────────────────────────────────────────

/// Server → client frame.
///
/// Exactly one of the result fields, `error`, or `push` is set; none at all
/// means the frame is a ping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<Push>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<serde_json::Value>,
}

impl Reply {
    /// `{}` from the server is a ping; the client answers with `{}`.
    pub fn is_ping(&self) -> bool {
        self.id.is_none()
            && self.error.is_none()
            && self.push.is_none()
            && self.connect.is_none()
            && self.subscribe.is_none()
            && self.unsubscribe.is_none()
            && self.publish.is_none()
    }
}

/// Result of a successful `connect` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectResult {
    pub client: String,
    #[serde(default)]
    pub version: String,
    /// Server ping interval in seconds.
    #[serde(default)]
    pub ping: u32,
    /// Whether the server expects pongs.
    #[serde(default)]
    pub pong: bool,
}

// ── Pushes ───────────────────────────────────────────────────────────────────

/// Asynchronous server message, optionally scoped to a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Push {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(rename = "pub", default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Presence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave: Option<Presence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<CodeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnect: Option<CodeReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ClientInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Identity of the connection that produced a publication or presence event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub client: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub info: ClientInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeReason {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub reason: String,
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// Serialize a command to its JSON text frame.
pub fn encode_command(command: &Command) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(command)?;
    if json.len() > MAX_PAYLOAD_BYTES {
        return Err(ProtocolError::TooLarge {
            size: json.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(json)
}

/// Decode one WebSocket text message into its replies.
///
/// Blank lines are skipped; any malformed line fails the whole message.
pub fn decode_replies(text: &str) -> Result<Vec<Reply>, ProtocolError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Reply>(line).map_err(ProtocolError::from))
        .collect()
}

/// The pong frame sent back in response to a server ping.
pub const PONG_FRAME: &str = "{}";
