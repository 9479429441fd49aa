//! Config schema types (server, auth, channel, client).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Channel the demo clients subscribe to when nothing else is configured.
pub const DEFAULT_CHANNEL: &str = "public:test";

/// Placeholder endpoint written into fresh settings files.
pub const DEFAULT_SERVER_URL: &str = "wss://your-centrifugo-server.com/connection/websocket";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub channel: ChannelConfig,
    pub client: ClientConfig,
}

impl CourierConfig {
    /// Channel to use when the caller does not name one: the last channel
    /// used, then the configured default.
    pub fn preferred_channel(&self) -> &str {
        self.channel
            .last
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.channel.default)
    }
}

/// WebSocket endpoint of the Centrifugo-compatible server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.into(),
        }
    }
}

/// Connection credentials.
///
/// `token` is used as-is on connect. When it is missing or rejected as
/// expired, a fresh one is fetched from `token_endpoint` for `user_id`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    pub token_endpoint: Option<String>,
    pub user_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_endpoint: None,
            user_id: "testuser".into(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_endpoint", &self.token_endpoint)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Channel selection, including the last channel the user subscribed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub default: String,
    pub last: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_CHANNEL.into(),
            last: None,
        }
    }
}

/// Client identity and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name reported to the server in the connect command.
    pub name: String,
    pub handshake_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "courier".into(),
            handshake_timeout_ms: 10_000,
            command_timeout_ms: 10_000,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
