/// Crate-wide result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the channel client.
///
/// None of these are fatal to the process. Connection problems are also
/// reported through the status callback, subscription problems through the
/// message sink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("subscription to {channel} failed: {reason}")]
    Subscription { channel: String, reason: String },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Frame(#[from] courier_protocol::ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    #[must_use]
    pub fn subscription(channel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Subscription {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::WebSocket(_) | Self::Subscription { .. } => true,
            Self::Publish(e) => e.is_retryable(),
            Self::Token(e) => e.is_retryable(),
            Self::InvalidChannel(_) | Self::Protocol(_) | Self::Frame(_) | Self::Json(_) => false,
        }
    }
}

/// Failure of a single `publish` call.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cannot publish: not subscribed to channel {channel}")]
    NotSubscribed { channel: String },

    #[error("cannot publish: not connected")]
    NotConnected,

    #[error("publish rejected by server: {message} (code {code})")]
    Rejected { code: u32, message: String },

    #[error("publish timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("publish failed: {0}")]
    Transport(String),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Failure to obtain an auth token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token endpoint response did not contain a token")]
    Missing,

    #[error("{what} refresh is not configured")]
    Unsupported { what: &'static str },

    #[error("token fetch cancelled by disconnect")]
    Cancelled,
}

impl TokenError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Missing | Self::Unsupported { .. } | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_subscribed_message_names_channel() {
        let err = Error::from(PublishError::NotSubscribed {
            channel: "public:test".into(),
        });
        assert_eq!(
            err.to_string(),
            "cannot publish: not subscribed to channel public:test"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn rejected_publish_is_not_retryable() {
        let err = PublishError::Rejected {
            code: 103,
            message: "permission denied".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn token_status_retryable_only_on_server_errors() {
        let server = TokenError::Status {
            status: 503,
            body: String::new(),
        };
        let client = TokenError::Status {
            status: 400,
            body: "user_id is required".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert_eq!(
            client.to_string(),
            "token endpoint returned HTTP 400: user_id is required"
        );
    }
}
