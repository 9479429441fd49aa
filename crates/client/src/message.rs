//! Channel messages and publication payload decoding.

use serde::{Deserialize, Serialize};

/// Kind of a [`ChannelMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Command,
    System,
    /// Decode failures and subscription errors.
    Error,
}

impl MessageType {
    fn parse(raw: &str) -> Self {
        match raw {
            "command" => Self::Command,
            "system" => Self::System,
            "error" => Self::Error,
            _ => Self::Text,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Command => write!(f, "command"),
            Self::System => write!(f, "system"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message delivered to the observer.
///
/// `timestamp` is the delivery stamp assigned by the message sink (epoch
/// millis); `sent_at` is the sender's own timestamp when the envelope has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

impl ChannelMessage {
    fn plain(channel: &str, text: String, kind: MessageType, timestamp: i64) -> Self {
        Self {
            channel: channel.to_owned(),
            sender_id: None,
            sender_name: None,
            timestamp,
            sent_at: None,
            text,
            kind,
        }
    }

    pub fn system(channel: &str, text: impl Into<String>, timestamp: i64) -> Self {
        Self::plain(channel, text.into(), MessageType::System, timestamp)
    }

    pub fn error(channel: &str, text: impl Into<String>, timestamp: i64) -> Self {
        Self::plain(channel, text.into(), MessageType::Error, timestamp)
    }

    /// A message composed locally, before it is published.
    pub fn outgoing(
        channel: &str,
        text: impl Into<String>,
        sender_id: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            sender_id,
            sent_at: Some(timestamp),
            ..Self::plain(channel, text.into(), MessageType::Text, timestamp)
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }
}

/// Identity of the connection that published a message, as reported by the
/// server alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publisher {
    pub user: String,
    pub client: String,
}

/// Why a publication payload could not be turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported payload shape: expected {{\"input\": ...}}, an envelope with \"text\", or a string")]
    UnsupportedShape,
}

/// Rich message envelope; `{"input": ...}` bodies are accepted too.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    text: Option<String>,
    input: Option<String>,
    sender_id: Option<String>,
    sender_name: Option<String>,
    timestamp: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Decode a publication's UTF-8 JSON payload into a message.
pub fn decode_publication(
    channel: &str,
    payload: &[u8],
    publisher: Option<&Publisher>,
    timestamp: i64,
) -> Result<ChannelMessage, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: serde_json::Value = serde_json::from_str(text)?;

    let envelope = match value {
        serde_json::Value::String(text) => Envelope {
            text: Some(text),
            ..Envelope::default()
        },
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(|_| DecodeError::UnsupportedShape)?
        },
        _ => return Err(DecodeError::UnsupportedShape),
    };

    let body = envelope
        .text
        .or(envelope.input)
        .ok_or(DecodeError::UnsupportedShape)?;

    let publisher_user = publisher
        .map(|p| p.user.as_str())
        .filter(|u| !u.is_empty())
        .map(str::to_owned);

    Ok(ChannelMessage {
        channel: channel.to_owned(),
        sender_id: envelope.sender_id.or(publisher_user),
        sender_name: envelope.sender_name,
        timestamp,
        sent_at: envelope.timestamp,
        text: body,
        kind: envelope
            .kind
            .as_deref()
            .map_or(MessageType::Text, MessageType::parse),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn input_body_becomes_text_message() {
        let msg = decode_publication("public:test", br#"{"input": "hi"}"#, None, 42).unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.channel, "public:test");
        assert!(msg.sender_id.is_none());
    }

    #[test]
    fn envelope_fields_are_kept() {
        let payload = br#"{
            "text": "restart",
            "senderId": "u-1",
            "senderName": "Alice",
            "timestamp": 1700000000000,
            "type": "command"
        }"#;
        let msg = decode_publication("ops", payload, None, 5).unwrap();
        assert_eq!(msg.text, "restart");
        assert_eq!(msg.sender_id.as_deref(), Some("u-1"));
        assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
        assert_eq!(msg.sent_at, Some(1_700_000_000_000));
        assert_eq!(msg.kind, MessageType::Command);
        assert_eq!(msg.timestamp, 5);
    }

    #[test]
    fn publisher_fills_missing_sender() {
        let publisher = Publisher {
            user: "42".into(),
            client: "c".into(),
        };
        let msg = decode_publication("ch", br#""plain""#, Some(&publisher), 1).unwrap();
        assert_eq!(msg.text, "plain");
        assert_eq!(msg.sender_id.as_deref(), Some("42"));
    }

    #[test]
    fn unknown_envelope_type_is_text() {
        let msg = decode_publication("ch", br#"{"text":"x","type":"sticker"}"#, None, 1).unwrap();
        assert_eq!(msg.kind, MessageType::Text);
    }

    #[test]
    fn invalid_payloads_fail_to_decode() {
        assert!(matches!(
            decode_publication("ch", &[0xff, 0xfe], None, 1),
            Err(DecodeError::Utf8(_))
        ));
        assert!(matches!(
            decode_publication("ch", b"{not json", None, 1),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_publication("ch", b"[1,2]", None, 1),
            Err(DecodeError::UnsupportedShape)
        ));
        assert!(matches!(
            decode_publication("ch", br#"{"other": 1}"#, None, 1),
            Err(DecodeError::UnsupportedShape)
        ));
        assert!(matches!(
            decode_publication("ch", br#"{"input": 7}"#, None, 1),
            Err(DecodeError::UnsupportedShape)
        ));
    }

    #[test]
    fn envelope_serializes_with_camel_case() {
        let msg = ChannelMessage::outgoing("ch", "hello", Some("me".into()), 9);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "me");
        assert_eq!(json["type"], "text");
        assert_eq!(json["sentAt"], 9);
        assert!(json.get("senderName").is_none());
    }
}
