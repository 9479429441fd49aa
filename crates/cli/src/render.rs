//! One-line rendering of client events for the terminal.

use {
    chrono::{DateTime, Local, TimeZone},
    courier_client::{ClientEvent, MessageType},
};

/// Render `event` with its stamp shown in the given timezone.
pub fn event_line<Tz: TimeZone>(event: &ClientEvent, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let time = DateTime::from_timestamp_millis(event.timestamp())
        .map(|t| t.with_timezone(tz).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".into());

    match event {
        ClientEvent::Status(s) => format!("[{time}] * {}: {}", s.state, s.reason),
        ClientEvent::Subscription(s) => {
            format!("[{time}] # {} {}: {}", s.channel, s.state, s.reason)
        },
        ClientEvent::Message(m) => {
            let sender = m
                .sender_name
                .as_deref()
                .or(m.sender_id.as_deref())
                .unwrap_or("anonymous");
            match m.kind {
                MessageType::Text => format!("[{time}] <{sender}> {}", m.text),
                MessageType::Command => format!("[{time}] <{sender}> /{}", m.text),
                MessageType::System => format!("[{time}] - {}", m.text),
                MessageType::Error => format!("[{time}] ! {}", m.text),
            }
        },
    }
}

/// Render `event` in the local timezone.
pub fn local_line(event: &ClientEvent) -> String {
    event_line(event, &Local)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        chrono::Utc,
        courier_client::{ChannelMessage, ConnectionState, StatusUpdate},
        rstest::rstest,
    };

    // 2023-11-14 22:13:20 UTC
    const STAMP: i64 = 1_700_000_000_000;

    fn message(kind: MessageType, sender: Option<&str>) -> ClientEvent {
        ClientEvent::Message(ChannelMessage {
            channel: "public:test".into(),
            sender_id: sender.map(str::to_owned),
            sender_name: None,
            timestamp: STAMP,
            sent_at: None,
            text: "hi".into(),
            kind,
        })
    }

    #[rstest]
    #[case(message(MessageType::Text, Some("42")), "[22:13:20] <42> hi")]
    #[case(message(MessageType::Text, None), "[22:13:20] <anonymous> hi")]
    #[case(message(MessageType::Command, Some("ops")), "[22:13:20] <ops> /hi")]
    #[case(message(MessageType::System, None), "[22:13:20] - hi")]
    #[case(message(MessageType::Error, None), "[22:13:20] ! hi")]
    #[case(
        ClientEvent::Status(StatusUpdate {
            state: ConnectionState::Connected,
            reason: "connected as c-1".into(),
            timestamp: STAMP,
        }),
        "[22:13:20] * connected: connected as c-1"
    )]
    fn renders_events(#[case] event: ClientEvent, #[case] expected: &str) {
        assert_eq!(event_line(&event, &Utc), expected);
    }
}
