//! The seam between the facade and whatever moves bytes.
//!
//! A transport performs commands and reports everything that happens on
//! the connection as [`TransportEvent`]s on a channel handed out at
//! construction. Command methods return once the command is accepted;
//! outcomes that the server decides (connected, subscribed, rejected
//! subscription) arrive as events.
//!
//! Every connection attempt is a session. Events are tagged with the
//! session that produced them, and the receiving end drops events from any
//! session that has since been replaced or closed.

use {
    crate::{
        error::{PublishError, Result},
        message::Publisher,
    },
    async_trait::async_trait,
    std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    tokio::sync::mpsc,
    tracing::debug,
};

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting { reason: String },
    Connected { client_id: String },
    Disconnected { code: u32, reason: String },
    /// Transport-level failure that did not (yet) close the connection.
    Error { message: String },
    /// The server rejected the connection token as expired.
    TokenExpired,
    Subscribing { channel: String },
    Subscribed { channel: String },
    /// Server-side unsubscribe.
    Unsubscribed { channel: String, reason: String },
    SubscriptionError {
        channel: String,
        code: u32,
        message: String,
    },
    Publication {
        channel: String,
        data: Vec<u8>,
        publisher: Option<Publisher>,
    },
    Join { channel: String, user: String },
    Leave { channel: String, user: String },
}

impl TransportEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
            Self::TokenExpired => "token_expired",
            Self::Subscribing { .. } => "subscribing",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::SubscriptionError { .. } => "subscription_error",
            Self::Publication { .. } => "publication",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
        }
    }
}

// ── Event channel ────────────────────────────────────────────────────────────

type Tagged = (u64, TransportEvent);

/// Create a transport event channel.
pub fn event_channel() -> (EventSender, TransportEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let current = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            current: Arc::clone(&current),
        },
        TransportEvents { rx, current },
    )
}

/// Transport-side handle that opens and closes sessions.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Tagged>,
    current: Arc<AtomicU64>,
}

impl EventSender {
    /// Start a new session. Events from earlier sessions are dropped from
    /// now on, including ones already queued.
    pub fn begin_session(&self) -> SessionEvents {
        let session = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        SessionEvents {
            tx: self.tx.clone(),
            session,
        }
    }

    /// Close the current session without starting another.
    pub fn end_session(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sends events on behalf of one session.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: mpsc::UnboundedSender<Tagged>,
    session: u64,
}

impl SessionEvents {
    /// Queue `event`. Returns false once the receiver is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.session, event)).is_ok()
    }

    pub fn session(&self) -> u64 {
        self.session
    }
}

/// Receiving end; yields only events of the current session.
#[derive(Debug)]
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<Tagged>,
    current: Arc<AtomicU64>,
}

impl TransportEvents {
    /// Next event of the current session, or `None` once every sender is
    /// gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            let tagged = self.rx.recv().await?;
            if let Some(event) = self.admit(tagged) {
                return Some(event);
            }
        }
    }

    /// Non-blocking variant of [`TransportEvents::recv`].
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        loop {
            let tagged = self.rx.try_recv().ok()?;
            if let Some(event) = self.admit(tagged) {
                return Some(event);
            }
        }
    }

    fn admit(&self, (session, event): Tagged) -> Option<TransportEvent> {
        let current = self.current.load(Ordering::SeqCst);
        if session != current {
            debug!(
                session,
                current,
                event = event.kind(),
                "dropping event from superseded session"
            );
            return None;
        }
        Some(event)
    }
}

/// Connection to a pub/sub server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting with an optional connection token.
    /// Starting a connection begins a new event session.
    async fn connect(&self, token: Option<String>) -> Result<()>;

    /// Close the connection and end its event session. Idempotent.
    async fn disconnect(&self);

    /// Request a subscription; the outcome arrives as an event.
    async fn subscribe(&self, channel: &str, token: Option<String>) -> Result<()>;

    async fn unsubscribe(&self, channel: &str) -> Result<()>;

    /// Publish `data` and wait for the server to acknowledge it.
    async fn publish(
        &self,
        channel: &str,
        data: serde_json::Value,
    ) -> std::result::Result<(), PublishError>;
}


/// In-memory transport that records calls for facade tests.
#[cfg(test)]
pub(crate) mod scripted {
    use {
        super::*,
        crate::error::Error,
        std::sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Connect(Option<String>),
        Disconnect,
        Subscribe(String, Option<String>),
        Unsubscribe(String),
        Publish(String, serde_json::Value),
    }

    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        calls: Mutex<Vec<Call>>,
        pub(crate) fail_subscribe: AtomicBool,
        pub(crate) reject_publish: AtomicBool,
    }

    impl ScriptedTransport {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }

        fn record(&self, call: Call) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&self, token: Option<String>) -> Result<()> {
            self.record(Call::Connect(token));
            Ok(())
        }

        async fn disconnect(&self) {
            self.record(Call::Disconnect);
        }

        async fn subscribe(&self, channel: &str, token: Option<String>) -> Result<()> {
            self.record(Call::Subscribe(channel.into(), token));
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(Error::connection("not connected"));
            }
            Ok(())
        }

        async fn unsubscribe(&self, channel: &str) -> Result<()> {
            self.record(Call::Unsubscribe(channel.into()));
            Ok(())
        }

        async fn publish(
            &self,
            channel: &str,
            data: serde_json::Value,
        ) -> std::result::Result<(), PublishError> {
            self.record(Call::Publish(channel.into(), data));
            if self.reject_publish.load(Ordering::SeqCst) {
                return Err(PublishError::Rejected {
                    code: 103,
                    message: "permission denied".into(),
                });
            }
            Ok(())
        }
    }
}
