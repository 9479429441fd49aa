//! Fan-in point for everything the observer sees.
//!
//! Status changes, subscription changes and messages are stamped here and
//! handed to the [`Observer`] in the order they arrive. Stamps never go
//! backwards, even if the wall clock does.

use {
    crate::{client::ConnectionState, message::ChannelMessage, registry::SubscriptionState},
    serde::Serialize,
    std::sync::{Arc, Mutex, PoisonError},
    tokio::sync::mpsc,
    tracing::trace,
};

// ── Clock ────────────────────────────────────────────────────────────────────

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Connection state change with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub state: ConnectionState,
    pub reason: String,
    pub timestamp: i64,
}

/// Subscription state change for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionUpdate {
    pub channel: String,
    pub state: SubscriptionState,
    pub reason: String,
    pub timestamp: i64,
}

/// Everything an observer can be told, as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Status(StatusUpdate),
    Subscription(SubscriptionUpdate),
    Message(ChannelMessage),
}

impl ClientEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Status(u) => u.timestamp,
            Self::Subscription(u) => u.timestamp,
            Self::Message(m) => m.timestamp,
        }
    }
}

// ── Observers ────────────────────────────────────────────────────────────────

/// Receives client events. Called synchronously from the delivery task, so
/// implementations must return quickly and must not block.
pub trait Observer: Send + Sync {
    fn on_status(&self, _update: &StatusUpdate) {}

    fn on_subscription(&self, _update: &SubscriptionUpdate) {}

    fn on_message(&self, _message: &ChannelMessage) {}
}

/// Forwards every event into an unbounded channel so a consumer task (a UI
/// loop, a printer) can handle it on its own schedule.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            trace!("client event receiver dropped");
        }
    }
}

impl Observer for ChannelObserver {
    fn on_status(&self, update: &StatusUpdate) {
        self.forward(ClientEvent::Status(update.clone()));
    }

    fn on_subscription(&self, update: &SubscriptionUpdate) {
        self.forward(ClientEvent::Subscription(update.clone()));
    }

    fn on_message(&self, message: &ChannelMessage) {
        self.forward(ClientEvent::Message(message.clone()));
    }
}

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Observer built from closures; unset handlers ignore their events.
#[derive(Default)]
pub struct FnObserver {
    status: Option<Handler<StatusUpdate>>,
    subscription: Option<Handler<SubscriptionUpdate>>,
    message: Option<Handler<ChannelMessage>>,
}

impl FnObserver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_status(mut self, f: impl Fn(&StatusUpdate) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_subscription(
        mut self,
        f: impl Fn(&SubscriptionUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.subscription = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_message(mut self, f: impl Fn(&ChannelMessage) + Send + Sync + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }
}

impl Observer for FnObserver {
    fn on_status(&self, update: &StatusUpdate) {
        if let Some(f) = &self.status {
            f(update);
        }
    }

    fn on_subscription(&self, update: &SubscriptionUpdate) {
        if let Some(f) = &self.subscription {
            f(update);
        }
    }

    fn on_message(&self, message: &ChannelMessage) {
        if let Some(f) = &self.message {
            f(message);
        }
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────────

/// Stamps events and delivers them to the observer.
pub struct MessageSink {
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    /// Last stamp handed out; held while the observer runs so delivery
    /// order matches stamp order.
    last: Mutex<i64>,
}

impl MessageSink {
    pub fn new(observer: Arc<dyn Observer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            observer,
            clock,
            last: Mutex::new(i64::MIN),
        }
    }

    fn deliver(&self, f: impl FnOnce(&dyn Observer, i64)) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_millis().max(*last);
        *last = now;
        f(self.observer.as_ref(), now);
    }

    pub fn status(&self, state: ConnectionState, reason: impl Into<String>) {
        let reason = reason.into();
        self.deliver(|observer, timestamp| {
            observer.on_status(&StatusUpdate {
                state,
                reason,
                timestamp,
            });
        });
    }

    pub fn subscription(
        &self,
        channel: &str,
        state: SubscriptionState,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        self.deliver(|observer, timestamp| {
            observer.on_subscription(&SubscriptionUpdate {
                channel: channel.to_owned(),
                state,
                reason,
                timestamp,
            });
        });
    }

    /// Deliver a message built from the delivery stamp.
    pub fn message(&self, build: impl FnOnce(i64) -> ChannelMessage) {
        self.deliver(|observer, timestamp| observer.on_message(&build(timestamp)));
    }
}

impl std::fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSink").finish_non_exhaustive()
    }
}

/// Clock driven by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at(millis: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(millis))
    }

    pub(crate) fn set(&self, millis: i64) {
        self.0.store(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
