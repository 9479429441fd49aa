//! The channel client facade.

use {
    crate::{
        error::{Error, PublishError, Result, TokenError},
        message::{ChannelMessage, decode_publication},
        registry::{SubscriptionRegistry, SubscriptionState},
        sink::{Clock, MessageSink, Observer, SystemClock},
        token::TokenProvider,
        transport::{Transport, TransportEvent, TransportEvents},
    },
    courier_protocol::error_codes,
    secrecy::Secret,
    serde::Serialize,
    std::sync::{Arc, PoisonError, Weak},
    tokio::{
        sync::Mutex,
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// State of the single transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    AlreadyConnected,
    AlreadyConnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribing,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
}

#[derive(Debug)]
struct ConnectionSlot {
    state: ConnectionState,
    /// A fresh connection token was already fetched in this connect cycle.
    token_refreshed: bool,
}

/// Owns one transport connection, its subscriptions, and the observer.
///
/// Construct it explicitly, share it as `Arc<ChannelClient>`, and feed it
/// transport events with [`ChannelClient::spawn_event_loop`].
pub struct ChannelClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    sink: MessageSink,
    registry: Mutex<SubscriptionRegistry>,
    connection: Mutex<ConnectionSlot>,
    /// Fired by `disconnect`; replaced with a fresh token afterwards.
    cancel: std::sync::Mutex<CancellationToken>,
}

impl ChannelClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        observer: Arc<dyn Observer>,
    ) -> Arc<Self> {
        Self::with_clock(transport, tokens, observer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        observer: Arc<dyn Observer>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            tokens,
            sink: MessageSink::new(observer, clock),
            registry: Mutex::new(SubscriptionRegistry::new()),
            connection: Mutex::new(ConnectionSlot {
                state: ConnectionState::Disconnected,
                token_refreshed: false,
            }),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        })
    }

    /// Drain transport events on a background task.
    ///
    /// The task ends when the event channel closes or the client is dropped.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: TransportEvents,
    ) -> JoinHandle<()> {
        let client: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(client) = client.upgrade() else {
                    break;
                };
                client.handle_transport_event(event).await;
            }
            debug!("transport event loop finished");
        })
    }

    // ── Connection ──────────────────────────────────────────────────────────

    pub async fn state(&self) -> ConnectionState {
        self.connection.lock().await.state
    }

    /// Fetch a token and start connecting. Idempotent while connecting or
    /// connected.
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let cancel = {
            let mut conn = self.connection.lock().await;
            match conn.state {
                ConnectionState::Connected => return Ok(ConnectOutcome::AlreadyConnected),
                ConnectionState::Connecting => return Ok(ConnectOutcome::AlreadyConnecting),
                ConnectionState::Disconnected | ConnectionState::Error => {},
            }
            conn.state = ConnectionState::Connecting;
            conn.token_refreshed = false;
            self.sink
                .status(ConnectionState::Connecting, "connect requested");
            self.cancel_token()
        };
        info!("connecting");

        let token = tokio::select! {
            _ = cancel.cancelled() => Err(TokenError::Cancelled),
            token = self.tokens.connection_token() => token,
        };
        let token = match token {
            Ok(_) if cancel.is_cancelled() => return Err(TokenError::Cancelled.into()),
            Ok(token) => token,
            Err(TokenError::Cancelled) => {
                debug!("token fetch cancelled by disconnect");
                return Err(TokenError::Cancelled.into());
            },
            Err(e) => {
                warn!(error = %e, "token fetch failed");
                self.transition(ConnectionState::Error, format!("token fetch failed: {e}"))
                    .await;
                return Err(e.into());
            },
        };

        if let Err(e) = self.transport.connect(token).await {
            warn!(error = %e, "transport connect failed");
            self.transition(ConnectionState::Error, e.to_string()).await;
            return Err(e);
        }
        Ok(ConnectOutcome::Started)
    }

    /// Cancel any pending token fetch, release the transport and drop every
    /// subscription.
    pub async fn disconnect(&self) {
        {
            let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = std::mem::replace(&mut *cancel, CancellationToken::new());
            previous.cancel();
        }

        let channels = self.registry.lock().await.clear();
        self.transport.disconnect().await;
        for channel in &channels {
            self.sink
                .subscription(channel, SubscriptionState::Unsubscribed, "disconnected");
        }

        let mut conn = self.connection.lock().await;
        conn.state = ConnectionState::Disconnected;
        self.sink
            .status(ConnectionState::Disconnected, "disconnect requested");
        info!(dropped = channels.len(), "disconnected");
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a new state and report it. Repeats of the same state are
    /// dropped, except errors.
    async fn transition(&self, state: ConnectionState, reason: impl Into<String>) {
        let reason = reason.into();
        let mut conn = self.connection.lock().await;
        if conn.state == state && state != ConnectionState::Error {
            debug!(state = %state, reason = %reason, "state unchanged");
            return;
        }
        conn.state = state;
        info!(state = %state, reason = %reason, "connection state changed");
        self.sink.status(state, reason);
    }

    async fn refresh_and_reconnect(&self) {
        let retry = {
            let mut conn = self.connection.lock().await;
            !std::mem::replace(&mut conn.token_refreshed, true)
        };
        if !retry {
            self.transition(
                ConnectionState::Error,
                "connection token expired again after refresh",
            )
            .await;
            return;
        }

        info!("connection token expired, fetching a new one");
        let cancel = self.cancel_token();
        let token = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("token refresh cancelled by disconnect");
                return;
            },
            token = self.tokens.refresh_connection_token() => token,
        };

        match token {
            Ok(token) => {
                if let Err(e) = self.transport.connect(Some(token)).await {
                    warn!(error = %e, "reconnect after token refresh failed");
                    self.transition(ConnectionState::Error, e.to_string()).await;
                    return;
                }
                self.replay_subscriptions().await;
            },
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.transition(ConnectionState::Error, format!("token refresh failed: {e}"))
                    .await;
            },
        }
    }

    /// Re-send subscribe commands for every active entry after the
    /// transport started a new session.
    async fn replay_subscriptions(&self) {
        let channels = self.registry.lock().await.restart_active();
        for (channel, token) in channels {
            debug!(channel = %channel, "replaying subscription");
            if let Err(e) = self.transport.subscribe(&channel, token).await {
                self.mark_failed(&channel, format!("resubscribe failed: {e}"))
                    .await;
            }
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    pub async fn subscribe(&self, channel: &str) -> Result<SubscribeOutcome> {
        self.subscribe_with_token(channel, None).await
    }

    /// Subscribe with an explicit subscription token.
    pub async fn subscribe_with_token(
        &self,
        channel: &str,
        token: Option<String>,
    ) -> Result<SubscribeOutcome> {
        validate_channel(channel)?;

        if !self
            .registry
            .lock()
            .await
            .insert(channel, token.clone().map(Secret::new))
        {
            info!(channel, "already subscribed");
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        if let Err(e) = self.transport.subscribe(channel, token).await {
            self.registry.lock().await.remove(channel);
            warn!(channel, error = %e, "subscribe failed");
            let err = Error::subscription(channel, &e);
            self.sink
                .subscription(channel, SubscriptionState::Error, e.to_string());
            self.sink
                .message(|ts| ChannelMessage::error(channel, err.to_string(), ts));
            return Err(err);
        }

        debug!(channel, "subscribe requested");
        Ok(SubscribeOutcome::Subscribing)
    }

    /// Remove the subscription. The entry is dropped even if the transport
    /// fails to release it; that failure is returned.
    pub async fn unsubscribe(&self, channel: &str) -> Result<UnsubscribeOutcome> {
        if self.registry.lock().await.remove(channel).is_none() {
            info!(channel, "not subscribed");
            return Ok(UnsubscribeOutcome::NotSubscribed);
        }

        let released = self.transport.unsubscribe(channel).await;
        self.sink
            .subscription(channel, SubscriptionState::Unsubscribed, "unsubscribed");
        if let Err(e) = released {
            warn!(channel, error = %e, "transport unsubscribe failed");
            return Err(e);
        }
        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    pub async fn is_subscribed(&self, channel: &str) -> bool {
        self.registry.lock().await.is_active(channel)
    }

    /// `(channel, state)` pairs sorted by channel.
    pub async fn subscriptions(&self) -> Vec<(String, SubscriptionState)> {
        self.registry.lock().await.list()
    }

    // ── Publishing ──────────────────────────────────────────────────────────

    /// Publish `text` as `{"input": text}`.
    pub async fn publish(&self, channel: &str, text: &str) -> Result<()> {
        self.publish_json(channel, serde_json::json!({ "input": text }))
            .await
    }

    /// Publish a caller-built envelope.
    pub async fn publish_json(&self, channel: &str, data: serde_json::Value) -> Result<()> {
        validate_channel(channel)?;
        if !self.registry.lock().await.is_active(channel) {
            return Err(PublishError::NotSubscribed {
                channel: channel.to_owned(),
            }
            .into());
        }

        let result = self.transport.publish(channel, data).await;
        if !self.registry.lock().await.contains(channel) {
            debug!(
                channel,
                ok = result.is_ok(),
                "publish completed after the channel was torn down"
            );
        }
        result.map_err(Error::from)
    }

    // ── Transport events ────────────────────────────────────────────────────

    /// Apply one transport event. Events must be fed in transport order.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        debug!(event = event.kind(), "transport event");
        match event {
            TransportEvent::Connecting { reason } => {
                self.transition(ConnectionState::Connecting, reason).await;
            },
            TransportEvent::Connected { client_id } => {
                self.transition(
                    ConnectionState::Connected,
                    format!("connected as {client_id}"),
                )
                .await;
            },
            TransportEvent::Disconnected { code, reason } => {
                let channels = self.registry.lock().await.clear();
                for channel in &channels {
                    self.sink.subscription(
                        channel,
                        SubscriptionState::Unsubscribed,
                        "connection closed",
                    );
                }
                self.transition(
                    ConnectionState::Disconnected,
                    format!("{reason} (code {code})"),
                )
                .await;
            },
            TransportEvent::Error { message } => {
                warn!(error = %message, "transport error");
                self.transition(ConnectionState::Error, message).await;
            },
            TransportEvent::TokenExpired => self.refresh_and_reconnect().await,
            TransportEvent::Subscribing { channel } => {
                self.subscription_changed(&channel, SubscriptionState::Subscribing, "subscribing")
                    .await;
            },
            TransportEvent::Subscribed { channel } => {
                self.subscription_changed(&channel, SubscriptionState::Subscribed, "subscribed")
                    .await;
            },
            TransportEvent::Unsubscribed { channel, reason } => {
                if self.registry.lock().await.remove(&channel).is_some() {
                    info!(channel = %channel, reason = %reason, "unsubscribed by server");
                    self.sink
                        .subscription(&channel, SubscriptionState::Unsubscribed, reason);
                }
            },
            TransportEvent::SubscriptionError {
                channel,
                code,
                message,
            } => self.subscription_failed(&channel, code, &message).await,
            TransportEvent::Publication {
                channel,
                data,
                publisher,
            } => {
                if !self.registry.lock().await.contains(&channel) {
                    debug!(channel = %channel, "dropping publication for unregistered channel");
                    return;
                }
                self.sink.message(|ts| {
                    decode_publication(&channel, &data, publisher.as_ref(), ts).unwrap_or_else(
                        |e| {
                            warn!(channel = %channel, error = %e, "could not decode publication");
                            ChannelMessage::error(&channel, format!("could not decode message: {e}"), ts)
                        },
                    )
                });
            },
            TransportEvent::Join { channel, user } => {
                if self.registry.lock().await.contains(&channel) {
                    self.sink.message(|ts| {
                        ChannelMessage::system(&channel, format!("{user} joined"), ts)
                    });
                }
            },
            TransportEvent::Leave { channel, user } => {
                if self.registry.lock().await.contains(&channel) {
                    self.sink
                        .message(|ts| ChannelMessage::system(&channel, format!("{user} left"), ts));
                }
            },
        }
    }

    async fn subscription_changed(&self, channel: &str, state: SubscriptionState, reason: &str) {
        if !self.registry.lock().await.set_state(channel, state) {
            debug!(channel, state = %state, "ignoring state for unregistered channel");
            return;
        }
        self.sink.subscription(channel, state, reason);
    }

    async fn subscription_failed(&self, channel: &str, code: u32, message: &str) {
        if code == error_codes::TOKEN_EXPIRED {
            let retry = {
                let mut registry = self.registry.lock().await;
                match registry.get_mut(channel) {
                    Some(entry) => !std::mem::replace(&mut entry.token_refreshed, true),
                    None => {
                        debug!(channel, "token expiry for unregistered channel");
                        return;
                    },
                }
            };
            if retry {
                match self.resubscribe_with_fresh_token(channel).await {
                    Ok(()) => return,
                    Err(e) => {
                        self.mark_failed(channel, format!("subscription token refresh failed: {e}"))
                            .await;
                        return;
                    },
                }
            }
        }

        self.mark_failed(channel, format!("subscription error: {message} (code {code})"))
            .await;
    }

    async fn resubscribe_with_fresh_token(&self, channel: &str) -> Result<()> {
        info!(channel, "subscription token expired, fetching a new one");
        let cancel = self.cancel_token();
        let token = tokio::select! {
            _ = cancel.cancelled() => Err(TokenError::Cancelled),
            token = self.tokens.subscription_token(channel) => token,
        }?;

        if let Some(entry) = self.registry.lock().await.get_mut(channel) {
            entry.token = Some(Secret::new(token.clone()));
            entry.state = SubscriptionState::Subscribing;
        }
        self.transport.subscribe(channel, Some(token)).await
    }

    async fn mark_failed(&self, channel: &str, reason: String) {
        warn!(channel, reason = %reason, "subscription failed");
        if !self
            .registry
            .lock()
            .await
            .set_state(channel, SubscriptionState::Error)
        {
            return;
        }
        self.sink
            .subscription(channel, SubscriptionState::Error, reason.clone());
        self.sink
            .message(|ts| ChannelMessage::error(channel, reason, ts));
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

fn validate_channel(channel: &str) -> Result<()> {
    if channel.trim().is_empty() {
        return Err(Error::InvalidChannel(channel.to_owned()));
    }
    Ok(())
}
