//! WebSocket transport speaking the Centrifugo client JSON protocol.
//!
//! One connection attempt per `connect`; no reconnects, no history or
//! recovery. Commands issued before the handshake completes are queued and
//! flushed once the server accepts the connection.

use {
    crate::{
        error::{Error, PublishError, Result},
        message::Publisher,
        transport::{
            EventSender, SessionEvents, Transport, TransportEvent, TransportEvents, event_channel,
        },
    },
    async_trait::async_trait,
    courier_config::CourierConfig,
    courier_protocol::{
        COMMAND_TIMEOUT_MS, Command, ConnectRequest, ConnectResult, ErrorShape,
        HANDSHAKE_TIMEOUT_MS, PONG_FRAME, ProtocolError, PublishRequest, Push, Reply, Request,
        SubscribeRequest, UnsubscribeRequest, decode_replies, encode_command,
    },
    futures::{SinkExt, StreamExt},
    std::{
        collections::HashMap,
        sync::{
            Arc, PoisonError,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    },
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{
        Connector, connect_async_tls_with_config,
        tungstenite::{Message, protocol::CloseFrame},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Close code reported when the client itself ends the session.
const CLIENT_CLOSE_CODE: u32 = 0;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct WsOptions {
    pub url: String,
    /// Client name sent in the connect command.
    pub client_name: String,
    pub handshake_timeout: Duration,
    pub command_timeout: Duration,
}

impl WsOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_name: "courier".into(),
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            command_timeout: Duration::from_millis(COMMAND_TIMEOUT_MS),
        }
    }

    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            url: config.server.url.clone(),
            client_name: config.client.name.clone(),
            handshake_timeout: Duration::from_millis(config.client.handshake_timeout_ms),
            command_timeout: Duration::from_millis(config.client.command_timeout_ms),
        }
    }

    fn validated_url(&self) -> Result<url::Url> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::connection(format!("invalid server URL {}: {e}", self.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::connection(format!(
                "server URL must use ws or wss, got {}",
                url.scheme()
            )));
        }
        Ok(url)
    }
}

// ── Command correlation ──────────────────────────────────────────────────────

enum CallError {
    Frame(ProtocolError),
    Closed,
    Timeout,
}

/// Who is waiting on a command reply.
enum Waiter {
    Caller(oneshot::Sender<Reply>),
    /// Subscribe outcomes are reported as events from the session task, so
    /// they stay ordered with the pushes that follow them.
    Subscribe { channel: String },
}

/// Assigns command ids and routes replies back to their callers.
struct Commander {
    write_tx: mpsc::UnboundedSender<String>,
    events: SessionEvents,
    pending: Mutex<HashMap<u32, Waiter>>,
    next_id: AtomicU32,
    timeout: Duration,
}

impl Commander {
    fn new(
        write_tx: mpsc::UnboundedSender<String>,
        events: SessionEvents,
        timeout: Duration,
    ) -> Self {
        Self {
            write_tx,
            events,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            timeout,
        }
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(
        &self,
        id: u32,
        request: Request,
        waiter: Waiter,
    ) -> std::result::Result<(), CallError> {
        let frame = encode_command(&Command::new(id, request)).map_err(CallError::Frame)?;
        self.pending.lock().await.insert(id, waiter);
        if self.write_tx.send(frame).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(CallError::Closed);
        }
        Ok(())
    }

    /// Send a command and wait for the matching reply.
    async fn call(&self, request: Request) -> std::result::Result<Reply, CallError> {
        let method = request.method();
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.send(id, request, Waiter::Caller(tx)).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CallError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(id, method, "command timed out");
                Err(CallError::Timeout)
            },
        }
    }

    /// Send a subscribe command; its outcome arrives as an event.
    async fn subscribe(
        self: &Arc<Self>,
        request: SubscribeRequest,
    ) -> std::result::Result<(), CallError> {
        let id = self.next_id();
        let channel = request.channel.clone();
        self.send(id, Request::Subscribe(request), Waiter::Subscribe { channel })
            .await?;

        let commands = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(commands.timeout).await;
            let expired = commands.pending.lock().await.remove(&id);
            if let Some(Waiter::Subscribe { channel }) = expired {
                warn!(id, channel = %channel, "subscribe timed out");
                commands.events.send(TransportEvent::SubscriptionError {
                    channel,
                    code: 0,
                    message: "subscribe timed out".into(),
                });
            }
        });
        Ok(())
    }

    async fn resolve(&self, reply: Reply) {
        let Some(id) = reply.id else {
            return;
        };
        let waiter = self.pending.lock().await.remove(&id);
        match waiter {
            // The caller may have timed out and dropped the receiver.
            Some(Waiter::Caller(tx)) => {
                let _ = tx.send(reply);
            },
            Some(Waiter::Subscribe { channel }) => {
                let event = match reply.error {
                    Some(ErrorShape { code, message, .. }) => TransportEvent::SubscriptionError {
                        channel,
                        code,
                        message,
                    },
                    None => TransportEvent::Subscribed { channel },
                };
                self.events.send(event);
            },
            None => debug!(id, "reply for unknown command"),
        }
    }

    /// Drop every waiter; pending calls finish with `Closed`.
    async fn close(&self) {
        self.pending.lock().await.clear();
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

struct Session {
    commands: Arc<Commander>,
    events: SessionEvents,
    shutdown: CancellationToken,
}

/// Centrifugo-compatible WebSocket transport.
pub struct WsTransport {
    options: WsOptions,
    events: EventSender,
    session: std::sync::Mutex<Option<Session>>,
}

impl WsTransport {
    /// Build the transport and the receiver its events arrive on.
    pub fn new(options: WsOptions) -> (Self, TransportEvents) {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let (events, rx) = event_channel();
        (
            Self {
                options,
                events,
                session: std::sync::Mutex::new(None),
            },
            rx,
        )
    }

    fn current(&self) -> Option<(Arc<Commander>, SessionEvents)> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| (Arc::clone(&s.commands), s.events.clone()))
    }

    fn commands(&self) -> Option<Arc<Commander>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| Arc::clone(&s.commands))
    }

    fn take_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: Option<String>) -> Result<()> {
        let url = self.options.validated_url()?;

        if let Some(previous) = self.take_session() {
            debug!(session = previous.events.session(), "replacing previous session");
            previous.shutdown.cancel();
        }

        let events = self.events.begin_session();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let commands = Arc::new(Commander::new(
            write_tx,
            events.clone(),
            self.options.command_timeout,
        ));
        let connect_id = commands.next_id();
        let hello = encode_command(&Command::new(
            connect_id,
            Request::Connect(ConnectRequest {
                token: token.unwrap_or_default(),
                name: self.options.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").into(),
            }),
        ))?;

        let shutdown = CancellationToken::new();
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            commands: Arc::clone(&commands),
            events: events.clone(),
            shutdown: shutdown.clone(),
        });

        events.send(TransportEvent::Connecting {
            reason: format!("dialing {url}"),
        });
        tokio::spawn(run_session(SessionTask {
            url: url.to_string(),
            hello,
            connect_id,
            handshake_timeout: self.options.handshake_timeout,
            commands,
            write_rx,
            events,
            shutdown,
        }));
        Ok(())
    }

    async fn disconnect(&self) {
        self.events.end_session();
        if let Some(session) = self.take_session() {
            session.shutdown.cancel();
        }
    }

    async fn subscribe(&self, channel: &str, token: Option<String>) -> Result<()> {
        let (commands, events) = self
            .current()
            .ok_or_else(|| Error::connection("not connected"))?;
        events.send(TransportEvent::Subscribing {
            channel: channel.to_owned(),
        });

        let request = SubscribeRequest {
            channel: channel.to_owned(),
            token: token.unwrap_or_default(),
        };
        match commands.subscribe(request).await {
            Ok(()) => Ok(()),
            Err(CallError::Frame(e)) => Err(e.into()),
            Err(CallError::Closed | CallError::Timeout) => {
                Err(Error::connection("connection closed"))
            },
        }
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let Some(commands) = self.commands() else {
            return Ok(());
        };
        let request = Request::Unsubscribe(UnsubscribeRequest {
            channel: channel.to_owned(),
        });
        match commands.call(request).await {
            Ok(Reply {
                error: Some(error), ..
            }) => Err(Error::Protocol(format!("unsubscribe rejected: {error}"))),
            Ok(_) | Err(CallError::Closed) => Ok(()),
            Err(CallError::Timeout) => Err(Error::connection("unsubscribe timed out")),
            Err(CallError::Frame(e)) => Err(e.into()),
        }
    }

    async fn publish(
        &self,
        channel: &str,
        data: serde_json::Value,
    ) -> std::result::Result<(), PublishError> {
        let commands = self.commands().ok_or(PublishError::NotConnected)?;
        let request = Request::Publish(PublishRequest {
            channel: channel.to_owned(),
            data,
        });
        match commands.call(request).await {
            Ok(Reply {
                error: Some(ErrorShape { code, message, .. }),
                ..
            }) => Err(PublishError::Rejected { code, message }),
            Ok(_) => Ok(()),
            Err(CallError::Timeout) => Err(PublishError::Timeout {
                after_ms: u64::try_from(self.options.command_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
            Err(CallError::Closed) => Err(PublishError::Transport("connection closed".into())),
            Err(CallError::Frame(e)) => Err(PublishError::Transport(e.to_string())),
        }
    }
}

// ── Session task ─────────────────────────────────────────────────────────────

struct SessionTask {
    url: String,
    hello: String,
    connect_id: u32,
    handshake_timeout: Duration,
    commands: Arc<Commander>,
    write_rx: mpsc::UnboundedReceiver<String>,
    events: SessionEvents,
    shutdown: CancellationToken,
}

/// How a session ended.
enum Ending {
    Closed { code: u32, reason: String },
    TokenExpired,
}

async fn run_session(task: SessionTask) {
    let events = task.events.clone();
    let commands = Arc::clone(&task.commands);

    let ending = match connect_and_run(task).await {
        Ok(ending) => ending,
        Err(e) => {
            warn!(error = %e, "session failed");
            events.send(TransportEvent::Error {
                message: e.to_string(),
            });
            Ending::Closed {
                code: CLIENT_CLOSE_CODE,
                reason: e.to_string(),
            }
        },
    };
    commands.close().await;

    events.send(match ending {
        Ending::TokenExpired => TransportEvent::TokenExpired,
        Ending::Closed { code, reason } => TransportEvent::Disconnected { code, reason },
    });
}

/// Trust the platform's root certificates.
fn build_tls_connector() -> Connector {
    let mut root_store = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = root_store.add(cert);
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Connector::Rustls(Arc::new(config))
}

/// Single connection attempt: dial, handshake, then pump frames until the
/// connection ends.
async fn connect_and_run(mut task: SessionTask) -> Result<Ending> {
    info!(url = %task.url, "connecting");
    let dial = connect_async_tls_with_config(
        task.url.as_str(),
        None,
        false,
        Some(build_tls_connector()),
    );
    let (ws_stream, _response) = tokio::select! {
        _ = task.shutdown.cancelled() => return Ok(client_close()),
        dialed = tokio::time::timeout(task.handshake_timeout, dial) => {
            dialed.map_err(|_| Error::connection("connection timed out"))??
        },
    };
    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    ws_sink.send(Message::Text(task.hello.into())).await?;

    let handshake = tokio::select! {
        _ = task.shutdown.cancelled() => {
            let _ = ws_sink.send(Message::Close(None)).await;
            return Ok(client_close());
        },
        reply = wait_for_connect_reply(&mut ws_reader, task.connect_id, task.handshake_timeout) => reply?,
    };
    let connected = match handshake {
        Ok(connected) => connected,
        Err(error) if error.is_token_expired() => {
            info!("server rejected connection token as expired");
            let _ = ws_sink.send(Message::Close(None)).await;
            return Ok(Ending::TokenExpired);
        },
        Err(error) => {
            let _ = ws_sink.send(Message::Close(None)).await;
            return Ok(Ending::Closed {
                code: error.code,
                reason: format!("connect rejected: {}", error.message),
            });
        },
    };

    info!(client_id = %connected.client, server_version = %connected.version, "connected");
    task.events.send(TransportEvent::Connected {
        client_id: connected.client.clone(),
    });

    loop {
        tokio::select! {
            _ = task.shutdown.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                return Ok(client_close());
            },
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match decode_replies(&text) {
                            Ok(replies) => replies,
                            Err(e) => {
                                warn!(error = %e, "undecodable frame");
                                task.events.send(TransportEvent::Error {
                                    message: format!("undecodable frame: {e}"),
                                });
                                continue;
                            },
                        };
                        for reply in replies {
                            if reply.is_ping() {
                                if connected.pong {
                                    ws_sink.send(Message::Text(PONG_FRAME.to_owned().into())).await?;
                                }
                            } else if let Some(push) = reply.push {
                                for event in push_events(push) {
                                    task.events.send(event);
                                }
                            } else {
                                task.commands.resolve(reply).await;
                            }
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!("WebSocket closed by server");
                        return Ok(server_close(frame));
                    },
                    None => return Ok(server_close(None)),
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Err(Error::WebSocket(e)),
                }
            },
            frame = task.write_rx.recv() => {
                match frame {
                    Some(text) => ws_sink.send(Message::Text(text.into())).await?,
                    None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        return Ok(client_close());
                    },
                }
            },
        }
    }
}

fn client_close() -> Ending {
    Ending::Closed {
        code: CLIENT_CLOSE_CODE,
        reason: "client disconnect".into(),
    }
}

fn server_close(frame: Option<CloseFrame>) -> Ending {
    match frame {
        Some(frame) => Ending::Closed {
            code: u32::from(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => Ending::Closed {
            code: CLIENT_CLOSE_CODE,
            reason: "connection closed".into(),
        },
    }
}

/// Wait for the reply to the connect command. The outer error is a
/// transport failure; the inner one is the server refusing the connection.
async fn wait_for_connect_reply(
    reader: &mut (impl StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
    connect_id: u32,
    timeout: Duration,
) -> Result<std::result::Result<ConnectResult, ErrorShape>> {
    let result = tokio::time::timeout(timeout, async {
        while let Some(msg) = reader.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    for reply in decode_replies(&text)? {
                        if reply.id != Some(connect_id) {
                            continue;
                        }
                        if let Some(error) = reply.error {
                            return Ok(Err(error));
                        }
                        return reply.connect.map(Ok).ok_or_else(|| {
                            Error::Protocol("connect reply missing result".into())
                        });
                    }
                },
                Ok(Message::Close(_)) => {
                    return Err(Error::connection(
                        "server closed connection during handshake",
                    ));
                },
                Ok(_) => {},
                Err(e) => return Err(Error::WebSocket(e)),
            }
        }
        Err(Error::connection("connection closed before handshake"))
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(Error::connection("handshake timed out")),
    }
}

/// Translate a server push into transport events.
fn push_events(push: Push) -> Vec<TransportEvent> {
    let channel = push.channel;
    let mut events = Vec::new();

    if let Some(publication) = push.publication {
        events.push(TransportEvent::Publication {
            channel: channel.clone(),
            data: publication.data.to_string().into_bytes(),
            publisher: publication.info.map(|info| Publisher {
                user: info.user,
                client: info.client,
            }),
        });
    }
    if let Some(join) = push.join {
        events.push(TransportEvent::Join {
            channel: channel.clone(),
            user: join.info.user,
        });
    }
    if let Some(leave) = push.leave {
        events.push(TransportEvent::Leave {
            channel: channel.clone(),
            user: leave.info.user,
        });
    }
    if let Some(unsub) = push.unsubscribe {
        events.push(TransportEvent::Unsubscribed {
            channel: channel.clone(),
            reason: unsub.reason,
        });
    }
    if let Some(disconnect) = push.disconnect {
        events.push(TransportEvent::Disconnected {
            code: disconnect.code,
            reason: disconnect.reason,
        });
    }
    if events.is_empty() {
        debug!(channel = %channel, "ignoring unsupported push");
    }
    events
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, courier_protocol::Publication};

    #[test]
    fn options_follow_config() {
        let mut cfg = CourierConfig::default();
        cfg.server.url = "ws://localhost:8000/connection/websocket".into();
        cfg.client.command_timeout_ms = 250;
        let opts = WsOptions::from_config(&cfg);
        assert_eq!(opts.url, "ws://localhost:8000/connection/websocket");
        assert_eq!(opts.command_timeout, Duration::from_millis(250));
        assert_eq!(opts.client_name, "courier");
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        assert!(WsOptions::new("ws://localhost/ws").validated_url().is_ok());
        assert!(matches!(
            WsOptions::new("http://localhost/ws").validated_url(),
            Err(Error::Connection(_))
        ));
        assert!(WsOptions::new("not a url").validated_url().is_err());
    }

    #[test]
    fn publication_push_becomes_event() {
        let push = Push {
            channel: "public:test".into(),
            publication: Some(Publication {
                data: serde_json::json!({"input": "hi"}),
                info: Some(courier_protocol::ClientInfo {
                    user: "42".into(),
                    client: "c-1".into(),
                }),
                offset: None,
            }),
            ..Push::default()
        };
        let events = push_events(push);
        assert_eq!(events, vec![TransportEvent::Publication {
            channel: "public:test".into(),
            data: br#"{"input":"hi"}"#.to_vec(),
            publisher: Some(Publisher {
                user: "42".into(),
                client: "c-1".into(),
            }),
        }]);
    }

    #[test]
    fn empty_push_yields_nothing() {
        assert!(push_events(Push::default()).is_empty());
    }

    #[tokio::test]
    async fn commands_are_correlated_by_id() {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        let (sender, _events) = event_channel();
        let commands = Arc::new(Commander::new(
            write_tx,
            sender.begin_session(),
            Duration::from_secs(5),
        ));

        let caller = Arc::clone(&commands);
        let call = tokio::spawn(async move {
            caller
                .call(Request::Unsubscribe(UnsubscribeRequest {
                    channel: "ch".into(),
                }))
                .await
        });

        let frame = write_rx.recv().await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let id = u32::try_from(sent["id"].as_u64().unwrap()).unwrap();
        assert_eq!(sent["unsubscribe"]["channel"], "ch");

        commands
            .resolve(Reply {
                id: Some(id),
                unsubscribe: Some(serde_json::json!({})),
                ..Reply::default()
            })
            .await;

        let reply = call.await.unwrap().ok().unwrap();
        assert_eq!(reply.id, Some(id));
    }

    #[tokio::test]
    async fn unanswered_command_times_out() {
        let (write_tx, _write_rx) = mpsc::unbounded_channel();
        let (sender, _events) = event_channel();
        let commands = Commander::new(write_tx, sender.begin_session(), Duration::from_millis(20));
        let result = commands
            .call(Request::Unsubscribe(UnsubscribeRequest {
                channel: "ch".into(),
            }))
            .await;
        assert!(matches!(result, Err(CallError::Timeout)));
        assert!(commands.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn subscribe_reply_is_reported_as_event() {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        let (sender, mut events) = event_channel();
        let commands = Arc::new(Commander::new(
            write_tx,
            sender.begin_session(),
            Duration::from_secs(5),
        ));

        for channel in ["ok", "denied"] {
            commands
                .subscribe(SubscribeRequest {
                    channel: channel.into(),
                    token: String::new(),
                })
                .await
                .ok()
                .unwrap();
        }
        let ids: Vec<u32> = (0..2)
            .map(|_| {
                let frame: serde_json::Value =
                    serde_json::from_str(&write_rx.try_recv().unwrap()).unwrap();
                u32::try_from(frame["id"].as_u64().unwrap()).unwrap()
            })
            .collect();

        commands
            .resolve(Reply {
                id: Some(ids[0]),
                subscribe: Some(serde_json::json!({})),
                ..Reply::default()
            })
            .await;
        commands
            .resolve(Reply {
                id: Some(ids[1]),
                error: Some(ErrorShape::new(103, "permission denied")),
                ..Reply::default()
            })
            .await;

        assert_eq!(events.try_recv().unwrap(), TransportEvent::Subscribed {
            channel: "ok".into()
        });
        assert_eq!(
            events.try_recv().unwrap(),
            TransportEvent::SubscriptionError {
                channel: "denied".into(),
                code: 103,
                message: "permission denied".into(),
            }
        );
    }

    #[tokio::test]
    async fn disconnect_silences_the_running_session() {
        let (transport, mut events) = WsTransport::new(WsOptions::new("ws://127.0.0.1:1/ws"));
        transport.connect(None).await.unwrap();
        transport.disconnect().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test]
    async fn commands_without_session_fail_fast() {
        let (transport, _events) = WsTransport::new(WsOptions::new("ws://127.0.0.1:1/ws"));
        assert!(matches!(
            transport.publish("ch", serde_json::json!({})).await,
            Err(PublishError::NotConnected)
        ));
        assert!(matches!(
            transport.subscribe("ch", None).await,
            Err(Error::Connection(_))
        ));
        assert!(transport.unsubscribe("ch").await.is_ok());
    }
}
