#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end runs of the facade over a real WebSocket, against a minimal
//! in-process Centrifugo-style server.

use {
    courier_client::{
        ChannelClient, ChannelObserver, ClientEvent, ConnectionState, FallbackTokenProvider,
        HttpTokenProvider, MessageType, StaticToken, SubscriptionState, TokenProvider, WsOptions,
        WsTransport,
    },
    courier_token_server::TokenIssuer,
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    std::{sync::Arc, time::Duration},
    tokio::{net::TcpListener, sync::mpsc},
    tokio_tungstenite::{accept_async, tungstenite::Message},
};

/// Accepts connections forever. Connect commands carrying the token
/// `stale` are refused as expired; subscribes are acknowledged and followed
/// by one publication; everything the client sends is reported on the
/// returned receiver.
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let command: Value = serde_json::from_str(&text).unwrap();
                    let _ = seen_tx.send(command.clone());
                    let id = command["id"].clone();

                    let mut replies = Vec::new();
                    if let Some(connect) = command.get("connect") {
                        if connect["token"] == "stale" {
                            replies.push(json!({
                                "id": id,
                                "error": {"code": 109, "message": "token expired"}
                            }));
                        } else {
                            replies.push(json!({
                                "id": id,
                                "connect": {"client": "c-1", "version": "test", "ping": 25, "pong": true}
                            }));
                        }
                    } else if let Some(subscribe) = command.get("subscribe") {
                        let channel = subscribe["channel"].clone();
                        replies.push(json!({"id": id, "subscribe": {}}));
                        replies.push(json!({
                            "push": {
                                "channel": channel,
                                "pub": {"data": {"input": "hi"}, "info": {"user": "42", "client": "c-2"}}
                            }
                        }));
                    } else if command.get("publish").is_some() {
                        replies.push(json!({"id": id, "publish": {}}));
                    } else if command.get("unsubscribe").is_some() {
                        replies.push(json!({"id": id, "unsubscribe": {}}));
                    }

                    // Replies are newline-batched like the real server does.
                    let batch = replies
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !batch.is_empty() && ws.send(Message::Text(batch.into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (format!("ws://{addr}/connection/websocket"), seen_rx)
}

async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_state(event: &ClientEvent, state: ConnectionState) -> bool {
    matches!(event, ClientEvent::Status(s) if s.state == state)
}

fn client_for(url: String, tokens: Arc<dyn TokenProvider>) -> (
    Arc<ChannelClient>,
    mpsc::UnboundedReceiver<ClientEvent>,
) {
    let (transport, transport_events) = WsTransport::new(WsOptions::new(url));
    let (observer, events) = ChannelObserver::new();
    let client = ChannelClient::new(Arc::new(transport), tokens, Arc::new(observer));
    client.spawn_event_loop(transport_events);
    (client, events)
}

#[tokio::test]
async fn subscribe_receive_publish_over_websocket() {
    let (url, mut seen) = spawn_server().await;
    let (client, mut events) = client_for(url, Arc::new(StaticToken::new("good")));

    client.connect().await.unwrap();
    wait_for(&mut events, |e| is_state(e, ConnectionState::Connected)).await;

    client.subscribe("public:test").await.unwrap();
    let message = wait_for(&mut events, |e| matches!(e, ClientEvent::Message(_))).await;
    let ClientEvent::Message(message) = message else {
        unreachable!()
    };
    assert_eq!(message.text, "hi");
    assert_eq!(message.kind, MessageType::Text);
    assert_eq!(message.sender_id.as_deref(), Some("42"));
    assert_eq!(client.subscriptions().await, vec![(
        "public:test".to_string(),
        SubscriptionState::Subscribed
    )]);

    client.publish("public:test", "yo").await.unwrap();

    let mut commands = Vec::new();
    while let Ok(command) = seen.try_recv() {
        commands.push(command);
    }
    assert_eq!(commands[0]["connect"]["token"], "good");
    assert_eq!(commands[0]["connect"]["name"], "courier");
    assert!(commands.iter().any(|c| c["publish"]
        == json!({"channel": "public:test", "data": {"input": "yo"}})));

    client.disconnect().await;
    assert!(client.subscriptions().await.is_empty());
    wait_for(&mut events, |e| is_state(e, ConnectionState::Disconnected)).await;
}

#[tokio::test]
async fn expired_token_is_refetched_from_token_server() {
    let issuer = Arc::new(TokenIssuer::new("integration-secret", Duration::from_secs(60)));
    let token_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let token_addr = token_listener.local_addr().unwrap();
    let app = courier_token_server::router(Arc::clone(&issuer));
    tokio::spawn(async move {
        let _ = axum::serve(token_listener, app).await;
    });

    let (url, mut seen) = spawn_server().await;
    let tokens = Arc::new(FallbackTokenProvider::new(
        StaticToken::new("stale"),
        HttpTokenProvider::new(format!("http://{token_addr}/token"), "alice"),
    ));
    let (client, mut events) = client_for(url, tokens);

    client.connect().await.unwrap();
    wait_for(&mut events, |e| is_state(e, ConnectionState::Connected)).await;

    let first = seen.recv().await.unwrap();
    assert_eq!(first["connect"]["token"], "stale");
    let second = seen.recv().await.unwrap();
    let fresh = second["connect"]["token"].as_str().unwrap();
    let claims = issuer.verify(fresh).unwrap();
    assert_eq!(claims.sub, "alice");

    client.disconnect().await;
}

#[tokio::test]
async fn unreachable_server_reports_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, mut events) = client_for(
        format!("ws://{addr}/connection/websocket"),
        Arc::new(StaticToken::anonymous()),
    );
    client.connect().await.unwrap();

    wait_for(&mut events, |e| is_state(e, ConnectionState::Error)).await;
    wait_for(&mut events, |e| is_state(e, ConnectionState::Disconnected)).await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_after_disconnect_keeps_new_subscriptions() {
    let (url, _seen) = spawn_server().await;
    let (client, mut events) = client_for(url, Arc::new(StaticToken::new("good")));

    client.connect().await.unwrap();
    wait_for(&mut events, |e| is_state(e, ConnectionState::Connected)).await;
    client.disconnect().await;
    wait_for(&mut events, |e| is_state(e, ConnectionState::Disconnected)).await;

    client.connect().await.unwrap();
    client.subscribe("public:test").await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::Subscription(s) if s.state == SubscriptionState::Subscribed)
    })
    .await;

    // Give the closed session time to wind down.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let late: Vec<ClientEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(
        !late.iter().any(|e| is_state(e, ConnectionState::Disconnected)),
        "late events: {late:?}"
    );
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(client.subscriptions().await, vec![(
        "public:test".to_string(),
        SubscriptionState::Subscribed
    )]);
}
