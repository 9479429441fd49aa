use {
    crate::render,
    anyhow::{Context, Result, bail},
    courier_client::{
        ChannelClient, ChannelObserver, ClientEvent, ConnectionState, SubscriptionState,
        WsOptions, WsTransport, resolve_token_provider,
    },
    courier_config::CourierConfig,
    std::{sync::Arc, time::Duration},
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

/// A connected client plus the events its observer produces.
struct Session {
    client: Arc<ChannelClient>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Session {
    async fn open(config: &CourierConfig) -> Result<Self> {
        let (transport, transport_events) = WsTransport::new(WsOptions::from_config(config));
        let (observer, events) = ChannelObserver::new();
        let client = ChannelClient::new(
            Arc::new(transport),
            resolve_token_provider(&config.auth),
            Arc::new(observer),
        );
        client.spawn_event_loop(transport_events);
        client.connect().await.context("connect failed")?;
        Ok(Self { client, events })
    }
}

fn pick_channel(config: &CourierConfig, channel: Option<String>) -> String {
    channel.unwrap_or_else(|| config.preferred_channel().to_owned())
}

fn remember_channel(channel: &str) {
    let channel = channel.to_owned();
    match courier_config::update_config(|c| c.channel.last = Some(channel)) {
        Ok(path) => debug!(path = %path.display(), "saved last channel"),
        Err(e) => warn!(error = %e, "could not save last channel"),
    }
}

/// Subscribe and print events until Ctrl-C or the connection ends.
pub async fn listen(config: CourierConfig, channel: Option<String>) -> Result<()> {
    let channel = pick_channel(&config, channel);
    let mut session = Session::open(&config).await?;
    session.client.subscribe(&channel).await?;
    remember_channel(&channel);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session.events.recv() => {
                let Some(event) = event else { break };
                println!("{}", render::local_line(&event));
                if matches!(
                    &event,
                    ClientEvent::Status(s) if s.state == ConnectionState::Disconnected
                ) {
                    break;
                }
            },
        }
    }

    session.client.disconnect().await;
    Ok(())
}

/// Connect, subscribe, publish one message, and disconnect.
pub async fn publish(config: CourierConfig, channel: Option<String>, message: &str) -> Result<()> {
    let channel = pick_channel(&config, channel);
    let wait = Duration::from_millis(
        config.client.handshake_timeout_ms + config.client.command_timeout_ms,
    );
    let mut session = Session::open(&config).await?;
    session.client.subscribe(&channel).await?;

    let ready = tokio::time::timeout(wait, async {
        while let Some(event) = session.events.recv().await {
            match event {
                ClientEvent::Subscription(s) if s.channel == channel => match s.state {
                    SubscriptionState::Subscribed => return Ok(()),
                    SubscriptionState::Error | SubscriptionState::Unsubscribed => {
                        bail!("subscription to {channel} failed: {}", s.reason)
                    },
                    SubscriptionState::Subscribing => {},
                },
                ClientEvent::Status(s)
                    if matches!(
                        s.state,
                        ConnectionState::Error | ConnectionState::Disconnected
                    ) =>
                {
                    bail!("connection {}: {}", s.state, s.reason)
                },
                _ => {},
            }
        }
        bail!("client stopped before {channel} was subscribed")
    })
    .await;

    let result = match ready {
        Ok(Ok(())) => session
            .client
            .publish(&channel, message)
            .await
            .map_err(anyhow::Error::from),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(anyhow::anyhow!(
            "timed out waiting for subscription to {channel}"
        )),
    };
    session.client.disconnect().await;
    result?;

    remember_channel(&channel);
    println!("published to {channel}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_channel_wins_over_settings() {
        let mut config = CourierConfig::default();
        config.channel.last = Some("news".into());
        assert_eq!(pick_channel(&config, Some("ops".into())), "ops");
        assert_eq!(pick_channel(&config, None), "news");
    }
}
