//! Real-time channel client facade.
//!
//! A [`ChannelClient`] owns one transport connection, zero or more named
//! subscriptions, and an [`Observer`] that receives status changes and
//! inbound messages. The transport sits behind the [`Transport`] trait;
//! [`WsTransport`] speaks the Centrifugo client protocol over WebSocket.

pub mod client;
pub mod error;
pub mod message;
pub mod registry;
pub mod sink;
pub mod token;
pub mod transport;
pub mod ws;

pub use {
    client::{ChannelClient, ConnectOutcome, ConnectionState, SubscribeOutcome, UnsubscribeOutcome},
    error::{Error, PublishError, Result, TokenError},
    message::{ChannelMessage, DecodeError, MessageType, Publisher, decode_publication},
    registry::{SubscriptionEntry, SubscriptionRegistry, SubscriptionState},
    sink::{
        ChannelObserver, ClientEvent, Clock, FnObserver, MessageSink, Observer, StatusUpdate,
        SubscriptionUpdate, SystemClock,
    },
    token::{
        FallbackTokenProvider, HttpTokenProvider, StaticToken, TokenProvider,
        resolve_token_provider,
    },
    transport::{
        EventSender, SessionEvents, Transport, TransportEvent, TransportEvents, event_channel,
    },
    ws::{WsOptions, WsTransport},
};
