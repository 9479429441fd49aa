use {
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    std::collections::HashMap,
};

/// Lifecycle of one channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Subscribing,
    Subscribed,
    Unsubscribed,
    Error,
}

impl SubscriptionState {
    /// Publishing is allowed while the subscription is pending or live.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Subscribing | Self::Subscribed)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribing => write!(f, "subscribing"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One registered channel. The channel name doubles as the transport handle.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub channel: String,
    pub state: SubscriptionState,
    pub token: Option<Secret<String>>,
    /// Set once a fresh subscription token has been requested after expiry.
    pub token_refreshed: bool,
}

/// Channel name -> subscription entry. At most one entry per channel.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` in the `Subscribing` state. Returns `false` and
    /// leaves the existing entry untouched when an active entry is present;
    /// a failed or closed entry is replaced.
    pub fn insert(&mut self, channel: &str, token: Option<Secret<String>>) -> bool {
        if self.is_active(channel) {
            return false;
        }
        self.entries.insert(channel.to_owned(), SubscriptionEntry {
            channel: channel.to_owned(),
            state: SubscriptionState::Subscribing,
            token,
            token_refreshed: false,
        });
        true
    }

    pub fn remove(&mut self, channel: &str) -> Option<SubscriptionEntry> {
        self.entries.remove(channel)
    }

    /// Returns `false` if the channel is not registered.
    pub fn set_state(&mut self, channel: &str, state: SubscriptionState) -> bool {
        match self.entries.get_mut(channel) {
            Some(entry) => {
                entry.state = state;
                true
            },
            None => false,
        }
    }

    pub fn get(&self, channel: &str) -> Option<&SubscriptionEntry> {
        self.entries.get(channel)
    }

    pub fn get_mut(&mut self, channel: &str) -> Option<&mut SubscriptionEntry> {
        self.entries.get_mut(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.entries.contains_key(channel)
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.entries
            .get(channel)
            .is_some_and(|e| e.state.is_active())
    }

    /// Drop every entry, returning the removed channel names (sorted).
    pub fn clear(&mut self) -> Vec<String> {
        let mut channels: Vec<String> = self.entries.drain().map(|(k, _)| k).collect();
        channels.sort();
        channels
    }

    /// Move every active entry back to `Subscribing` and return the channels
    /// with the token each one was subscribed with, sorted by channel.
    pub fn restart_active(&mut self) -> Vec<(String, Option<String>)> {
        let mut restarted: Vec<_> = self
            .entries
            .values_mut()
            .filter(|e| e.state.is_active())
            .map(|e| {
                e.state = SubscriptionState::Subscribing;
                (
                    e.channel.clone(),
                    e.token.as_ref().map(|t| t.expose_secret().clone()),
                )
            })
            .collect();
        restarted.sort_by(|a, b| a.0.cmp(&b.0));
        restarted
    }

    /// `(channel, state)` pairs sorted by channel name.
    pub fn list(&self) -> Vec<(String, SubscriptionState)> {
        let mut list: Vec<_> = self
            .entries
            .values()
            .map(|e| (e.channel.clone(), e.state))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
