//! Connection and subscription token sources.

use {
    crate::error::TokenError,
    async_trait::async_trait,
    courier_config::AuthConfig,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    std::sync::Arc,
    tracing::{debug, info},
};

/// Supplies auth tokens to the connection manager.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token for the initial connect. `None` connects anonymously.
    async fn connection_token(&self) -> Result<Option<String>, TokenError>;

    /// Fresh token after the server reported the current one expired.
    async fn refresh_connection_token(&self) -> Result<String, TokenError> {
        Err(TokenError::Unsupported {
            what: "connection token",
        })
    }

    /// Token for a channel whose subscription token expired.
    async fn subscription_token(&self, _channel: &str) -> Result<String, TokenError> {
        Err(TokenError::Unsupported {
            what: "subscription token",
        })
    }
}

// ── Static ───────────────────────────────────────────────────────────────────

/// A fixed token (or none). Never refreshes.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<Secret<String>>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(Secret::new(token.into())))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl From<Option<Secret<String>>> for StaticToken {
    fn from(token: Option<Secret<String>>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn connection_token(&self) -> Result<Option<String>, TokenError> {
        Ok(self
            .0
            .as_ref()
            .map(|t| t.expose_secret().clone())
            .filter(|t| !t.is_empty()))
    }
}

// ── HTTP endpoint ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Fetches tokens from `GET {endpoint}?user_id=<id>`, which answers
/// `{"token": "<jwt>"}`.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: Client,
    endpoint: String,
    user_id: String,
}

impl HttpTokenProvider {
    pub fn new(endpoint: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint, user_id)
    }

    pub fn with_client(
        client: Client,
        endpoint: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            user_id: user_id.into(),
        }
    }

    pub async fn fetch(&self) -> Result<String, TokenError> {
        debug!(endpoint = %self.endpoint, user_id = %self.user_id, "fetching token");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("user_id", self.user_id.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::Status { status, body });
        }

        let body: TokenResponse = resp.json().await?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Missing)?;

        info!(user_id = %self.user_id, "fetched token");
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn connection_token(&self) -> Result<Option<String>, TokenError> {
        self.fetch().await.map(Some)
    }

    async fn refresh_connection_token(&self) -> Result<String, TokenError> {
        self.fetch().await
    }
}

// ── Configured token with endpoint fallback ──────────────────────────────────

/// Uses the configured token first and the endpoint when it is missing or
/// expired.
#[derive(Debug, Clone)]
pub struct FallbackTokenProvider {
    initial: StaticToken,
    fetch: HttpTokenProvider,
}

impl FallbackTokenProvider {
    pub fn new(initial: StaticToken, fetch: HttpTokenProvider) -> Self {
        Self { initial, fetch }
    }
}

#[async_trait]
impl TokenProvider for FallbackTokenProvider {
    async fn connection_token(&self) -> Result<Option<String>, TokenError> {
        match self.initial.connection_token().await? {
            Some(token) => Ok(Some(token)),
            None => self.fetch.connection_token().await,
        }
    }

    async fn refresh_connection_token(&self) -> Result<String, TokenError> {
        self.fetch.fetch().await
    }
}

/// Pick the provider matching the configured credentials.
pub fn resolve_token_provider(auth: &AuthConfig) -> Arc<dyn TokenProvider> {
    let initial = StaticToken::from(auth.token.clone());
    match auth.token_endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => Arc::new(FallbackTokenProvider::new(
            initial,
            HttpTokenProvider::new(endpoint, auth.user_id.clone()),
        )),
        None => Arc::new(initial),
    }
}
