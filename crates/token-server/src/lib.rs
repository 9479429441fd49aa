//! Connection token endpoint.
//!
//! `GET /token?user_id=<id>` answers `{"token": "<jwt>"}`, an HS256 token
//! with `sub` set to the user id, signed with the Centrifugo HMAC secret.

use {
    axum::{
        Json, Router,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    std::{sync::Arc, time::Duration},
    tracing::{debug, error},
};

/// Token lifetime used when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Claims carried by issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Signs and checks connection tokens.
pub struct TokenIssuer {
    secret: Secret<String>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: Secret::new(secret.into()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str) -> jsonwebtoken::errors::Result<String> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));
        let claims = Claims {
            sub: user_id.to_owned(),
            exp: (chrono::Utc::now() + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
    }

    /// Check the signature and expiry of `token`.
    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

/// Router serving `GET /token`.
pub fn router(issuer: Arc<TokenIssuer>) -> Router {
    Router::new()
        .route("/token", get(token_handler))
        .with_state(issuer)
}

async fn token_handler(
    State(issuer): State<Arc<TokenIssuer>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    if query.user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "user_id is required").into_response();
    }

    match issuer.issue(&query.user_id) {
        Ok(token) => {
            debug!(user_id = %query.user_id, "issued token");
            Json(TokenResponse { token }).into_response()
        },
        Err(e) => {
            error!(error = %e, "failed to sign token");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to generate token").into_response()
        },
    }
}
