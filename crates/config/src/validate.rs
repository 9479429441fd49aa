//! Semantic checks on a loaded configuration.

use crate::schema::{CourierConfig, DEFAULT_SERVER_URL};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "server.url"
    pub path: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Check that the settings can plausibly drive a connection.
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match url::Url::parse(&config.server.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {
            if config.server.url == DEFAULT_SERVER_URL {
                result.push(
                    Severity::Warning,
                    "server.url",
                    "still set to the placeholder endpoint",
                );
            }
        },
        Ok(url) => result.push(
            Severity::Error,
            "server.url",
            format!("scheme must be ws or wss, got {}", url.scheme()),
        ),
        Err(e) => result.push(Severity::Error, "server.url", format!("invalid URL: {e}")),
    }

    if let Some(endpoint) = config.auth.token_endpoint.as_deref() {
        match url::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {},
            Ok(url) => result.push(
                Severity::Error,
                "auth.token_endpoint",
                format!("scheme must be http or https, got {}", url.scheme()),
            ),
            Err(e) => result.push(
                Severity::Error,
                "auth.token_endpoint",
                format!("invalid URL: {e}"),
            ),
        }
        if config.auth.user_id.trim().is_empty() {
            result.push(
                Severity::Error,
                "auth.user_id",
                "required when a token endpoint is configured",
            );
        }
    } else if config.auth.token.is_none() {
        result.push(
            Severity::Warning,
            "auth.token",
            "no token or token endpoint configured; connecting anonymously",
        );
    }

    if config.channel.default.trim().is_empty() {
        result.push(Severity::Error, "channel.default", "must not be empty");
    }

    result
}
