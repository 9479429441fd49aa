use {
    anyhow::{Result, bail},
    clap::Subcommand,
    courier_config::{
        CourierConfig,
        validate::{self, Severity},
    },
    secrecy::Secret,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings (token redacted).
    Show,
    /// Print the path of the settings file.
    Path,
    /// Change one setting and save it.
    Set { key: String, value: String },
    /// Validate the settings and report errors/warnings.
    Check,
}

pub fn handle_config(action: ConfigAction, config: &CourierConfig) -> Result<()> {
    match action {
        ConfigAction::Show => show(config),
        ConfigAction::Path => {
            println!("{}", courier_config::find_or_default_config_path().display());
            Ok(())
        },
        ConfigAction::Set { key, value } => set(&key, value),
        ConfigAction::Check => check(config),
    }
}

fn show(config: &CourierConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.auth.token.is_some() {
        shown.auth.token = Some(Secret::new("[REDACTED]".into()));
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

/// Keys accepted by `config set`.
const SETTABLE_KEYS: &[&str] = &[
    "server.url",
    "auth.token",
    "auth.token_endpoint",
    "auth.user_id",
    "channel.default",
    "channel.last",
    "client.name",
    "client.handshake_timeout_ms",
    "client.command_timeout_ms",
];

fn apply(config: &mut CourierConfig, key: &str, value: String) -> Result<()> {
    let optional = |v: String| (!v.is_empty()).then_some(v);
    match key {
        "server.url" => config.server.url = value,
        "auth.token" => config.auth.token = optional(value).map(Secret::new),
        "auth.token_endpoint" => config.auth.token_endpoint = optional(value),
        "auth.user_id" => config.auth.user_id = value,
        "channel.default" => config.channel.default = value,
        "channel.last" => config.channel.last = optional(value),
        "client.name" => config.client.name = value,
        "client.handshake_timeout_ms" => config.client.handshake_timeout_ms = value.parse()?,
        "client.command_timeout_ms" => config.client.command_timeout_ms = value.parse()?,
        _ => bail!(
            "unknown setting {key}; expected one of: {}",
            SETTABLE_KEYS.join(", ")
        ),
    }
    Ok(())
}

fn set(key: &str, value: String) -> Result<()> {
    // Validate the key before touching the file.
    apply(&mut CourierConfig::default(), key, value.clone())?;

    let mut result = Ok(());
    let path = courier_config::update_config(|c| result = apply(c, key, value))?;
    result?;
    eprintln!("saved {key} to {}", path.display());
    Ok(())
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &CourierConfig) -> Result<()> {
    let result = validate::validate(config);

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = result.diagnostics.len() - errors;

    if result.diagnostics.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn apply_sets_known_keys() {
        let mut config = CourierConfig::default();
        apply(&mut config, "server.url", "ws://localhost:8000/ws".into()).unwrap();
        apply(&mut config, "auth.token", "jwt".into()).unwrap();
        apply(&mut config, "client.command_timeout_ms", "2500".into()).unwrap();
        apply(&mut config, "channel.last", String::new()).unwrap();

        assert_eq!(config.server.url, "ws://localhost:8000/ws");
        assert_eq!(
            config.auth.token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("jwt")
        );
        assert_eq!(config.client.command_timeout_ms, 2500);
        assert!(config.channel.last.is_none());
    }

    #[test]
    fn apply_rejects_unknown_keys_and_bad_numbers() {
        let mut config = CourierConfig::default();
        let err = apply(&mut config, "server.port", "80".into()).unwrap_err();
        assert!(err.to_string().contains("unknown setting server.port"));
        assert!(apply(&mut config, "client.handshake_timeout_ms", "soon".into()).is_err());
    }
}
