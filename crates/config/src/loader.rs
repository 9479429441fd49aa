use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CourierConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "courier.toml",
    "courier.yaml",
    "courier.yml",
    "courier.json",
];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Override the user-global config directory (e.g. from `--config-dir`).
pub fn set_config_dir(dir: PathBuf) {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *guard = Some(dir);
}

/// Drop a previous [`set_config_dir`] override.
pub fn clear_config_dir() {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

/// Returns the user-global config directory (`~/.config/courier/`), or the
/// override set with [`set_config_dir`].
pub fn config_dir() -> Option<PathBuf> {
    let guard = CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner());
    if let Some(dir) = guard.as_ref() {
        return Some(dir.clone());
    }
    directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = read_config_file(path)?;
    parse_config(&substitute_env(&raw), path)
}

/// Load config as written on disk, keeping `${ENV_VAR}` placeholders.
pub fn load_config_unexpanded(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = read_config_file(path)?;
    parse_config(&raw, path)
}

fn read_config_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./courier.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/courier/courier.{toml,yaml,yml,json}` (user-global)
///
/// `COURIER_*` environment overrides are applied on top. Returns the
/// defaults (plus overrides) if no config file is found or it fails to parse.
pub fn discover_and_load() -> CourierConfig {
    let config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                CourierConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        CourierConfig::default()
    };
    apply_env_overrides(config)
}

/// Apply `COURIER_URL`, `COURIER_TOKEN`, `COURIER_TOKEN_ENDPOINT`,
/// `COURIER_USER_ID` and `COURIER_CHANNEL` on top of a loaded config.
pub fn apply_env_overrides(config: CourierConfig) -> CourierConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: CourierConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CourierConfig {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("COURIER_URL") {
        config.server.url = url;
    }
    if let Some(token) = get("COURIER_TOKEN") {
        config.auth.token = Some(Secret::new(token));
    }
    if let Some(endpoint) = get("COURIER_TOKEN_ENDPOINT") {
        config.auth.token_endpoint = Some(endpoint);
    }
    if let Some(user_id) = get("COURIER_USER_ID") {
        config.auth.user_id = user_id;
    }
    if let Some(channel) = get("COURIER_CHANNEL") {
        config.channel.default = channel;
    }
    config
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courier.toml")
}

/// Serialize `config` to TOML and write it to the discovered config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &CourierConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    save_config_to(&path, config)?;
    Ok(path)
}

/// Write `config` to `path`, choosing the format from the extension.
pub fn save_config_to(path: &Path, config: &CourierConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let rendered = match ext {
        "toml" => toml::to_string_pretty(config)
            .map_err(|e| anyhow::anyhow!("serialize config: {e}"))?,
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    };
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Load the current settings file, apply `f`, and write it back.
///
/// Neither `${ENV_VAR}` substitution nor env overrides are applied, so
/// values taken from the environment never end up in the file.
pub fn update_config(f: impl FnOnce(&mut CourierConfig)) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    update_config_at(&path, f)?;
    Ok(path)
}

/// [`update_config`] for an explicit path.
pub fn update_config_at(path: &Path, f: impl FnOnce(&mut CourierConfig)) -> anyhow::Result<()> {
    let mut config = if path.exists() {
        load_config_unexpanded(path)?
    } else {
        CourierConfig::default()
    };
    f(&mut config);
    save_config_to(path, &config)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CourierConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn toml_round_trip_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("courier.toml");

        let mut config = CourierConfig::default();
        config.server.url = "ws://localhost:8000/connection/websocket".into();
        config.auth.token = Some(Secret::new("abc".into()));
        config.channel.last = Some("news".into());
        save_config_to(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.server.url, "ws://localhost:8000/connection/websocket");
        assert_eq!(
            loaded.auth.token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("abc")
        );
        assert_eq!(loaded.channel.last.as_deref(), Some("news"));
        assert_eq!(loaded.client.name, "courier");
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[server]\nurl = \"ws://example\"\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.server.url, "ws://example");
        assert_eq!(loaded.auth.user_id, "testuser");
        assert!(loaded.auth.token.is_none());
        assert_eq!(loaded.channel.default, "public:test");
    }

    #[test]
    fn json_and_yaml_are_supported() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("courier.json");
        std::fs::write(&json, r#"{"auth": {"user_id": "alice"}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().auth.user_id, "alice");

        let yaml = dir.path().join("courier.yaml");
        std::fs::write(&yaml, "channel:\n  default: chat\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().channel.default, "chat");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.ini");
        std::fs::write(&path, "x").unwrap();
        assert!(load_config(&path).is_err());
        assert!(save_config_to(&path, &CourierConfig::default()).is_err());
    }

    #[test]
    fn update_keeps_env_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(
            &path,
            "[server]\nurl = \"${COURIER_TEST_URL}\"\n\n[auth]\ntoken = \"${COURIER_TEST_SECRET}\"\n",
        )
        .unwrap();

        update_config_at(&path, |c| c.channel.last = Some("news".into())).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("${COURIER_TEST_SECRET}"), "{written}");
        assert!(written.contains("${COURIER_TEST_URL}"), "{written}");
        let reloaded = load_config_unexpanded(&path).unwrap();
        assert_eq!(reloaded.channel.last.as_deref(), Some("news"));
    }

    #[test]
    fn update_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("courier.toml");
        update_config_at(&path, |c| c.auth.user_id = "alice".into()).unwrap();
        assert_eq!(load_config(&path).unwrap().auth.user_id, "alice");
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let lookup = |name: &str| match name {
            "COURIER_URL" => Some("wss://prod/connection/websocket".to_string()),
            "COURIER_TOKEN" => Some("from-env".to_string()),
            "COURIER_CHANNEL" => Some("   ".to_string()),
            _ => None,
        };
        let config = apply_env_overrides_with(CourierConfig::default(), lookup);
        assert_eq!(config.server.url, "wss://prod/connection/websocket");
        assert_eq!(
            config.auth.token.as_ref().map(|t| t.expose_secret().as_str()),
            Some("from-env")
        );
        // Blank values are ignored.
        assert_eq!(config.channel.default, "public:test");
    }
}
