//! Settings loading, saving, validation and env substitution.
//!
//! Config files: `courier.toml`, `courier.yaml`, or `courier.json`
//! Searched in `./` then `~/.config/courier/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values and `COURIER_*`
//! environment overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, discover_and_load,
        find_or_default_config_path, load_config, load_config_unexpanded, save_config,
        save_config_to, set_config_dir, update_config, update_config_at,
    },
    schema::{
        AuthConfig, ChannelConfig, ClientConfig, CourierConfig, DEFAULT_CHANNEL,
        DEFAULT_SERVER_URL, ServerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
