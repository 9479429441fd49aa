mod channel_commands;
mod config_commands;
mod render;

use {
    clap::{Parser, Subcommand},
    courier_config::CourierConfig,
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: real-time channel client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/courier/).
    #[arg(long, global = true, env = "COURIER_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,

    /// WebSocket endpoint (overrides config value).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Connection token (overrides config value).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Token endpoint used when the token is missing or expired.
    #[arg(long, global = true)]
    token_endpoint: Option<String>,

    /// User id sent to the token endpoint.
    #[arg(long, global = true)]
    user_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a channel and print everything that arrives.
    Listen {
        /// Channel name; defaults to the last channel used.
        #[arg(short, long)]
        channel: Option<String>,
    },
    /// Publish one message to a channel.
    Publish {
        #[arg(short, long)]
        channel: Option<String>,
        #[arg(short, long)]
        message: String,
    },
    /// Settings management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Discovered settings with command-line overrides applied on top.
fn effective_config(cli: &Cli) -> CourierConfig {
    let mut config = courier_config::discover_and_load();
    if let Some(url) = &cli.url {
        config.server.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.auth.token = Some(Secret::new(token.clone()));
    }
    if let Some(endpoint) = &cli.token_endpoint {
        config.auth.token_endpoint = Some(endpoint.clone());
    }
    if let Some(user_id) = &cli.user_id {
        config.auth.user_id = user_id.clone();
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(ref dir) = cli.config_dir {
        courier_config::set_config_dir(dir.clone());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");
    let config = effective_config(&cli);

    match cli.command {
        Commands::Listen { channel } => channel_commands::listen(config, channel).await,
        Commands::Publish { channel, message } => {
            channel_commands::publish(config, channel, &message).await
        },
        Commands::Config { action } => config_commands::handle_config(action, &config),
    }
}
