use {
    clap::Parser,
    courier_token_server::{TokenIssuer, router},
    std::{net::SocketAddr, sync::Arc, time::Duration},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "courier-token-server",
    about = "Issue HS256 connection tokens for Courier clients"
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "COURIER_TOKEN_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// HMAC secret shared with the Centrifugo server.
    #[arg(long, env = "COURIER_TOKEN_SECRET", hide_env_values = true)]
    secret: String,

    /// Token lifetime in seconds.
    #[arg(long, env = "COURIER_TOKEN_TTL_SECS", default_value_t = 3600)]
    ttl_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
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
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let issuer = Arc::new(TokenIssuer::new(
        cli.secret.clone(),
        Duration::from_secs(cli.ttl_secs),
    ));
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %listener.local_addr()?, ttl_secs = cli.ttl_secs, "token server listening");

    axum::serve(listener, router(issuer)).await?;
    Ok(())
}
