use anyhow::Context;
use clap::{Parser, Subcommand};
use slackrelay_core::config::{config_dir, AppConfig};
use slackrelay_core::secrets::mask_secret;
use slackrelay_server::signature;
use slackrelay_server::{Gateway, RelayContext};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod verify;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "slackrelay")]
#[command(version = VERSION)]
#[command(about = "Relay Slack mentions and DMs to a task backend and post the answers back")]
struct Cli {
    /// Config file (defaults to ~/.slackrelay/config.{toml,json,yaml})
    #[arg(short, long, global = true, env = "SLACKRELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default)
    Serve,
    /// Validate configuration and print it with secrets masked
    Check {
        /// Also call Slack `auth.test` and read the backend state
        #[arg(long)]
        live: bool,
    },
    /// Print signature headers for a request body, for local webhook testing
    Sign {
        /// File containing the exact request body
        #[arg(short, long)]
        body_file: PathBuf,
        /// Unix timestamp to sign with (defaults to now)
        #[arg(short, long)]
        timestamp: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the guard alive so buffered audit records are flushed on exit.
    let _guard = init_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.clone()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Check { live } => check(&config, live).await,
        Commands::Sign {
            body_file,
            timestamp,
        } => sign(&config, &body_file, timestamp),
    }
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(config_dir().join("logs"), "audit.jsonl"),
    );

    let audit_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(tracing_subscriber::filter::Targets::new().with_target("audit", Level::INFO));

    let stdout_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "audit"
        }));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(audit_layer)
        .init();

    guard
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host / server.port")?;

    let ctx = RelayContext::from_config(&config)?;
    info!(
        bot = %config.slack.bot_user_id,
        token = %mask_secret(&config.slack.bot_token),
        backend = %config.backend.base_url,
        poll_interval_ms = config.polling.interval_ms,
        max_polls = config.polling.max_polls,
        "Starting slackrelay {}",
        VERSION
    );

    let gateway = Gateway::new(ctx, config.slack.signing_secret.clone(), addr);
    gateway
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received");
        })
        .await
}

async fn check(config: &AppConfig, live: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    println!("✅ Configuration is valid");

    if live {
        let mut failed = false;
        for result in [verify::verify_slack(config).await, verify::verify_backend(config).await] {
            match result {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    failed = true;
                    println!("{}", e);
                }
            }
        }
        if failed {
            anyhow::bail!("live checks failed");
        }
    }
    Ok(())
}

fn sign(config: &AppConfig, body_file: &PathBuf, timestamp: Option<i64>) -> anyhow::Result<()> {
    let body = std::fs::read(body_file)
        .with_context(|| format!("failed to read {}", body_file.display()))?;
    let ts = timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp())
        .to_string();
    let sig = signature::sign(&config.slack.signing_secret, &ts, &body)
        .context("signing secret cannot be used as an HMAC key")?;

    println!("X-Request-Timestamp: {}", ts);
    println!("X-Signature: {}", sig);
    Ok(())
}
