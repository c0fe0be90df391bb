use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_quota::config::{AppConfig, LogFormat, LoggingConfig, StoreBackend};
use ai_quota::ratelimit::DEFAULT_OPERATION_TYPE;
use ai_quota::store::build_policy;

/// Inspect and exercise AI quotas stored in the shared window store.
#[derive(Debug, Parser)]
#[command(name = "ai-quota", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the configured Redis URL
    #[arg(long, global = true)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check and consume one unit of quota, as an AI call would
    Check(Target),
    /// Show current usage without consuming quota
    Usage(Target),
    /// Forget every recorded event for the user and operation type
    Reset(Target),
}

#[derive(Debug, Args)]
struct Target {
    /// User identifier
    user_id: String,

    /// Operation type namespace
    #[arg(short, long, default_value = DEFAULT_OPERATION_TYPE)]
    operation_type: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(url) = &cli.redis_url {
        config.store.backend = StoreBackend::Redis;
        config.store.url = url.clone();
    }

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting ai-quota");
    if let Some(path) = &cli.config {
        info!(path = %path, "Loaded configuration");
    }

    let policy = build_policy(&config).await?;

    let output = match &cli.command {
        Command::Check(target) => {
            let result = policy.check_limit(&target.user_id, &target.operation_type).await?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Usage(target) => {
            let usage = policy.usage(&target.user_id, &target.operation_type).await?;
            serde_json::to_string_pretty(&usage)?
        }
        Command::Reset(target) => {
            policy.reset(&target.user_id, &target.operation_type).await?;
            serde_json::json!({ "reset": true }).to_string()
        }
    };

    println!("{}", output);
    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_thread_ids(true).init(),
    }
}
