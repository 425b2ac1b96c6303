//! Ferry - resilient content-fetch relay.
//!
//! Runs the HTTP relay endpoint. The generative rewrite step is enabled when
//! a Gemini API key is configured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ferry_fetch::{
    GeminiGenerator, NoopGenerator, Relay, RelayConfig, TextGenerator, DEFAULT_GEMINI_MODEL,
};
use ferry_server::{Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};

/// Ferry - resilient content-fetch relay
#[derive(Parser, Debug)]
#[command(name = "ferry", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "FERRY_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(long, env = "FERRY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rotated log files
    #[arg(long)]
    log_file: bool,

    /// Directory for log files (implies --log-file)
    #[arg(long, env = "FERRY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Gemini API key for the generative rewrite step
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "FERRY_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Disable the generative rewrite step
    #[arg(long)]
    no_ai_rewrite: bool,

    /// Per-identity attempt timeout in seconds
    #[arg(long, default_value_t = 15)]
    attempt_timeout: u64,
}

/// Get the default logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "ferry", "Ferry").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize console logging, plus a rotating file when requested.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ferry={},warn", log_level)));

    let log_dir = match (&args.log_dir, args.log_file) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => logs_dir(),
        (None, false) => None,
    };

    if let Some(log_dir) = log_dir {
        let file_appender = std::fs::create_dir_all(&log_dir).ok().and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("ferry")
                .filename_suffix("log")
                .build(&log_dir)
                .ok()
        });

        if let Some(appender) = file_appender {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }

        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        tracing::warn!("File logging unavailable, using console only");
        return None;
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    None
}

/// Builds the relay from command-line settings.
fn build_relay(args: &Args) -> Relay {
    let config = RelayConfig::default()
        .with_attempt_timeout(Duration::from_secs(args.attempt_timeout))
        .with_ai_rewrite(!args.no_ai_rewrite);

    let generator: Arc<dyn TextGenerator> = match args.gemini_api_key.as_deref() {
        Some(key) if !key.is_empty() && !args.no_ai_rewrite => {
            tracing::info!(model = %args.gemini_model, "Generative rewrite enabled");
            Arc::new(GeminiGenerator::new(key, args.gemini_model.clone()))
        }
        _ => {
            tracing::info!("Generative rewrite disabled");
            Arc::new(NoopGenerator)
        }
    };

    Relay::new(config).with_generator(generator)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Ferry v{}", env!("CARGO_PKG_VERSION"));

    let relay = build_relay(&args);
    let config = ServerConfig::default()
        .with_host(args.host.clone())
        .with_port(args.port);
    let server = Server::new(config, relay)?;

    server.run().await?;

    tracing::info!("Ferry shutting down");
    Ok(())
}
