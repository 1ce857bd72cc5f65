//! vqa-proxy: HTTP proxy for a remote image+audio VQA inference service
//!
//! Sits between a browser frontend and a hosted VQA model:
//! - Relays multipart image+audio uploads to the remote predict endpoint
//! - Optionally verifies JWT bearer tokens
//! - Cleans up per-request scratch files on every exit path

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

use vqa_proxy::{config::AppConfig, proxy::server::build_http_client, run_server};

#[derive(Parser)]
#[command(name = "vqa-proxy")]
#[command(version = "0.1.0")]
#[command(about = "HTTP proxy for a remote image+audio VQA inference service")]
#[command(long_about = "
vqa-proxy relays image+audio question-answering requests to a hosted model:
  - POST /predict forwards a multipart upload pair to the remote service
  - Optional JWT bearer-token verification (JWT_SECRET)
  - Per-request scratch files with guaranteed cleanup

Example usage:
  vqa-proxy run --config config.yaml
  vqa-proxy test-backend
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port (beats config file and PORT env)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Test connection to the remote inference service
    TestBackend,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port } => {
            run_proxy(cli.config, port).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config)?;
        }
        Commands::TestBackend => {
            test_backend(cli.config).await?;
        }
    }

    Ok(())
}

/// Run the proxy server
async fn run_proxy(
    config_path: PathBuf,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(&config_path);

    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Loading configuration from {:?}", config_path);

    if config.auth.enabled && config.auth.secret.is_none() {
        tracing::warn!(
            "Auth is enabled but JWT_SECRET is not set; /predict will answer 500 until it is"
        );
    }

    run_server(config).await?;

    Ok(())
}

/// Validate configuration file
fn check_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match AppConfig::load(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nBackend:");
            println!("  URL: {}", config.backend.base_url());
            println!("  Predict endpoint: {}", config.backend.predict_url());
            println!(
                "  Timeout: {}",
                if config.backend.timeout_seconds == 0 {
                    "unbounded".to_string()
                } else {
                    format!("{}s", config.backend.timeout_seconds)
                }
            );
            println!(
                "  File params: {} / {}",
                config.backend.image_param, config.backend.audio_param
            );
            println!("\nAuth:");
            println!("  Enabled: {}", config.auth.enabled);
            println!(
                "  Secret: {}",
                if config.auth.secret.is_some() {
                    "configured"
                } else {
                    "NOT SET"
                }
            );
            println!("\nCORS:");
            for origin in &config.cors.allowed_origins {
                println!("  {}", origin);
            }
            println!("\nUploads:");
            println!("  Scratch dir: {}", config.uploads.dir);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Test connection to the remote inference service
async fn test_backend(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(&config_path);
    let probe_url = config.backend.probe_url();

    println!("Testing connection to backend: {}", probe_url);

    let client = build_http_client(&config.backend)?;

    match client.get(&probe_url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("✓ Backend is reachable");
                println!("  Status: {}", resp.status());
                if let Ok(body) = resp.text().await {
                    println!("  Response: {}", body.trim());
                }
                println!(
                    "\nPredict endpoint: {} (params: {} / {})",
                    config.backend.predict_url(),
                    config.backend.image_param,
                    config.backend.audio_param
                );
            } else {
                println!("✗ Backend returned error status: {}", resp.status());
            }
        }
        Err(e) => {
            println!("✗ Failed to connect to backend: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: &PathBuf) -> AppConfig {
    match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
