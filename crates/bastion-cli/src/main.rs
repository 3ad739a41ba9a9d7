//! BASTION CLI
//!
//! Command-line interface for the BASTION Caldera/Wazuh correlation service.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use bastion_observability::{init_logging_with_config, LoggingConfig};
use commands::{run_check, run_correlate, run_server, show_config, ServeConfig};
use config::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "config/bastion.yaml";

#[derive(Parser)]
#[command(name = "bastion")]
#[command(version)]
#[command(
    about = "Correlates Caldera adversary emulation with Wazuh detections",
    long_about = None
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,
    },

    /// Correlate one Caldera operation and print its coverage report
    Correlate {
        /// Caldera operation id
        #[arg(long)]
        op_id: String,

        /// Match window in seconds
        #[arg(short, long)]
        window: Option<i64>,

        /// Alert index pattern
        #[arg(long)]
        index: Option<String>,
    },

    /// Check connectivity to the indexer, manager and Caldera
    Check,

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = AppConfig::load(&config_path).unwrap_or_else(|e| {
        if cli.config.is_some() || cli.verbose {
            eprintln!("Using default configuration ({:#})", e);
        }
        AppConfig::default()
    });
    let config = config.with_env_overrides();

    let logging = if cli.verbose {
        LoggingConfig::development()
    } else {
        LoggingConfig::default().with_level_name(&config.logging.level)
    };
    // A subscriber may already be set by the embedding process.
    let _ = init_logging_with_config(
        logging.with_json(config.logging.json_format || cli.format == OutputFormat::Json),
    );

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_swagger,
        } => {
            let mut serve_config = ServeConfig::from_app_config(&config);
            if let Some(port) = port {
                serve_config.port = port;
            }
            if let Some(host) = host {
                serve_config.host = host;
            }
            serve_config.enable_swagger = !no_swagger;
            run_server(serve_config, config).await
        }
        Commands::Correlate {
            op_id,
            window,
            index,
        } => run_correlate(config, op_id, window, index, cli.format).await,
        Commands::Check => run_check(config, cli.format).await,
        Commands::Config { show_secrets } => show_config(config, show_secrets, cli.format),
    }
}
