// Supra catalog service
// Main entry point for the supra binary

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use supra_api::{serve, ServerState};
use supra_engine::config::Config;
use supra_engine::db::Database;
use supra_engine::llm::gemini::GeminiBackend;
use supra_engine::search::SearchEngine;
use supra_engine::secrets;
use supra_engine::telemetry::{init_telemetry, init_telemetry_with_level};

/// Supra restaurant catalog service
///
/// A restaurant/dish catalog API with a conversational, multimodal
/// dish-selection search backed by a generative-inference backend.
#[derive(Parser, Debug)]
#[command(name = "supra")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the API server (the default)
    Serve {
        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the catalog database and exit
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Supra v{}", env!("CARGO_PKG_VERSION"));

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the configured log level
    // (only takes effect if RUST_LOG env var is not set)
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let database = Database::connect(&config.database_path()).await?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            let api_key = secrets::api_key_from_env()?;
            let backend = GeminiBackend::new(config.llm.gemini.clone(), api_key)?;
            let engine = SearchEngine::new(Arc::new(backend));

            let state = ServerState::new(
                Arc::new(database),
                Arc::new(engine),
                config.search.default_limit,
            );

            let addr: SocketAddr = format!(
                "{}:{}",
                config.api.host,
                port.unwrap_or(config.api.port)
            )
            .parse()?;

            serve(state, addr).await
        }

        Command::InitDb => {
            database.close().await?;
            println!("Catalog database initialized.");
            Ok(())
        }
    }
}
