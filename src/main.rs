//! invsearch: eventually consistent search index for an IT equipment inventory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use invsearch::{config::LogFormat, inventory::EquipmentInput, Config, Pipeline};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "invsearch")]
#[command(about = "Search index synchronization for the equipment inventory")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "invsearch.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP query API with the sync pipeline
    Serve {
        /// Listen address, overriding the config file
        #[arg(short, long)]
        listen: Option<String>,

        /// JSON file with an array of equipment records to create at startup
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    // Setup logging
    let level = config.logging.level.raised_by(cli.verbose).as_tracing_level();
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false);
    match config.logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    match cli.command {
        Commands::Serve { listen, seed } => serve(config, listen, seed).await,
        Commands::Config => show_config(&config),
    }
}

async fn serve(mut config: Config, listen: Option<String>, seed: Option<PathBuf>) -> Result<()> {
    if let Some(listen) = listen {
        config.http.listen_addr = listen;
    }

    let pipeline = Pipeline::start(config)?;

    if let Some(path) = seed {
        let records = read_seed(&path)?;
        info!("Seeding {} records from {}", records.len(), path.display());
        pipeline.seed(records);
        pipeline.wait_idle().await;
        info!("Index holds {} documents", pipeline.query().count());
    }

    pipeline.run().await
}

fn read_seed(path: &Path) -> Result<Vec<EquipmentInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file '{}'", path.display()))
}

fn show_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{}", rendered);
    Ok(())
}
