//! halscope - HAL device tree viewer
//!
//! Replays scripted daemon sessions through the synchronization engine and
//! prints the resulting device tree.

mod config;
mod render;
mod scenario;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use halscope_core::{DeviceId, EventRouter, Synchronizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, ConfigSource};
use crate::scenario::{Scenario, ScenarioError};

#[derive(Parser, Debug)]
#[command(name = "halscope")]
#[command(about = "Live view of the HAL device tree")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "halscope.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed a daemon from a scenario, then apply its steps one by one
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },
    /// Print the tree built from a scenario's initial devices
    Show {
        /// Scenario file (TOML)
        scenario: PathBuf,
        /// Print only this device's properties
        #[arg(long)]
        udi: Option<String>,
        /// Emit JSON instead of a table (requires --udi)
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, source) = config::load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    init_logging(&args.log_level, config.logging.filter.as_deref())?;

    info!("halscope v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => info!(path = %args.config.display(), "Loaded configuration"),
        ConfigSource::Defaults => info!(
            path = %args.config.display(),
            "Configuration file not found, using defaults"
        ),
    }

    match args.command {
        Command::Replay { scenario } => replay(&config, &scenario).await,
        Command::Show { scenario, udi, json } => show(&config, &scenario, udi, json).await,
    }
}

fn init_logging(level: &str, filter: Option<&str>) -> Result<()> {
    // stdout carries the tree dumps
    tracing::subscriber::set_global_default(log_subscriber(level, filter, std::io::stderr))?;
    Ok(())
}

fn log_subscriber<W>(level: &str, filter: Option<&str>, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if let Some(directive) = filter {
        return Box::new(
            FmtSubscriber::builder()
                .with_env_filter(EnvFilter::new(directive))
                .with_target(true)
                .with_writer(writer)
                .finish(),
        );
    }

    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    Box::new(
        FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_writer(writer)
            .finish(),
    )
}

async fn replay(config: &Config, path: &Path) -> Result<()> {
    let scenario = Scenario::from_file(path)?;
    let daemon = Arc::new(scenario.daemon());

    let sync = Arc::new(Synchronizer::bootstrap(daemon.clone(), config.engine.clone()).await?);
    let router = EventRouter::new(sync.clone(), daemon.clone());
    router.start().await;

    println!("== initial");
    print_tree(config, &sync).await;

    for (i, step) in scenario.steps.iter().enumerate() {
        let signal = step
            .perform(&daemon)
            .await
            .map_err(|source| ScenarioError::Step { step: i + 1, source })?;
        let outcome = router.dispatch(signal).await;
        println!("== step {}: {} -> {:?}", i + 1, step.describe(), outcome);
        print_tree(config, &sync).await;
    }

    router.shutdown().await;
    Ok(())
}

async fn show(config: &Config, path: &Path, udi: Option<String>, json: bool) -> Result<()> {
    let scenario = Scenario::from_file(path)?;
    let daemon = Arc::new(scenario.daemon());
    let sync = Synchronizer::bootstrap(daemon, config.engine.clone()).await?;
    let tree = sync.current_tree().await;

    match udi {
        Some(udi) => {
            let Some(node) = tree.resolve(&DeviceId::new(udi.as_str())) else {
                bail!("no device {}", udi);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&render::node_json(node, &tree))?);
            } else {
                print!("{}", render::render_properties(node));
            }
        }
        None => {
            if json {
                bail!("--json requires --udi");
            }
            print_tree(config, &sync).await;
        }
    }
    Ok(())
}

async fn print_tree(config: &Config, sync: &Synchronizer) {
    let tree = sync.current_tree().await;
    print!("{}", render::render_tree(&tree, &config.display, &config.engine.bus_key));
    if config.display.show_properties {
        for udi in tree.device_ids() {
            if let Some(node) = tree.resolve(udi) {
                println!();
                print!("{}", render::render_properties(node));
            }
        }
    }
}
