//! Stencil CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stencil_core::{EntryPoints, PluginRegistry};
use stencil_foundation::RuntimeConfig;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stencil - plugin runtime inspector
#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Runtime config file (default: global + project stencil.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra plugin directory to scan (repeatable)
    #[arg(short = 'p', long = "plugin-path", global = true)]
    plugin_paths: Vec<PathBuf>,

    /// Host version used for compatibility checks
    #[arg(long, global = true)]
    host_version: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered plugins
    List,
    /// Search plugins by id, name or description
    Search {
        /// Case-insensitive substring
        query: String,
    },
    /// Show details of a single plugin
    Info {
        /// Plugin id
        id: String,
    },
    /// Print the dependency load order
    Order {
        /// Print the unload order instead
        #[arg(long)]
        reverse: bool,
    },
    /// Check host compatibility and dependencies of every plugin
    Check,
    /// Write a default stencil.json into the current project
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, stdout은 출력 전용)
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load_from(path)?,
        None => RuntimeConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        }),
    };
    if let Some(host_version) = &args.host_version {
        config = config.with_host_version(host_version.clone());
        config.validate()?;
    }
    for path in &args.plugin_paths {
        config = config.with_plugin_path(path.clone());
    }

    if let Command::Init { force } = args.command {
        return commands::init(&config, force);
    }

    // CLI는 플러그인 구현을 실행하지 않으므로 엔트리포인트 없이 카탈로그만 구성
    let sources = config.plugin_paths.clone();
    let registry = Arc::new(PluginRegistry::new(config, EntryPoints::new()));
    let report = registry.spawn_discovery(sources).await?;
    let skipped = commands::warn_skipped(&report);
    debug!(plugins = report.discovered.len(), skipped, "Discovery finished");

    match args.command {
        Command::List => commands::list(&registry, args.json).await,
        Command::Search { query } => commands::search(&registry, &query, args.json).await,
        Command::Info { id } => commands::info(&registry, &id, args.json).await,
        Command::Order { reverse } => commands::order(&registry, reverse, args.json).await,
        Command::Check => commands::check(&registry, args.json).await,
        Command::Init { .. } => Ok(()),
    }
}
