//! # hearth
//!
//! Command-line driver for the hearth-sync engine.
//!
//! ## Commands
//!
//! - `add`: Create a note, task or event
//! - `edit`: Change a record's title
//! - `delete`: Delete a record
//! - `list`: Show the local view
//! - `refresh`: Pull and merge the remote snapshot
//! - `queue`: Show pending outbound sync jobs
//! - `flush`: Deliver every queued job now
//! - `retry`: Retry a record whose sync failed
//! - `watch`: Keep the engine running with periodic refresh
//!
//! ## Example
//!
//! ```bash
//! # Create a task while offline
//! hearth --offline add "Buy milk" --kind task
//!
//! # See it queued
//! hearth --offline queue
//!
//! # Back online: deliver it
//! hearth flush
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hearth_sync_types::RecordKind;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapter;
mod commands;
mod config;
mod remote;

use commands::{records, sync, CommandContext};
use config::Config;

/// Command-line driver for the hearth-sync engine.
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the state database, remote file and config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: hearth.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Treat the remote store and the provider as unreachable
    #[arg(long, global = true)]
    offline: bool,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a record
    Add {
        /// Title
        title: String,

        /// Record kind
        #[arg(long, short, value_enum, default_value = "note")]
        kind: KindArg,

        /// Reminder time (Unix ms)
        #[arg(long)]
        remind_at: Option<i64>,
    },

    /// Change a record's title
    Edit {
        /// Record id
        id: String,

        /// New title
        title: String,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
    },

    /// List records in the local view
    List,

    /// Pull and merge the remote snapshot
    Refresh,

    /// Show pending outbound sync jobs
    Queue,

    /// Deliver every queued job now
    Flush,

    /// Retry syncing a record
    Retry {
        /// Record id
        id: String,
    },

    /// Run until interrupted, refreshing periodically
    Watch,
}

/// Record kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Note,
    Task,
    Event,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Note => RecordKind::Note,
            KindArg::Task => RecordKind::Task,
            KindArg::Event => RecordKind::Event,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config = Config::load(cli.config.as_deref(), &data_dir)?;
    let ctx = CommandContext {
        data_dir,
        config,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Add {
            title,
            kind,
            remind_at,
        } => records::add(&ctx, &title, kind.into(), remind_at).await?,
        Commands::Edit { id, title } => records::edit(&ctx, &id, &title).await?,
        Commands::Delete { id } => records::delete(&ctx, &id).await?,
        Commands::List => records::list(&ctx).await?,
        Commands::Refresh => sync::refresh(&ctx).await?,
        Commands::Queue => sync::queue(&ctx).await?,
        Commands::Flush => sync::flush(&ctx).await?,
        Commands::Retry { id } => sync::retry(&ctx, &id).await?,
        Commands::Watch => sync::watch(&ctx).await?,
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Get the default data directory.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "hearth", "hearth")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
