//! donelog CLI
//!
//! Command-line interface for donelog - a log of things done, synced
//! across devices.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use donelog_core::{Config, Store};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "donelog")]
#[command(about = "donelog - Keep a log of what you got done")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an entry (opens $EDITOR if no text is given)
    #[command(alias = "new")]
    Add {
        /// Entry text
        content: Vec<String>,
    },
    /// List active entries (default)
    #[command(alias = "ls")]
    List,
    /// Show one entry
    Show {
        /// Entry ID (full or prefix)
        id: String,
    },
    /// Edit an entry (opens $EDITOR if no text is given)
    Edit {
        /// Entry ID (full or prefix)
        id: String,
        /// New text
        #[arg(short, long)]
        content: Option<String>,
        /// New time (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long)]
        at: Option<String>,
    },
    /// Move an entry to the trash
    #[command(alias = "rm")]
    Delete {
        /// Entry ID (full or prefix)
        id: String,
    },
    /// Restore an entry from the trash
    Restore {
        /// Entry ID (full or prefix)
        id: String,
    },
    /// List the trash
    Trash,
    /// Remove every trashed entry from this device
    EmptyTrash {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Import entries from a JSON export
    Import {
        /// File containing a JSON array of entries
        file: PathBuf,
    },
    /// Export active entries as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sync with the remote log table
    Sync,
    /// Check the remote endpoint and credential
    TestConnection,
    /// Keep syncing on the configured interval until Ctrl-C
    Watch,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (storage, sync settings, counts)
    Status,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, endpoint, credential, auto_sync, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

impl Commands {
    /// Commands that change local entries and should be pushed afterwards
    fn is_write(&self) -> bool {
        matches!(
            self,
            Commands::Add { .. }
                | Commands::Edit { .. }
                | Commands::Delete { .. }
                | Commands::Restore { .. }
                | Commands::Import { .. }
        )
    }

    /// Commands that show entries and should pull first
    fn is_read(&self) -> bool {
        matches!(
            self,
            Commands::List | Commands::Show { .. } | Commands::Trash | Commands::Export { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let result = run(cli, &output).await;
    if let Err(ref e) = result {
        if let Some(hint) = output::recovery_hint(e) {
            eprintln!("Hint: {}", hint);
        }
    }
    result
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Config commands work without a store
    if let Some(Commands::Config { command }) = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    if let Some(Commands::TestConnection) = &cli.command {
        return commands::sync::test_connection(&config, output).await;
    }

    let mut store = Store::open_with_config(config).context("Failed to open store")?;
    let command = cli.command.unwrap_or(Commands::List);

    if let Commands::Watch = command {
        return commands::sync::watch(store, output).await;
    }

    if command.is_read() {
        auto_sync(&mut store, output).await;
    }
    let is_write = command.is_write();

    let result = match command {
        Commands::Add { content } => commands::entry::add(&mut store, content, output),
        Commands::List => commands::entry::list(&store, output),
        Commands::Show { id } => commands::entry::show(&store, id, output),
        Commands::Edit { id, content, at } => {
            commands::entry::edit(&mut store, id, content, at, output)
        }
        Commands::Delete { id } => commands::entry::delete(&mut store, id, output),
        Commands::Restore { id } => commands::entry::restore(&mut store, id, output),
        Commands::Trash => commands::entry::trash(&store, output),
        Commands::EmptyTrash { yes } => commands::entry::empty_trash(&mut store, yes, output),
        Commands::Import { file } => commands::entry::import(&mut store, &file, output),
        Commands::Export { output: path } => {
            commands::entry::export(&store, path.as_deref(), output)
        }
        Commands::Sync => commands::sync::sync(&mut store, output).await,
        Commands::Status => commands::status::show(&store, output),
        Commands::TestConnection | Commands::Watch | Commands::Config { .. } => unreachable!(), // Handled above
    };

    // Push local changes only if the command itself succeeded
    if is_write && result.is_ok() {
        auto_sync(&mut store, output).await;
    }

    result
}

/// Install the tracing subscriber
///
/// Level comes from RUST_LOG if set, otherwise from -v. Logs go to
/// `log_file` when configured, stderr otherwise.
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("donelog_core={level},donelog_cli={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let log_file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Warning: Could not open log file {:?}: {}", path, e))
            .ok()
    });

    // Ignore error if already initialized
    let _ = match log_file {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    debug!("Logging initialized at {}", level);
}

/// Auto-sync if enabled and configured, reporting failures without aborting
async fn auto_sync(store: &mut Store, output: &Output) {
    if !store.config().auto_sync || store.config().remote().is_none() {
        return;
    }

    if let Err(e) = commands::sync::sync_quiet(store).await {
        warn!("Auto-sync failed: {:#}", e);
        if !output.is_quiet() {
            eprintln!("⚠ Auto-sync failed: {}", e);
        }
    }
}
