//! mdsync CLI
//!
//! Command-line interface for mdsync - publish Markdown notes to Notion.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mdsync_core::Config;

mod commands;
mod output;

use commands::sync::SyncArgs;
use output::{Output, OutputFormat};

/// Log level variable; applies to the mdsync crates only
const LOG_ENV: &str = "MDSYNC_LOG";

#[derive(Parser)]
#[command(name = "mdsync")]
#[command(about = "mdsync - Publish Markdown notes to a Notion database")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Notes directory (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    notes_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every changed Markdown file
    Sync {
        /// Sync files even if the ledger says they are unchanged
        #[arg(short, long)]
        force: bool,
        /// Archive managed records whose file was deleted
        #[arg(long)]
        prune: bool,
        /// Convert everything without contacting Notion
        #[arg(long, conflicts_with = "force")]
        dry_run: bool,
    },
    /// Sync, then keep syncing files as they change
    Watch {
        /// Force the initial sync
        #[arg(short, long)]
        force: bool,
    },
    /// Archive managed records whose file was deleted
    Prune {
        /// List what would be archived
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the blocks a file converts to
    Convert {
        /// Markdown file
        file: PathBuf,
        /// Include the title heading and byline
        #[arg(long)]
        full_page: bool,
        /// Print the Notion request payload
        #[arg(long)]
        notion: bool,
    },
    /// Show notes directory, remote and ledger status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g. notes_dir, database_id, properties.slug)
        key: String,
        /// Configuration value ("none" clears optional keys)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_deref();

    // Config commands work on the file itself, without overrides
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let mut config =
        Config::load_with_override(config_path).context("Failed to load configuration")?;
    if let Some(dir) = cli.notes_dir {
        config.notes_dir = dir;
    }
    init_logging(&config, &output);

    match cli.command {
        Commands::Sync {
            force,
            prune,
            dry_run,
        } => {
            let args = SyncArgs {
                force,
                prune,
                dry_run,
            };
            commands::sync::sync(&config, args, &output).await
        }
        Commands::Watch { force } => commands::watch::watch(&config, force, &output).await,
        Commands::Prune { dry_run } => commands::prune::prune(&config, dry_run, &output).await,
        Commands::Convert {
            file,
            full_page,
            notion,
        } => commands::convert::convert(&config, &file, full_page, notion, &output),
        Commands::Status => commands::status::show(&config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&Path>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Set up tracing to stderr, or to `log_file` when configured
///
/// `MDSYNC_LOG` sets the level; by default progress is logged at info
/// unless output is JSON or quiet.
fn init_logging(config: &Config, output: &Output) {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| {
        if output.format == OutputFormat::Human {
            "info".to_string()
        } else {
            "warn".to_string()
        }
    });
    let env_filter = EnvFilter::new(format!("mdsync_core={},mdsync_cli={}", level, level));

    let Some(ref log_path) = config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Initialize file-based logging (ignore error if already initialized)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_flags() {
        let cli = Cli::parse_from(["mdsync", "--json", "sync", "--force", "--prune"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                force: true,
                prune: true,
                dry_run: false
            }
        ));
    }

    #[test]
    fn test_dry_run_conflicts_with_force() {
        let result = Cli::try_parse_from(["mdsync", "sync", "--dry-run", "--force"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = Cli::parse_from(["mdsync", "status", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Status));
    }
}
