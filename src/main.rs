//! rsmigrate - Migration runner
//!
//! Applies and reverts an ordered set of script migrations, tracking the
//! applied position in a durable state record.

mod commands;
mod config;
mod discovery;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use rsmigrate_core::CoreError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsmigrate")]
#[command(about = "Apply and revert ordered migrations with a durable position cursor")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "RSMIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding migration definitions
    #[arg(short, long)]
    migrations_dir: Option<PathBuf>,

    /// Directory of the state store
    #[arg(short, long)]
    state_dir: Option<PathBuf>,

    /// Storage key of the state record
    #[arg(short, long)]
    key: Option<String>,

    /// Save the reached position when a migration fails
    #[arg(long)]
    persist_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending migrations through TARGET (inclusive), or all of them
    Up {
        /// Title of the last migration to apply
        target: Option<String>,
    },

    /// Revert applied migrations down to TARGET (inclusive), or all of them
    Down {
        /// Title of the last migration to revert
        target: Option<String>,
    },

    /// List migrations and which are applied
    Status,

    /// Write a new migration definition template
    Create {
        /// Migration name, slugified into the file name
        name: String,
    },
}

impl Cli {
    /// Applies command-line flags over the loaded configuration.
    fn apply_to(&self, config: &mut Config) {
        if let Some(ref dir) = self.migrations_dir {
            config.migrations.dir = dir.clone();
        }
        if let Some(ref dir) = self.state_dir {
            config.state.dir = dir.clone();
        }
        if let Some(ref key) = self.key {
            config.state.key = key.clone();
        }
        if self.persist_progress {
            config.engine.persist_progress = true;
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red(), e);
        if let Some(core) = e.downcast_ref::<CoreError>() {
            if core.state_may_diverge() {
                eprintln!(
                    "{}: migrations ran but their position was not saved; check the state record before re-running",
                    "Warning".yellow()
                );
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref path) = cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }
    cli.apply_to(&mut config);
    config.validate()?;

    tracing::debug!("  Migrations directory: {}", config.migrations.dir.display());
    tracing::debug!("  State directory: {}", config.state.dir.display());
    tracing::debug!("  State key: {}", config.state.key);

    let output = commands::execute(&config, cli.command).await?;
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["rsmigrate", "--key", "billing", "up", "002"]).unwrap();
        assert_eq!(cli.key.as_deref(), Some("billing"));
        assert!(matches!(cli.command, Commands::Up { target: Some(ref t) } if t == "002"));

        let cli = Cli::try_parse_from(["rsmigrate", "down"]).unwrap();
        assert!(matches!(cli.command, Commands::Down { target: None }));

        assert!(Cli::try_parse_from(["rsmigrate", "create"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "rsmigrate",
            "--migrations-dir",
            "db/migrations",
            "--state-dir",
            "db/state",
            "--persist-progress",
            "status",
        ])
        .unwrap();

        let mut config = Config::default();
        config.state.key = "from-file".into();
        cli.apply_to(&mut config);

        assert_eq!(config.migrations.dir, PathBuf::from("db/migrations"));
        assert_eq!(config.state.dir, PathBuf::from("db/state"));
        assert_eq!(config.state.key, "from-file");
        assert!(config.engine.persist_progress);
    }
}
