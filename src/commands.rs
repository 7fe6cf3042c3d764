//! Command execution.

use crate::config::Config;
use crate::discovery;
use crate::Commands;
use colored::Colorize;
use rsmigrate_core::{Direction, EventKind, FailurePolicy, Migrator, RunReport, Status};
use rsmigrate_storage::FileStateStore;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Executes a command and returns the formatted output.
pub async fn execute(config: &Config, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Up { target } => migrate(config, Direction::Up, target.as_deref()).await,

        Commands::Down { target } => migrate(config, Direction::Down, target.as_deref()).await,

        Commands::Status => {
            let mut migrator = build_migrator(config)?;
            let status = migrator.status().await?;
            Ok(format_status(&status))
        }

        Commands::Create { name } => {
            let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
            let path = discovery::create(&config.migrations.dir, &name, &timestamp)?;
            Ok(format!("{} {}", "Created".green(), path.display()))
        }
    }
}

fn build_migrator(config: &Config) -> Result<Migrator, Box<dyn std::error::Error>> {
    let set = discovery::load_set(
        &config.migrations.dir,
        &config.migrations.shell,
        &config.state.key,
    )?;
    tracing::debug!(
        "Loaded {} migration(s) from {}",
        set.len(),
        config.migrations.dir.display()
    );

    let policy = if config.engine.persist_progress {
        FailurePolicy::PersistProgress
    } else {
        FailurePolicy::SuccessOnly
    };

    let store = Arc::new(FileStateStore::new(&config.state.dir));
    Ok(Migrator::new(set, store).with_failure_policy(policy))
}

/// Runs migrations, printing each step as it starts.
async fn migrate(
    config: &Config,
    direction: Direction,
    target: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut migrator = build_migrator(config)?;

    // Subscribe before the run so no step is missed
    let mut events = migrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let EventKind::Migration { title, direction } = event.kind {
                        println!("{}", format_step(direction, &title));
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    eprintln!("{}: lagged {} events", "Warning".yellow(), n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = migrator.run(direction, target).await;

    // Dropping the engine closes the channel and ends the printer
    drop(migrator);
    let _ = printer.await;

    Ok(format_report(&result?))
}

fn format_step(direction: Direction, title: &str) -> String {
    format!("{:>4} : {}", direction.as_str(), title)
}

fn format_report(report: &RunReport) -> String {
    if report.executed.is_empty() {
        return format!("{} (position {})", "Nothing to migrate".yellow(), report.to);
    }

    format!(
        "{} {} {} migration(s), position {} -> {}",
        "Migrated".green(),
        report.direction,
        report.executed.len(),
        report.from,
        report.to
    )
}

fn format_status(status: &Status) -> String {
    let mut output = format!(
        "Migrations for '{}' ({} applied, {} pending)",
        status.storage_key.cyan(),
        status.position,
        status.pending()
    )
    .bold()
    .to_string();

    if status.migrations.is_empty() {
        output.push_str(&format!("\n  {}", "No migrations found".yellow()));
    }

    for migration in &status.migrations {
        let line = if migration.applied {
            format!("\n  {} {}", "[x]".green(), migration.title)
        } else {
            format!("\n  {} {}", "[ ]".dimmed(), migration.title)
        };
        output.push_str(&line);
    }

    if let Some(index) = status.divergence {
        let stored = status
            .persisted_titles
            .get(index)
            .map(String::as_str)
            .unwrap_or("?");
        output.push_str(&format!(
            "\n{}: stored migration '{}' at position {} does not match the migrations directory",
            "Warning".yellow(),
            stored,
            index + 1
        ));
    }

    if status.position > status.migrations.len() {
        output.push_str(&format!(
            "\n{}: stored position {} is beyond the {} known migration(s)",
            "Warning".yellow(),
            status.position,
            status.migrations.len()
        ));
    }

    output
}
