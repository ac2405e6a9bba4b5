mod commands;
mod logging;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use commands::migrate::{self, MigrateCommand};
use hookdb_orm::{ConnectionManager, DatabaseConfig, FileMigrationProvider, Migrator};
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "hookdb")]
#[command(about = "Schema migrations for the hookdb database")]
#[command(after_help = "Commands:\n  \
    list       Show every migration and whether it has been executed\n  \
    up         Apply the next pending migration\n  \
    down       Revert the last executed migration\n  \
    latest     Apply every pending migration\n  \
    <target>   Migrate up or down until <target> is the last executed migration\n  \
    help       Show this help")]
struct Cli {
    /// list, up, down, latest, help, or a migration name
    command: Option<String>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations folder (overrides MIGRATIONS_DIR)
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Tracking table name (overrides MIGRATIONS_TABLE)
    #[arg(long)]
    migrations_table: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Log level for hookdb events
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Environment configuration with command-line flags layered on top
    fn database_config(&self) -> anyhow::Result<DatabaseConfig> {
        let config = DatabaseConfig::from_vars(|key| {
            let flag = match key {
                "DATABASE_URL" => self.database_url.clone(),
                "MIGRATIONS_DIR" => self
                    .migrations_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().into_owned()),
                "MIGRATIONS_TABLE" => self.migrations_table.clone(),
                _ => None,
            };
            flag.or_else(|| env::var(key).ok())
        })
        .context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(word) = cli.command.as_deref() else {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a command is required: list, up, down, latest, or a migration name",
            )
            .exit();
    };

    let command = MigrateCommand::parse(word);
    if command == MigrateCommand::Help {
        Cli::command().print_help()?;
        return Ok(());
    }

    let logging = LoggingConfig::default()
        .with_level(cli.log_level.as_str())
        .with_json_format(cli.log_json);
    if let Err(e) = logging::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = cli.database_config()?;
    let provider = Arc::new(FileMigrationProvider::new(config.migrations_dir.clone()));
    let connections = Arc::new(ConnectionManager::new(config));
    let migrator = Migrator::new(connections, provider);

    match command {
        MigrateCommand::List => migrate::list(&migrator, cli.json).await,
        MigrateCommand::Run(target) => migrate::run(&migrator, target, cli.json).await,
        MigrateCommand::Help => Ok(()),
    }
}
