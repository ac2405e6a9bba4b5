use anyhow::Context;
use hookdb_orm::{
    MigrationInfo, MigrationResultSet, MigrationStatus, MigrationTarget, Migrator,
};

/// A parsed command word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateCommand {
    List,
    Help,
    Run(MigrationTarget),
}

impl MigrateCommand {
    /// Anything that is not a reserved word is taken as a target migration name
    pub fn parse(word: &str) -> Self {
        match word {
            "list" => MigrateCommand::List,
            "help" | "-h" | "--help" => MigrateCommand::Help,
            "up" => MigrateCommand::Run(MigrationTarget::Up),
            "down" => MigrateCommand::Run(MigrationTarget::Down),
            "latest" => MigrateCommand::Run(MigrationTarget::Latest),
            name => MigrateCommand::Run(MigrationTarget::Named(name.to_string())),
        }
    }
}

pub async fn list(migrator: &Migrator, json: bool) -> anyhow::Result<()> {
    let migrations = migrator
        .list()
        .await
        .context("Failed to list migrations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&migrations)?);
    } else {
        print!("{}", render_list(&migrations));
    }
    Ok(())
}

/// Run the migrator towards `target`, print what happened and fail if the run halted
pub async fn run(migrator: &Migrator, target: MigrationTarget, json: bool) -> anyhow::Result<()> {
    let result_set = migrator.migrate(target.clone()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result_set)?);
    } else {
        print!("{}", render_results(&result_set));
    }

    match result_set.error {
        Some(error) => Err(error).with_context(|| format!("Migration to '{}' failed", target)),
        None => Ok(()),
    }
}

pub fn render_list(migrations: &[MigrationInfo]) -> String {
    if migrations.is_empty() {
        return "No migrations found\n".to_string();
    }

    let mut out = String::from("Migration Status:\n================\n");
    for migration in migrations {
        match migration.executed_at {
            Some(executed_at) => out.push_str(&format!(
                "  [x] {}  (executed {})\n",
                migration.name,
                executed_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => out.push_str(&format!("  [ ] {}  (pending)\n", migration.name)),
        }
    }

    let pending = migrations.iter().filter(|m| !m.is_executed()).count();
    out.push_str(&format!("\n{} executed, {} pending\n", migrations.len() - pending, pending));
    out
}

pub fn render_results(result_set: &MigrationResultSet) -> String {
    if result_set.results.is_empty() && result_set.error.is_none() {
        return "Nothing to do: schema already at target\n".to_string();
    }

    let mut out = String::new();
    for result in &result_set.results {
        match result.status {
            MigrationStatus::Success => {
                out.push_str(&format!("  ok     {:<4} {}\n", result.direction, result.name))
            }
            MigrationStatus::Error => out.push_str(&format!(
                "  FAILED {:<4} {}: {}\n",
                result.direction,
                result.name,
                result.error.as_deref().unwrap_or("unknown error")
            )),
        }
    }

    if let Some(error) = &result_set.error {
        if result_set.results.is_empty() {
            out.push_str(&format!("No migrations run: {}\n", error));
        }
    }
    out
}
