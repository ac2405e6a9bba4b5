//! Migration catalog loading
//!
//! A migration lives in the migrations folder either as a single `<name>.sql`
//! file with `-- Up migration` and `-- Down migration` sections, or as a
//! `<name>/` directory holding `up.sql` and `down.sql`. Anything else in the
//! folder is ignored.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::definitions::{Migration, Operation};
use crate::error::{OrmError, OrmResult};

/// Source of the migration catalog
#[async_trait]
pub trait MigrationProvider: Send + Sync {
    /// Every known migration, sorted ascending by name.
    ///
    /// Must be free of side effects; the migrator may call it more than once.
    async fn get_migrations(&self) -> OrmResult<Vec<Migration>>;
}

/// Loads migrations from a folder on disk
#[derive(Debug, Clone)]
pub struct FileMigrationProvider {
    dir: PathBuf,
}

impl FileMigrationProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a timestamped `<ts>_<name>.sql` template and return its path
    pub async fn create_migration(&self, name: &str) -> OrmResult<PathBuf> {
        let slug = name
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OrmError::Load(format!(
                "Invalid migration name '{}': use letters, digits, spaces or underscores",
                name
            )));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OrmError::Load(format!("Failed to create migrations directory: {}", e)))?;

        let migration_name = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), slug);
        let path = self.dir.join(format!("{}.sql", migration_name));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| OrmError::Load(format!("Failed to create {}: {}", path.display(), e)))?;
        file.write_all(migration_template(&migration_name).as_bytes())
            .await
            .map_err(|e| OrmError::Load(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!("Created migration {}", path.display());
        Ok(path)
    }

    async fn load_file(&self, path: &Path, name: String) -> OrmResult<Migration> {
        let content = read_to_string(path).await?;
        let (up, down) = parse_sections(&name, &content)?;
        Ok(Migration::new(name, Operation::from_sql(&up), Operation::from_sql(&down)))
    }

    async fn load_dir(&self, path: &Path, name: String) -> OrmResult<Option<Migration>> {
        let up_path = path.join("up.sql");
        let down_path = path.join("down.sql");

        match (up_path.is_file(), down_path.is_file()) {
            (false, false) => Ok(None),
            (true, true) => {
                let up = read_to_string(&up_path).await?;
                let down = read_to_string(&down_path).await?;
                Ok(Some(Migration::new(
                    name,
                    Operation::from_sql(&up),
                    Operation::from_sql(&down),
                )))
            }
            (has_up, _) => Err(OrmError::Load(format!(
                "Migration '{}' is missing {}",
                name,
                if has_up { "down.sql" } else { "up.sql" }
            ))),
        }
    }
}

#[async_trait]
impl MigrationProvider for FileMigrationProvider {
    async fn get_migrations(&self) -> OrmResult<Vec<Migration>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            OrmError::Load(format!(
                "Failed to read migrations directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut migrations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrmError::Load(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }

            if path.is_dir() {
                if let Some(migration) = self.load_dir(&path, file_name.to_string()).await? {
                    migrations.push(migration);
                }
            } else if let Some(stem) = file_name.strip_suffix(".sql") {
                migrations.push(self.load_file(&path, stem.to_string()).await?);
            }
        }

        debug!("Loaded {} migrations from {}", migrations.len(), self.dir.display());
        sort_and_validate(migrations)
    }
}

/// Catalog held in memory, for embedded migrations
#[derive(Debug, Clone, Default)]
pub struct StaticMigrationProvider {
    migrations: Vec<Migration>,
}

impl StaticMigrationProvider {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self { migrations }
    }
}

#[async_trait]
impl MigrationProvider for StaticMigrationProvider {
    async fn get_migrations(&self) -> OrmResult<Vec<Migration>> {
        sort_and_validate(self.migrations.clone())
    }
}

/// Sort a catalog by name, rejecting incomplete entries and duplicate names
pub fn sort_and_validate(mut migrations: Vec<Migration>) -> OrmResult<Vec<Migration>> {
    for migration in &migrations {
        migration.validate()?;
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(pair) = migrations.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(OrmError::Load(format!(
            "Duplicate migration name '{}'",
            pair[0].name
        )));
    }

    Ok(migrations)
}

/// Split a SQL script into statements on top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers, dollar-quoted bodies
/// and comments do not split. Fragments made only of whitespace and comments
/// are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).with_unescape(false).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty() && !is_comment_only(s))
                .map(str::to_string)
                .collect();
        }
    };

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut significant = false;

    for token in tokens {
        match token {
            Token::SemiColon => {
                if significant {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                significant = false;
            }
            Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_)) => {
                // Comments before the first keyword are not part of the statement
                if significant {
                    current.push_str(&token.to_string());
                }
            }
            Token::Whitespace(_) => current.push_str(&token.to_string()),
            Token::EOF => {}
            other => {
                significant = true;
                current.push_str(&other.to_string());
            }
        }
    }

    if significant {
        statements.push(current.trim().to_string());
    }

    statements
}

fn is_comment_only(fragment: &str) -> bool {
    fragment
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Recognize `-- Up migration` / `-- Down migration` marker lines (also bare `-- up` / `-- down`)
fn section_marker(line: &str) -> Option<Section> {
    let text = line.trim().strip_prefix("--")?.trim().to_lowercase();
    if text == "up" || text.starts_with("up migration") {
        Some(Section::Up)
    } else if text == "down" || text.starts_with("down migration") {
        Some(Section::Down)
    } else {
        None
    }
}

fn parse_sections(name: &str, content: &str) -> OrmResult<(String, String)> {
    let mut up = String::new();
    let mut down = String::new();
    let mut section = Section::Preamble;
    let mut seen_up = false;
    let mut seen_down = false;

    for line in content.lines() {
        if let Some(marker) = section_marker(line) {
            let seen = if marker == Section::Up { &mut seen_up } else { &mut seen_down };
            if *seen {
                return Err(OrmError::Load(format!(
                    "Migration '{}' has more than one {} section",
                    name,
                    if marker == Section::Up { "up" } else { "down" }
                )));
            }
            *seen = true;
            section = marker;
            continue;
        }

        match section {
            Section::Up => {
                up.push_str(line);
                up.push('\n');
            }
            Section::Down => {
                down.push_str(line);
                down.push('\n');
            }
            Section::Preamble => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(OrmError::Load(format!(
                        "Migration '{}' has SQL before its up section",
                        name
                    )));
                }
            }
        }
    }

    if !seen_up || !seen_down {
        return Err(OrmError::Load(format!(
            "Migration '{}' must contain '-- Up migration' and '-- Down migration' sections",
            name
        )));
    }

    Ok((up, down))
}

fn migration_template(name: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

async fn read_to_string(path: &Path) -> OrmResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OrmError::Load(format!("Failed to read {}: {}", path.display(), e)))
}
