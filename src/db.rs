//! SQLite pool setup and schema application.

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{fs::OpenOptions, path::Path};

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool for `db_url`, creating the database file and its directory.
pub async fn connect(db_url: &str) -> Result<SqlitePool> {
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !db_path.starts_with(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        match OpenOptions::new().create(true).append(true).open(db_path) {
            Ok(_) => tracing::debug!("Database file can be created/opened."),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(pool)
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn apply_schema(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
