mod models;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Execute a SQL script statement by statement, skipping comment lines
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open the connection pool and make sure the schema exists.
pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    info!(url = %config.url, "Initializing database");

    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    // Every connection to ":memory:" is its own database, so keep exactly one alive.
    let in_memory = config.url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new();
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(config.max_connections)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    execute_sql(pool, include_str!("../../migrations/001_initial.sql"))
        .await
        .context("Failed to create schema")?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    init(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    })
    .await
    .unwrap()
}
