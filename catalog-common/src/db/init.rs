//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently on every start. Foreign keys are enforced at the database
//! level so a delete-guard check racing a concurrent insert can only end
//! in a rejected delete, never a silent orphan.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the catalog database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the full schema (tests, tooling)
pub async fn init_memory_database() -> Result<SqlitePool> {
    // Single connection: each SQLite :memory: connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer; bulk import holds the
    // writer for the duration of the request, which is an accepted ceiling
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Create all tables if they do not exist (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS functions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            active BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            function_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (function_id) REFERENCES functions(id),
            UNIQUE(function_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            is_fallback BOOLEAN NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS capabilities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            icon TEXT,
            is_fallback BOOLEAN NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,

            function_id INTEGER NOT NULL,
            team_id INTEGER,

            method_type TEXT NOT NULL CHECK(method_type IN ('workflow', 'task', 'experiment')),
            capability_id INTEGER NOT NULL,
            capability_other TEXT,
            description TEXT NOT NULL,

            tools_used TEXT NOT NULL,
            other_tools TEXT,

            impact1_type TEXT CHECK(impact1_type IN ('cost_savings', 'time_savings', 'quality', 'new_capability', NULL)),
            impact1_value REAL,
            impact1_frequency TEXT CHECK(impact1_frequency IN ('one_time', 'daily', 'weekly', 'monthly', NULL)),
            impact1_time_unit TEXT,
            impact1_annual_value REAL,
            impact1_description TEXT,

            impact2_type TEXT CHECK(impact2_type IN ('cost_savings', 'time_savings', 'quality', 'new_capability', NULL)),
            impact2_value REAL,
            impact2_frequency TEXT CHECK(impact2_frequency IN ('one_time', 'daily', 'weekly', 'monthly', NULL)),
            impact2_time_unit TEXT,
            impact2_annual_value REAL,
            impact2_description TEXT,

            impact3_type TEXT CHECK(impact3_type IN ('cost_savings', 'time_savings', 'quality', 'new_capability', NULL)),
            impact3_value REAL,
            impact3_frequency TEXT CHECK(impact3_frequency IN ('one_time', 'daily', 'weekly', 'monthly', NULL)),
            impact3_time_unit TEXT,
            impact3_annual_value REAL,
            impact3_description TEXT,

            impact4_type TEXT CHECK(impact4_type IN ('cost_savings', 'time_savings', 'quality', 'new_capability', NULL)),
            impact4_value REAL,
            impact4_frequency TEXT CHECK(impact4_frequency IN ('one_time', 'daily', 'weekly', 'monthly', NULL)),
            impact4_time_unit TEXT,
            impact4_annual_value REAL,
            impact4_description TEXT,

            submitted_by TEXT,
            submitted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,

            FOREIGN KEY (function_id) REFERENCES functions(id),
            FOREIGN KEY (team_id) REFERENCES teams(id),
            FOREIGN KEY (capability_id) REFERENCES capabilities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user' CHECK(role IN ('admin', 'user')),
            active BOOLEAN NOT NULL DEFAULT 1,
            must_change_password BOOLEAN NOT NULL DEFAULT 0,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TIMESTAMP,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at TIMESTAMP NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Current timestamp in the format SQLite's CURRENT_TIMESTAMP produces,
/// so explicit writes sort consistently with column defaults
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
