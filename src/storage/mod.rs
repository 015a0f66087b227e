//! Local SQLite cache for chat summaries and user profiles.
//!
//! A single [`StorageManager`] owns one connection pool for the lifetime of the
//! application; chat operations live in `chats.rs`, profile operations in
//! `users.rs`.

mod chats;
mod users;

use anyhow::Context;
use chrono::Utc;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use std::path::Path;
use std::str::FromStr;

// Schema, applied statement by statement on every open
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        preview TEXT,
        last_message TEXT,
        last_sender TEXT, -- 'user' or 'assistant'
        message_count INTEGER DEFAULT 0,
        created_at TEXT, -- ISO-8601
        updated_at TEXT, -- ISO-8601
        is_starred INTEGER DEFAULT 0,
        last_sync_timestamp INTEGER DEFAULT 0 -- epoch millis
    )",
    "CREATE INDEX IF NOT EXISTS idx_chats_user_id ON chats(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_chats_updated_at ON chats(updated_at)",
    "CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL,
        username TEXT,
        full_name TEXT,
        profile_completed INTEGER DEFAULT 0,
        last_sync_timestamp INTEGER DEFAULT 0
    )",
];

#[derive(Debug, Clone)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Opens (creating if needed) the database file at `db_path` and runs migrations.
    pub async fn open(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database. The pool is pinned to one connection that never
    /// expires, otherwise each new connection would see an empty database.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database URL")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(pool)
                .await
                .context("Failed to run database migrations")?;
        }
        log::info!("Database migrations completed.");
        Ok(())
    }

    /// Closes every pooled connection. Called once on application shutdown.
    pub async fn close(&self) {
        log::info!("Closing database pool");
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time in the ISO format the client writes for local edits.
pub(crate) fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
