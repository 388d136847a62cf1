//! SQLite connection pool and schema bootstrap.
//!
//! Diesel connections are synchronous, so every query the async layer issues
//! goes through [`run`], which hands the closure to a blocking thread with a
//! pooled connection.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sql_query;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas. WAL keeps readers from blocking the single writer,
/// which is what lets a read race an in-flight extend and still observe a
/// consistent row.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        sql_query("PRAGMA journal_mode = WAL;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        sql_query("PRAGMA busy_timeout = 5000;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        sql_query("PRAGMA foreign_keys = ON;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        Ok(())
    }
}

pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);

    let pool = r2d2::Pool::builder()
        .max_size(10)
        .connection_timeout(std::time::Duration::from_secs(30))
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
        .context("Failed to create database connection pool")?;

    Ok(pool)
}

/// Create tables if they do not exist yet. Idempotent.
pub fn init_schema(conn: &mut SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY NOT NULL,
            kind TEXT NOT NULL,
            ciphertext TEXT NOT NULL,
            original_name TEXT,
            unlock_round BIGINT NOT NULL,
            unlock_at BIGINT NOT NULL,
            layer_count INTEGER NOT NULL DEFAULT 1,
            created_at BIGINT NOT NULL,
            metadata TEXT
        );",
    )
    .execute(conn)
    .context("Failed to create items table")?;

    sql_query("CREATE INDEX IF NOT EXISTS idx_items_created_at ON items (created_at);")
        .execute(conn)
        .context("Failed to create items index")?;

    sql_query(
        "CREATE TABLE IF NOT EXISTS api_tokens (
            token TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at BIGINT NOT NULL,
            last_used_at BIGINT
        );",
    )
    .execute(conn)
    .context("Failed to create api_tokens table")?;

    Ok(())
}

/// Run a blocking database closure on the tokio blocking pool.
pub async fn run<T, F>(pool: &DbPool, f: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        f(&mut conn)
    })
    .await
    .context("Blocking database task panicked")?
}
