//! SQLite persistence for the catalog cache and listening history.
//!
//! Uses SQLx with SQLite. The pool is created once at startup through
//! [`init_db`] and handed to every component that needs it.
//!
//! - [`catalog`]: tracks, albums, artists, images and their relations
//! - [`listening`]: users with a linked remote account, plays, sync watermark
//!
//! Query functions are generic over [`sqlx::SqliteExecutor`], so they run
//! equally against the pool or inside a transaction.
//!
//! # Example
//!
//! ```ignore
//! use music_mirror::db::{init_db, catalog};
//!
//! let pool = init_db("sqlite:music_mirror.db").await?;
//! let row = catalog::get_track(&pool, "4uLU6hMCjMI75M1A2tKUQC").await?;
//! ```

pub mod catalog;
pub mod listening;

use std::path::Path;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_mirror.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if the database cannot be created, connected to, or
/// migrated.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_url() {
        assert_eq!(db_url(None), "sqlite:music_mirror.db");
        assert_eq!(
            db_url(Some(Path::new("/tmp/cache.db"))),
            "sqlite:/tmp/cache.db"
        );
    }

    #[tokio::test]
    async fn test_init_db_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let url = db_url(Some(&dir.path().join("repeat.db")));

        let pool = init_db(&url).await.unwrap();
        pool.close().await;

        // Second init finds the file and the applied migrations
        let pool = init_db(&url).await.unwrap();
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}
