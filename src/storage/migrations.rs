//! Database migration management.
//!
//! Migrations are embedded into the binary at compile time and extracted to
//! a temporary directory at runtime when the source tree is not available,
//! so distributed binaries migrate without carrying the migrations
//! directory alongside the executable.

use include_dir::{include_dir, Dir};
use sqlx::{Pool, Sqlite};
use tempfile::TempDir;

use crate::error_handling::StorageError;

static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

/// Runs SQLx migrations embedded in the binary.
///
/// In development builds the source migrations directory is used directly;
/// distributed binaries extract the embedded copies to a temp directory
/// first.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), StorageError> {
    let source_migrations = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");

    if source_migrations.exists() {
        let migrator = sqlx::migrate::Migrator::new(source_migrations.as_path())
            .await
            .map_err(StorageError::Migration)?;
        migrator.run(pool).await.map_err(StorageError::Migration)?;
        return Ok(());
    }

    // Keep temp_dir in scope for the whole function so the files survive
    // until the migrator has read them.
    let temp_dir =
        TempDir::new().map_err(|e| StorageError::FileCreation(e.to_string()))?;
    let migrations_path = temp_dir.path().join("migrations");
    std::fs::create_dir_all(&migrations_path)
        .map_err(|e| StorageError::FileCreation(e.to_string()))?;

    for file in MIGRATIONS_DIR.files() {
        let file_path = migrations_path.join(file.path());
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::FileCreation(e.to_string()))?;
        }
        std::fs::write(&file_path, file.contents())
            .map_err(|e| StorageError::FileCreation(e.to_string()))?;
    }

    let migrator = sqlx::migrate::Migrator::new(migrations_path.as_path())
        .await
        .map_err(StorageError::Migration)?;
    migrator.run(pool).await.map_err(StorageError::Migration)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn test_run_migrations_on_memory_db() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("migrations should run");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"credentials"));
        assert!(names.contains(&"ranking_records"));
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("first run");
        run_migrations(&pool).await.expect("second run");
    }
}
