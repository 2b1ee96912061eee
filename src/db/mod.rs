//! Form database handle
//!
//! One SQLite pool backs every component. Forms, submissions, relationships
//! and grants each add their operations to `FormDb` from their own module;
//! this module owns connection setup, schema creation and statistics.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Form database handle
#[derive(Clone)]
pub struct FormDb {
    pool: SqlitePool,
}

impl FormDb {
    /// Connect using the configured database path and pool settings
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(
            &config.paths.db_file,
            config.database.max_connections,
            Duration::from_secs(config.database.busy_timeout_secs),
        )
        .await
    }

    /// Create database with path directly (without full config),
    /// initializing the schema when needed
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path, 5, Duration::from_secs(5)).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='forms'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    /// Get global statistics
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let form_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM forms GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let submission_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions")
            .fetch_one(&self.pool)
            .await?;

        let relationship_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM child_relationships")
                .fetch_one(&self.pool)
                .await?;

        let mut stats = GlobalStats {
            user_count: user_count as usize,
            submission_count: submission_count as usize,
            relationship_count: relationship_count as usize,
            ..Default::default()
        };
        for (status, count) in form_counts {
            match status.as_str() {
                "draft" => stats.draft_forms = count as usize,
                "active" => stats.active_forms = count as usize,
                _ => stats.archived_forms = count as usize,
            }
        }

        Ok(stats)
    }
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub user_count: usize,
    pub draft_forms: usize,
    pub active_forms: usize,
    pub archived_forms: usize,
    pub submission_count: usize,
    pub relationship_count: usize,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{Role, User};
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (FormDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = FormDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    pub async fn user(db: &FormDb, name: &str, role: Role) -> User {
        db.create_user(name, role).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_initializes_schema_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("forms.db");

        let db = FormDb::new(&path).await.unwrap();
        assert!(db.is_initialized().await.unwrap());

        // Re-opening an initialized file must not fail
        let again = FormDb::new(&path).await.unwrap();
        assert!(again.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let (db, _tmp) = setup_test_db().await;
        let stats = db.global_stats().await.unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.active_forms, 0);
        assert_eq!(stats.relationship_count, 0);
    }
}
