//! Storage clients
//!
//! The two connection pools the process owns: one relational pool for
//! users, posts and taxonomy, and one document pool for activity logs.
//! Both are opened once at startup and shared by every repository.

use anyhow::{Context, Result};

use crate::config::{ActivityLogConfig, Config};
use crate::db::{self, migrations, DynDatabasePool};
use crate::docstore::{ActivityLogRepository, SqlxActivityLogRepository};

/// Open pools for both stores
#[derive(Clone)]
pub struct StorageClients {
    pub relational: DynDatabasePool,
    pub documents: DynDatabasePool,
    /// Days an activity document lives before it is hidden and purged
    pub activity_ttl_days: u32,
}

impl StorageClients {
    /// Connect both pools, migrate the relational schema and create the
    /// activity collection with its indexes
    pub async fn connect(config: &Config) -> Result<Self> {
        let relational = db::create_pool(&config.database)
            .await
            .context("Failed to connect relational store")?;
        tracing::info!("Relational store connected: {:?}", config.database.driver);

        migrations::run_migrations(&relational)
            .await
            .context("Failed to run migrations")?;

        let documents = db::create_pool(&config.activity_log.database())
            .await
            .context("Failed to connect document store")?;
        tracing::info!("Document store connected: {:?}", config.activity_log.driver);

        let clients = Self {
            relational,
            documents,
            activity_ttl_days: config.activity_log.ttl_days,
        };
        clients
            .activity_repository()
            .ensure_indexes()
            .await
            .context("Failed to create activity log indexes")?;

        Ok(clients)
    }

    /// Both stores on separate in-memory SQLite pools, migrated
    pub async fn in_memory() -> Result<Self> {
        let relational = db::create_test_pool().await?;
        migrations::run_migrations(&relational).await?;
        let documents = db::create_test_pool().await?;

        let clients = Self {
            relational,
            documents,
            activity_ttl_days: ActivityLogConfig::default().ttl_days,
        };
        clients.activity_repository().ensure_indexes().await?;
        Ok(clients)
    }

    pub(crate) fn activity_repository(&self) -> SqlxActivityLogRepository {
        SqlxActivityLogRepository::new(self.documents.clone(), self.activity_ttl_days)
    }

    /// Check both pools answer
    pub async fn ping(&self) -> Result<()> {
        self.relational.ping().await.context("Relational store unreachable")?;
        self.documents.ping().await.context("Document store unreachable")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.relational.close().await;
        self.documents.close().await;
        tracing::info!("Storage clients closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DatabaseDriver};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_both_stores() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: dir.path().join("quill.db").to_string_lossy().into_owned(),
            max_connections: 2,
        };
        config.activity_log.url = dir.path().join("logs/activity.db").to_string_lossy().into_owned();

        let clients = StorageClients::connect(&config).await.expect("Failed to connect");

        assert!(migrations::is_up_to_date(&clients.relational).await.unwrap());
        clients.ping().await.unwrap();
        assert!(dir.path().join("logs/activity.db").exists());
        assert_eq!(clients.activity_ttl_days, config.activity_log.ttl_days);

        // The relational schema does not leak into the document store
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'posts'",
        )
        .fetch_one(clients.documents.as_sqlite().unwrap())
        .await
        .unwrap();
        assert_eq!(tables, 0);

        clients.close().await;
        assert!(clients.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_clients() {
        let clients = StorageClients::in_memory().await.unwrap();
        clients.ping().await.unwrap();
        assert_eq!(migrations::pending_count(&clients.relational).await.unwrap(), 0);
    }
}
