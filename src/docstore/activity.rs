//! Activity log repository
//!
//! Documents live in `user_activity_logs`. Reads never return a document
//! older than the TTL, whether or not the purge task has removed it yet.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::{Backend, DynDatabasePool, RepoResult};
use crate::models::{ActivityLog, ActivityPage, ActivityPagination, ActivityQuery, LogActivityInput};

/// `cleanup_old_logs` keeps this many days when the caller has no preference
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

const COLLECTION: &str = "user_activity_logs";

const INDEXES: [(&str, &str); 2] = [
    ("idx_activity_user_id", "user_id"),
    ("idx_activity_created_at", "created_at"),
];

/// Activity log repository trait
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    /// Create the collection and its user-id and creation-time indexes
    async fn ensure_indexes(&self) -> RepoResult<()>;

    /// Append one document
    async fn log_activity(&self, input: &LogActivityInput) -> RepoResult<ActivityLog>;

    /// One window of a user's activity plus the total
    async fn user_activities(&self, user_id: &str, query: &ActivityQuery) -> RepoResult<ActivityPage>;

    /// Delete documents created more than `days_to_keep` days ago; returns the count
    async fn cleanup_old_logs(&self, days_to_keep: u32) -> RepoResult<u64>;

    /// Delete documents past the TTL; returns the count
    async fn purge_expired(&self) -> RepoResult<u64>;
}

/// SQLx-based activity log repository
pub struct SqlxActivityLogRepository {
    pool: DynDatabasePool,
    ttl: Duration,
}

impl SqlxActivityLogRepository {
    pub fn new(pool: DynDatabasePool, ttl_days: u32) -> Self {
        Self {
            pool,
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool, ttl_days: u32) -> Arc<dyn ActivityLogRepository> {
        Arc::new(Self::new(pool, ttl_days))
    }

    fn expiry_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.ttl
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let sql = format!("DELETE FROM {COLLECTION} WHERE created_at < ?");
        let deleted = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql).bind(cutoff).execute(pool).await?.rows_affected(),
            Backend::Mysql(pool) => sqlx::query(&sql).bind(cutoff).execute(pool).await?.rows_affected(),
        };
        Ok(deleted)
    }
}

#[async_trait]
impl ActivityLogRepository for SqlxActivityLogRepository {
    async fn ensure_indexes(&self) -> RepoResult<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => ensure_indexes_sqlite(pool).await?,
            Backend::Mysql(pool) => ensure_indexes_mysql(pool).await?,
        }
        tracing::debug!(collection = COLLECTION, ttl_days = self.ttl.num_days(), "Activity log indexes ready");
        Ok(())
    }

    async fn log_activity(&self, input: &LogActivityInput) -> RepoResult<ActivityLog> {
        let now = Utc::now();
        let doc = ActivityLog {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            action: input.action.clone(),
            metadata: input.metadata.clone(),
            ip_address: input.ip_address.clone(),
            user_agent: input.user_agent.clone(),
            created_at: now,
            updated_at: now,
        };
        let metadata = doc.metadata.as_ref().map(serde_json::to_string).transpose()?;

        let sql = format!(
            "INSERT INTO {COLLECTION} (id, user_id, action, metadata, ip_address, user_agent, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(&sql)
                    .bind(&doc.id)
                    .bind(&doc.user_id)
                    .bind(&doc.action)
                    .bind(&metadata)
                    .bind(&doc.ip_address)
                    .bind(&doc.user_agent)
                    .bind(doc.created_at)
                    .bind(doc.updated_at)
                    .execute(pool)
                    .await?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(&sql)
                    .bind(&doc.id)
                    .bind(&doc.user_id)
                    .bind(&doc.action)
                    .bind(&metadata)
                    .bind(&doc.ip_address)
                    .bind(&doc.user_agent)
                    .bind(doc.created_at)
                    .bind(doc.updated_at)
                    .execute(pool)
                    .await?;
            }
        }

        tracing::debug!(id = %doc.id, user_id = %doc.user_id, action = %doc.action, "Logged activity");
        Ok(doc)
    }

    async fn user_activities(&self, user_id: &str, query: &ActivityQuery) -> RepoResult<ActivityPage> {
        let cutoff = self.expiry_cutoff();
        let (total, data) = match self.pool.backend() {
            Backend::Sqlite(pool) => futures::try_join!(
                count_activities_sqlite(pool, user_id, cutoff),
                find_activities_sqlite(pool, user_id, cutoff, query)
            )?,
            Backend::Mysql(pool) => futures::try_join!(
                count_activities_mysql(pool, user_id, cutoff),
                find_activities_mysql(pool, user_id, cutoff, query)
            )?,
        };
        Ok(ActivityPage {
            data,
            pagination: ActivityPagination::new(total, query),
        })
    }

    async fn cleanup_old_logs(&self, days_to_keep: u32) -> RepoResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_to_keep));
        let deleted = self.delete_older_than(cutoff).await?;
        tracing::info!(deleted, days_to_keep, "Cleaned up old activity logs");
        Ok(deleted)
    }

    async fn purge_expired(&self) -> RepoResult<u64> {
        let deleted = self.delete_older_than(self.expiry_cutoff()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Purged expired activity logs");
        }
        Ok(deleted)
    }
}

/// Run `purge_expired` every `every` until the runtime shuts down
pub fn spawn_purge_task(repo: Arc<dyn ActivityLogRepository>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = repo.purge_expired().await {
                tracing::warn!("Failed to purge expired activity logs: {}", e);
            }
        }
    })
}

fn order_by(query: &ActivityQuery) -> String {
    format!("created_at {}, id {}", query.order.as_sql(), query.order.as_sql())
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn ensure_indexes_sqlite(pool: &SqlitePool) -> RepoResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_activity_logs (
            id VARCHAR(36) PRIMARY KEY,
            user_id VARCHAR(255) NOT NULL,
            action VARCHAR(255) NOT NULL,
            metadata TEXT,
            ip_address VARCHAR(64),
            user_agent TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (name, column) in INDEXES {
        let sql = format!("CREATE INDEX IF NOT EXISTS {name} ON {COLLECTION}({column})");
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}

async fn count_activities_sqlite(pool: &SqlitePool, user_id: &str, cutoff: DateTime<Utc>) -> RepoResult<i64> {
    let sql = format!("SELECT COUNT(*) AS total FROM {COLLECTION} WHERE user_id = ? AND created_at >= ?");
    let row = sqlx::query(&sql).bind(user_id).bind(cutoff).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

async fn find_activities_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    cutoff: DateTime<Utc>,
    query: &ActivityQuery,
) -> RepoResult<Vec<ActivityLog>> {
    let sql = format!(
        "SELECT id, user_id, action, metadata, ip_address, user_agent, created_at, updated_at \
         FROM {COLLECTION} WHERE user_id = ? AND created_at >= ? ORDER BY {} LIMIT ? OFFSET ?",
        order_by(query)
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(cutoff)
        .bind(i64::from(query.take))
        .bind(i64::from(query.skip))
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_activity_sqlite).collect()
}

fn row_to_activity_sqlite(row: &SqliteRow) -> RepoResult<ActivityLog> {
    let metadata: Option<String> = row.try_get("metadata")?;
    Ok(ActivityLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn ensure_indexes_mysql(pool: &MySqlPool) -> RepoResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_activity_logs (
            id VARCHAR(36) PRIMARY KEY,
            user_id VARCHAR(255) NOT NULL,
            action VARCHAR(255) NOT NULL,
            metadata TEXT,
            ip_address VARCHAR(64),
            user_agent TEXT,
            created_at DATETIME(6) NOT NULL,
            updated_at DATETIME(6) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // MySQL has no CREATE INDEX IF NOT EXISTS
    for (name, column) in INDEXES {
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
        )
        .bind(COLLECTION)
        .bind(name)
        .fetch_one(pool)
        .await?;
        if existing == 0 {
            let sql = format!("CREATE INDEX {name} ON {COLLECTION}({column})");
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

async fn count_activities_mysql(pool: &MySqlPool, user_id: &str, cutoff: DateTime<Utc>) -> RepoResult<i64> {
    let sql = format!("SELECT COUNT(*) AS total FROM {COLLECTION} WHERE user_id = ? AND created_at >= ?");
    let row = sqlx::query(&sql).bind(user_id).bind(cutoff).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

async fn find_activities_mysql(
    pool: &MySqlPool,
    user_id: &str,
    cutoff: DateTime<Utc>,
    query: &ActivityQuery,
) -> RepoResult<Vec<ActivityLog>> {
    let sql = format!(
        "SELECT id, user_id, action, metadata, ip_address, user_agent, created_at, updated_at \
         FROM {COLLECTION} WHERE user_id = ? AND created_at >= ? ORDER BY {} LIMIT ? OFFSET ?",
        order_by(query)
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(cutoff)
        .bind(i64::from(query.take))
        .bind(i64::from(query.skip))
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_activity_mysql).collect()
}

fn row_to_activity_mysql(row: &MySqlRow) -> RepoResult<ActivityLog> {
    let metadata: Option<String> = row.try_get("metadata")?;
    Ok(ActivityLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
