//! Tag repository
//!
//! Database operations for tags. Mirrors the category repository: tags carry
//! the same denormalized `post_count`, maintained by the post repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::base::{Entity, EntityStore};
use crate::db::error::{EntityKind, RepoResult, RepositoryError};
use crate::db::filter::{SqlValue, WhereClause};
use crate::db::relations::{self, Relation};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateTagInput, Tag};

impl Entity for Tag {
    const KIND: EntityKind = EntityKind::Tag;
    const TABLE: &'static str = "tags";
    const ALIAS: &'static str = "t";
    const COLUMNS: &'static str = "t.id, t.name, t.slug, t.post_count, t.created_at";
    const SOFT_DELETE: bool = false;

    fn from_sqlite_row(row: &SqliteRow) -> RepoResult<Self> {
        Ok(Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            post_count: row.try_get("post_count")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn from_mysql_row(row: &MySqlRow) -> RepoResult<Self> {
        Ok(Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            post_count: row.try_get("post_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag with `post_count = 0`
    async fn create(&self, input: &CreateTagInput) -> RepoResult<Tag>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Tag>>;

    async fn find_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>>;

    /// List all tags ordered by name
    async fn list(&self) -> RepoResult<Vec<Tag>>;

    /// Most-used tags first, for tag clouds
    async fn popular(&self, limit: u32) -> RepoResult<Vec<Tag>>;

    /// Delete a tag; its post links go with it
    async fn delete(&self, id: i64) -> RepoResult<()>;

    /// Count live posts linked to the tag by querying the link table
    async fn count_linked_posts(&self, id: i64) -> RepoResult<i64>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    store: EntityStore<Tag>,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            store: EntityStore::new(pool),
        }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, input: &CreateTagInput) -> RepoResult<Tag> {
        let id = match self.store.pool().backend() {
            Backend::Sqlite(pool) => create_tag_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_tag_mysql(pool, input).await?,
        };
        tracing::info!(id, slug = %input.slug, "Created tag");
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Tag, id))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Tag>> {
        self.store.find_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>> {
        let mut filter = WhereClause::new();
        filter.push("t.slug = ?", [SqlValue::from(slug)]);
        self.store.find_one(&filter).await
    }

    async fn list(&self) -> RepoResult<Vec<Tag>> {
        let sql = format!("{} ORDER BY t.name ASC", EntityStore::<Tag>::select_sql());
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql).fetch_all(pool).await?;
                rows.iter().map(Tag::from_sqlite_row).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql).fetch_all(pool).await?;
                rows.iter().map(Tag::from_mysql_row).collect()
            }
        }
    }

    async fn popular(&self, limit: u32) -> RepoResult<Vec<Tag>> {
        let sql = format!(
            "{} WHERE t.post_count > 0 ORDER BY t.post_count DESC, t.name ASC LIMIT ?",
            EntityStore::<Tag>::select_sql()
        );
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql).bind(limit as i64).fetch_all(pool).await?;
                rows.iter().map(Tag::from_sqlite_row).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql).bind(limit as i64).fetch_all(pool).await?;
                rows.iter().map(Tag::from_mysql_row).collect()
            }
        }
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        self.store.hard_delete(id).await
    }

    async fn count_linked_posts(&self, id: i64) -> RepoResult<i64> {
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                relations::count_live_posts_sqlite(pool, Relation::Tags, id).await
            }
            Backend::Mysql(pool) => {
                relations::count_live_posts_mysql(pool, Relation::Tags, id).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, input: &CreateTagInput) -> RepoResult<i64> {
    let result = sqlx::query(
        "INSERT INTO tags (name, slug, post_count, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, input: &CreateTagInput) -> RepoResult<i64> {
    let result = sqlx::query(
        "INSERT INTO tags (name, slug, post_count, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.last_insert_id() as i64)
}
