//! Category repository
//!
//! Database operations for categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL
//!
//! `post_count` is never written here except at creation; the post repository
//! moves it inside its own transactions.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::base::{Entity, EntityStore};
use crate::db::error::{EntityKind, RepoResult, RepositoryError};
use crate::db::filter::{SqlValue, WhereClause};
use crate::db::relations::{self, Relation};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CreateCategoryInput};

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;
    const TABLE: &'static str = "categories";
    const ALIAS: &'static str = "c";
    const COLUMNS: &'static str = "c.id, c.name, c.slug, c.description, c.post_count, c.created_at";
    const SOFT_DELETE: bool = false;

    fn from_sqlite_row(row: &SqliteRow) -> RepoResult<Self> {
        Ok(Category {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            post_count: row.try_get("post_count")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn from_mysql_row(row: &MySqlRow) -> RepoResult<Self> {
        Ok(Category {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            post_count: row.try_get("post_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category with `post_count = 0`
    async fn create(&self, input: &CreateCategoryInput) -> RepoResult<Category>;

    /// Get category by ID
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Category>>;

    /// Get category by slug
    async fn find_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;

    /// List all categories ordered by name
    async fn list(&self) -> RepoResult<Vec<Category>>;

    /// Delete a category; its post links go with it
    async fn delete(&self, id: i64) -> RepoResult<()>;

    /// Count live posts linked to the category by querying the link table
    async fn count_linked_posts(&self, id: i64) -> RepoResult<i64>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    store: EntityStore<Category>,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            store: EntityStore::new(pool),
        }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, input: &CreateCategoryInput) -> RepoResult<Category> {
        let id = match self.store.pool().backend() {
            Backend::Sqlite(pool) => create_category_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_category_mysql(pool, input).await?,
        };
        tracing::info!(id, slug = %input.slug, "Created category");
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Category, id))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Category>> {
        self.store.find_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let mut filter = WhereClause::new();
        filter.push("c.slug = ?", [SqlValue::from(slug)]);
        self.store.find_one(&filter).await
    }

    async fn list(&self) -> RepoResult<Vec<Category>> {
        let sql = format!("{} ORDER BY c.name ASC", EntityStore::<Category>::select_sql());
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql).fetch_all(pool).await?;
                rows.iter().map(Category::from_sqlite_row).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql).fetch_all(pool).await?;
                rows.iter().map(Category::from_mysql_row).collect()
            }
        }
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        self.store.hard_delete(id).await
    }

    async fn count_linked_posts(&self, id: i64) -> RepoResult<i64> {
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                relations::count_live_posts_sqlite(pool, Relation::Categories, id).await
            }
            Backend::Mysql(pool) => {
                relations::count_live_posts_mysql(pool, Relation::Categories, id).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, input: &CreateCategoryInput) -> RepoResult<i64> {
    let result = sqlx::query(
        "INSERT INTO categories (name, slug, description, post_count, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, input: &CreateCategoryInput) -> RepoResult<i64> {
    let result = sqlx::query(
        "INSERT INTO categories (name, slug, description, post_count, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.last_insert_id() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, insert_user, setup_pool};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = setup_pool().await;
        let repo = SqlxCategoryRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_category() {
        let (_pool, repo) = setup_test_repo().await;

        let category = repo
            .create(&CreateCategoryInput::new("Technology", "technology").with_description("Tech news"))
            .await
            .expect("Failed to create category");

        assert!(category.id > 0);
        assert_eq!(category.name, "Technology");
        assert_eq!(category.description.as_deref(), Some("Tech news"));
        assert_eq!(category.post_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let (_pool, repo) = setup_test_repo().await;

        repo.create(&CreateCategoryInput::new("Business", "business"))
            .await
            .unwrap();
        let err = repo
            .create(&CreateCategoryInput::new("Business 2", "business"))
            .await
            .unwrap_err();

        assert!(err.is_conflict(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_find_by_slug() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&CreateCategoryInput::new("Travel", "travel"))
            .await
            .unwrap();

        let found = repo.find_by_slug("travel").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(repo.find_by_slug("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let (_pool, repo) = setup_test_repo().await;
        for (name, slug) in [("Travel", "travel"), ("Business", "business"), ("Lifestyle", "lifestyle")] {
            repo.create(&CreateCategoryInput::new(name, slug)).await.unwrap();
        }

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Business", "Lifestyle", "Travel"]);
    }

    #[tokio::test]
    async fn test_delete_category() {
        let (_pool, repo) = setup_test_repo().await;
        let category = repo
            .create(&CreateCategoryInput::new("Temp", "temp"))
            .await
            .unwrap();

        repo.delete(category.id).await.unwrap();
        assert!(repo.find_by_id(category.id).await.unwrap().is_none());

        let err = repo.delete(category.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: EntityKind::Category, .. }));
    }

    #[tokio::test]
    async fn test_count_linked_posts_ignores_deleted() {
        let (pool, repo) = setup_test_repo().await;
        let sqlite = pool.as_sqlite().unwrap();
        let category = repo
            .create(&CreateCategoryInput::new("Tech", "tech"))
            .await
            .unwrap();
        let author = insert_user(sqlite, "writer@example.com").await;

        for slug in ["a", "b"] {
            let post = insert_post(sqlite, author, slug).await;
            sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
                .bind(post)
                .bind(category.id)
                .execute(sqlite)
                .await
                .unwrap();
        }
        sqlx::query("UPDATE posts SET deleted_at = ? WHERE slug = 'b'")
            .bind(Utc::now())
            .execute(sqlite)
            .await
            .unwrap();

        assert_eq!(repo.count_linked_posts(category.id).await.unwrap(), 1);
    }
}
