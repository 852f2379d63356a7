//! Post repository
//!
//! Database operations for posts.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite and MySQL
//!
//! Every write that touches category or tag links runs in one transaction
//! together with the post row change and the `post_count` adjustments, so a
//! failure anywhere leaves links, counters and the post exactly as they were.
//! View counting is a single additive UPDATE outside any transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::base::{decode_enum, Entity, EntityStore};
use crate::db::error::{EntityKind, RepoResult, RepositoryError};
use crate::db::filter::{bind_mysql, bind_sqlite, placeholders, SqlValue, WhereClause};
use crate::db::relations::{self, Relation, RelationDiff};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{
    AuthorSummary, CreatePostInput, ListParams, Paginated, Post, PostInclude, PostQuery, PostSort,
    PostStatus, PostWithRelations, UpdatePostInput,
};

/// Number of related posts returned when the caller has no preference
pub const DEFAULT_RELATED_LIMIT: u32 = 3;

impl Entity for Post {
    const KIND: EntityKind = EntityKind::Post;
    const TABLE: &'static str = "posts";
    const ALIAS: &'static str = "p";
    const COLUMNS: &'static str = "p.id, p.title, p.slug, p.excerpt, p.content, p.status, p.featured, \
        p.published_at, p.view_count, p.author_id, p.created_at, p.updated_at, p.deleted_at";
    const SOFT_DELETE: bool = true;

    fn from_sqlite_row(row: &SqliteRow) -> RepoResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(Post {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            excerpt: row.try_get("excerpt")?,
            content: row.try_get("content")?,
            status: decode_enum(&status)?,
            featured: row.try_get("featured")?,
            published_at: row.try_get("published_at")?,
            view_count: row.try_get("view_count")?,
            author_id: row.try_get("author_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn from_mysql_row(row: &MySqlRow) -> RepoResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(Post {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            excerpt: row.try_get("excerpt")?,
            content: row.try_get("content")?,
            status: decode_enum(&status)?,
            featured: row.try_get("featured")?,
            published_at: row.try_get("published_at")?,
            view_count: row.try_get("view_count")?,
            author_id: row.try_get("author_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post with its initial category and tag links
    ///
    /// Returns the post with author, categories, tags and comment count resolved.
    async fn create(&self, input: &CreatePostInput) -> RepoResult<PostWithRelations>;

    /// Update fields and diff-apply category / tag links in one transaction
    async fn update(&self, id: i64, input: &UpdatePostInput) -> RepoResult<PostWithRelations>;

    /// Set the status; Published stamps `published_at` with the current time,
    /// any other status leaves it untouched
    async fn update_status(&self, id: i64, status: PostStatus) -> RepoResult<Post>;

    /// Stamp `deleted_at` and decrement every linked counter; links are kept
    async fn soft_delete(&self, id: i64) -> RepoResult<()>;

    /// Remove the post with its comments and links
    async fn hard_delete(&self, id: i64) -> RepoResult<()>;

    /// Add `by` to the view counter
    async fn increment_view_count(&self, id: i64, by: u32) -> RepoResult<()>;

    /// Get a live post by ID
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Post>>;

    /// Get a post by ID even if it was soft-deleted
    async fn find_including_deleted(&self, id: i64) -> RepoResult<Option<Post>>;

    /// Get a live post by ID with the requested relations
    async fn find_with_relations(
        &self,
        id: i64,
        include: PostInclude,
    ) -> RepoResult<Option<PostWithRelations>>;

    /// Publicly visible post by slug, with every relation resolved
    async fn find_published_by_slug(&self, slug: &str) -> RepoResult<Option<PostWithRelations>>;

    /// Filtered, paginated listing
    async fn list(
        &self,
        query: &PostQuery,
        params: &ListParams,
        include: PostInclude,
    ) -> RepoResult<Paginated<PostWithRelations>>;

    /// Other visible posts sharing any of `category_ids`, newest first
    async fn related_posts(
        &self,
        post_id: i64,
        category_ids: &[i64],
        limit: u32,
    ) -> RepoResult<Vec<PostWithRelations>>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    store: EntityStore<Post>,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            store: EntityStore::new(pool),
        }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    /// Resolve relations for already-fetched posts on a fresh connection
    async fn resolve(
        &self,
        posts: Vec<Post>,
        include: PostInclude,
    ) -> RepoResult<Vec<PostWithRelations>> {
        if posts.is_empty() || include.is_empty() {
            return Ok(posts.into_iter().map(PostWithRelations::bare).collect());
        }
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => {
                let mut conn = pool.acquire().await?;
                resolve_sqlite(&mut *conn, posts, include).await
            }
            Backend::Mysql(pool) => {
                let mut conn = pool.acquire().await?;
                resolve_mysql(&mut *conn, posts, include).await
            }
        }
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, input: &CreatePostInput) -> RepoResult<PostWithRelations> {
        let post = match self.store.pool().backend() {
            Backend::Sqlite(pool) => create_post_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_post_mysql(pool, input).await?,
        };
        tracing::info!(
            id = post.post.id,
            slug = %post.post.slug,
            categories = input.category_ids.len(),
            tags = input.tag_ids.len(),
            "Created post"
        );
        Ok(post)
    }

    async fn update(&self, id: i64, input: &UpdatePostInput) -> RepoResult<PostWithRelations> {
        let post = match self.store.pool().backend() {
            Backend::Sqlite(pool) => update_post_sqlite(pool, id, input).await?,
            Backend::Mysql(pool) => update_post_mysql(pool, id, input).await?,
        };
        tracing::info!(id, "Updated post");
        Ok(post)
    }

    async fn update_status(&self, id: i64, status: PostStatus) -> RepoResult<Post> {
        let now = Utc::now();
        let (sql, binds) = status_statement(id, status, now);
        let affected = match self.store.pool().backend() {
            Backend::Sqlite(pool) => bind_sqlite(sqlx::query(&sql), &binds)
                .execute(pool)
                .await?
                .rows_affected(),
            Backend::Mysql(pool) => bind_mysql(sqlx::query(&sql), &binds)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        if affected == 0 {
            return Err(RepositoryError::not_found(EntityKind::Post, id));
        }
        tracing::info!(id, status = %status, "Changed post status");
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))
    }

    async fn soft_delete(&self, id: i64) -> RepoResult<()> {
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => soft_delete_post_sqlite(pool, id).await?,
            Backend::Mysql(pool) => soft_delete_post_mysql(pool, id).await?,
        }
        tracing::info!(id, "Soft deleted post");
        Ok(())
    }

    async fn hard_delete(&self, id: i64) -> RepoResult<()> {
        match self.store.pool().backend() {
            Backend::Sqlite(pool) => hard_delete_post_sqlite(pool, id).await?,
            Backend::Mysql(pool) => hard_delete_post_mysql(pool, id).await?,
        }
        tracing::info!(id, "Hard deleted post");
        Ok(())
    }

    async fn increment_view_count(&self, id: i64, by: u32) -> RepoResult<()> {
        if by == 0 {
            return if self.store.exists(id).await? {
                Ok(())
            } else {
                Err(RepositoryError::not_found(EntityKind::Post, id))
            };
        }
        let sql = "UPDATE posts SET view_count = view_count + ? WHERE id = ? AND deleted_at IS NULL";
        let affected = match self.store.pool().backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(by as i64)
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(by as i64)
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        if affected == 0 {
            return Err(RepositoryError::not_found(EntityKind::Post, id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Post>> {
        self.store.find_by_id(id).await
    }

    async fn find_including_deleted(&self, id: i64) -> RepoResult<Option<Post>> {
        self.store.find_by_id_including_deleted(id).await
    }

    async fn find_with_relations(
        &self,
        id: i64,
        include: PostInclude,
    ) -> RepoResult<Option<PostWithRelations>> {
        let Some(post) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };
        Ok(self.resolve(vec![post], include).await?.pop())
    }

    async fn find_published_by_slug(&self, slug: &str) -> RepoResult<Option<PostWithRelations>> {
        let mut filter = post_filter(&PostQuery::published(), Utc::now());
        filter.push("p.slug = ?", [SqlValue::from(slug)]);
        let Some(post) = self.store.find_one(&filter).await? else {
            return Ok(None);
        };
        Ok(self.resolve(vec![post], PostInclude::all()).await?.pop())
    }

    async fn list(
        &self,
        query: &PostQuery,
        params: &ListParams,
        include: PostInclude,
    ) -> RepoResult<Paginated<PostWithRelations>> {
        let filter = post_filter(query, Utc::now());
        let Paginated { data, meta } = self
            .store
            .paginate(&filter, query.sort.order_by(), params)
            .await?;
        let data = self.resolve(data, include).await?;
        Ok(Paginated { data, meta })
    }

    async fn related_posts(
        &self,
        post_id: i64,
        category_ids: &[i64],
        limit: u32,
    ) -> RepoResult<Vec<PostWithRelations>> {
        if category_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut filter = post_filter(&PostQuery::published(), Utc::now());
        filter.push("p.id <> ?", [SqlValue::Int(post_id)]);
        filter.push(
            format!(
                "EXISTS (SELECT 1 FROM post_categories rc WHERE rc.post_id = p.id AND rc.category_id IN ({}))",
                placeholders(category_ids.len())
            ),
            category_ids.iter().map(|id| SqlValue::Int(*id)),
        );
        let posts = self
            .store
            .find_page(&filter, PostSort::PublishedDesc.order_by(), &ListParams::new(1, limit))
            .await?;
        let include = PostInclude {
            author: true,
            categories: true,
            ..PostInclude::default()
        };
        self.resolve(posts, include).await
    }
}

/// Translate a [`PostQuery`] into SQL conditions on alias `p`
fn post_filter(query: &PostQuery, now: DateTime<Utc>) -> WhereClause {
    let mut filter = WhereClause::new();

    if !query.include_deleted {
        filter.push_raw("p.deleted_at IS NULL");
    }
    if query.published_only {
        filter.push("p.status = ?", [SqlValue::from(PostStatus::Published.as_str())]);
        filter.push(
            "p.published_at IS NOT NULL AND p.published_at <= ?",
            [SqlValue::Timestamp(now)],
        );
    }
    if let Some(status) = query.status {
        filter.push("p.status = ?", [SqlValue::from(status.as_str())]);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.push_search(&["p.title", "p.excerpt", "p.content"], search);
    }
    if let Some(slug) = &query.category_slug {
        filter.push(
            "EXISTS (SELECT 1 FROM post_categories fc JOIN categories fcat ON fcat.id = fc.category_id \
             WHERE fc.post_id = p.id AND fcat.slug = ?)",
            [SqlValue::from(slug.as_str())],
        );
    }
    if let Some(slug) = &query.tag_slug {
        filter.push(
            "EXISTS (SELECT 1 FROM post_tags ft JOIN tags ftag ON ftag.id = ft.tag_id \
             WHERE ft.post_id = p.id AND ftag.slug = ?)",
            [SqlValue::from(slug.as_str())],
        );
    }
    if let Some(author_id) = query.author_id {
        filter.push("p.author_id = ?", [SqlValue::Int(author_id)]);
    }
    if let Some(featured) = query.featured {
        filter.push("p.featured = ?", [SqlValue::Bool(featured)]);
    }

    filter
}

/// `UPDATE posts SET ... WHERE id = ?` for the fields present in `input`
///
/// A move to Published from any other status stamps `published_at`.
fn update_statement(
    id: i64,
    input: &UpdatePostInput,
    current: &Post,
    now: DateTime<Utc>,
) -> (String, Vec<SqlValue>) {
    let mut sets: Vec<&'static str> = Vec::new();
    let mut binds = Vec::new();

    if let Some(title) = &input.title {
        sets.push("title = ?");
        binds.push(SqlValue::from(title.as_str()));
    }
    if let Some(slug) = &input.slug {
        sets.push("slug = ?");
        binds.push(SqlValue::from(slug.as_str()));
    }
    if let Some(excerpt) = &input.excerpt {
        sets.push("excerpt = ?");
        binds.push(SqlValue::from(excerpt.as_str()));
    }
    if let Some(content) = &input.content {
        sets.push("content = ?");
        binds.push(SqlValue::from(content.as_str()));
    }
    if let Some(status) = input.status {
        sets.push("status = ?");
        binds.push(SqlValue::from(status.as_str()));
        if status == PostStatus::Published && current.status != PostStatus::Published {
            sets.push("published_at = ?");
            binds.push(SqlValue::Timestamp(now));
        }
    }
    if let Some(featured) = input.featured {
        sets.push("featured = ?");
        binds.push(SqlValue::Bool(featured));
    }
    sets.push("updated_at = ?");
    binds.push(SqlValue::Timestamp(now));
    binds.push(SqlValue::Int(id));

    (format!("UPDATE posts SET {} WHERE id = ?", sets.join(", ")), binds)
}

fn status_statement(id: i64, status: PostStatus, now: DateTime<Utc>) -> (String, Vec<SqlValue>) {
    let status_value = SqlValue::from(status.as_str());
    if status == PostStatus::Published {
        (
            "UPDATE posts SET status = ?, published_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL"
                .to_string(),
            vec![
                status_value,
                SqlValue::Timestamp(now),
                SqlValue::Timestamp(now),
                SqlValue::Int(id),
            ],
        )
    } else {
        (
            "UPDATE posts SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL".to_string(),
            vec![status_value, SqlValue::Timestamp(now), SqlValue::Int(id)],
        )
    }
}

/// Desired link sets in an update, paired with their relation
fn requested_links(input: &UpdatePostInput) -> [(Relation, Option<&[i64]>); 2] {
    [
        (Relation::Categories, input.category_ids.as_deref()),
        (Relation::Tags, input.tag_ids.as_deref()),
    ]
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, input: &CreatePostInput) -> RepoResult<PostWithRelations> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    let status = input.status.unwrap_or_default();
    let published_at = (status == PostStatus::Published).then_some(now);

    ensure_author_sqlite(&mut *tx, input.author_id).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, excerpt, content, status, featured, published_at,
                           view_count, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(status.as_str())
    .bind(input.featured)
    .bind(published_at)
    .bind(input.author_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    relations::apply_diff_sqlite(&mut *tx, Relation::Categories, id, &RelationDiff::attach(&input.category_ids)).await?;
    relations::apply_diff_sqlite(&mut *tx, Relation::Tags, id, &RelationDiff::attach(&input.tag_ids)).await?;

    let post = load_full_sqlite(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

async fn update_post_sqlite(
    pool: &SqlitePool,
    id: i64,
    input: &UpdatePostInput,
) -> RepoResult<PostWithRelations> {
    let mut tx = pool.begin().await?;

    let current = fetch_post_sqlite(&mut *tx, id)
        .await?
        .filter(|post| !post.is_deleted())
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;

    let mut links_changed = false;
    for (relation, desired) in requested_links(input) {
        if desired.is_none() {
            continue;
        }
        let linked = relations::linked_ids_sqlite(&mut *tx, relation, id).await?;
        let diff = RelationDiff::compute(&linked, desired);
        if !diff.is_noop() {
            relations::apply_diff_sqlite(&mut *tx, relation, id, &diff).await?;
            links_changed = true;
        }
    }

    if input.has_field_changes() || links_changed {
        let (sql, binds) = update_statement(id, input, &current, Utc::now());
        bind_sqlite(sqlx::query(&sql), &binds).execute(&mut *tx).await?;
    }

    let post = load_full_sqlite(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

async fn soft_delete_post_sqlite(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let affected = sqlx::query(
        "UPDATE posts SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(RepositoryError::not_found(EntityKind::Post, id));
    }

    for relation in Relation::ALL {
        let linked = relations::linked_ids_sqlite(&mut *tx, relation, id).await?;
        relations::adjust_counters_sqlite(&mut *tx, relation, &linked, -1).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn hard_delete_post_sqlite(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let mut tx = pool.begin().await?;

    let post = fetch_post_sqlite(&mut *tx, id)
        .await?
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;

    for relation in Relation::ALL {
        if !post.is_deleted() {
            let linked = relations::linked_ids_sqlite(&mut *tx, relation, id).await?;
            relations::adjust_counters_sqlite(&mut *tx, relation, &linked, -1).await?;
        }
        let sql = format!("DELETE FROM {} WHERE post_id = ?", relation.link_table());
        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    }
    sqlx::query("DELETE FROM comments WHERE post_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn ensure_author_sqlite(conn: &mut SqliteConnection, author_id: i64) -> RepoResult<()> {
    let row = sqlx::query("SELECT id FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(author_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(RepositoryError::not_found(EntityKind::User, author_id)),
    }
}

/// Post row by id, soft-deleted or not
async fn fetch_post_sqlite(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Post>> {
    let sql = format!("{} WHERE p.id = ?", EntityStore::<Post>::select_sql());
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(Post::from_sqlite_row).transpose()
}

/// Post with every relation, read on the given connection
async fn load_full_sqlite(conn: &mut SqliteConnection, id: i64) -> RepoResult<PostWithRelations> {
    let post = fetch_post_sqlite(&mut *conn, id)
        .await?
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;
    resolve_sqlite(conn, vec![post], PostInclude::all())
        .await?
        .pop()
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))
}

async fn resolve_sqlite(
    conn: &mut SqliteConnection,
    posts: Vec<Post>,
    include: PostInclude,
) -> RepoResult<Vec<PostWithRelations>> {
    let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();

    let authors = if include.author {
        let mut author_ids: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        load_authors_sqlite(&mut *conn, &author_ids).await?
    } else {
        HashMap::new()
    };
    let mut categories = if include.categories {
        relations::load_terms_sqlite(&mut *conn, Relation::Categories, &post_ids).await?
    } else {
        HashMap::new()
    };
    let mut tags = if include.tags {
        relations::load_terms_sqlite(&mut *conn, Relation::Tags, &post_ids).await?
    } else {
        HashMap::new()
    };
    let comment_counts = if include.comment_count {
        load_comment_counts_sqlite(&mut *conn, &post_ids).await?
    } else {
        HashMap::new()
    };

    Ok(posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned();
            let post_categories = include
                .categories
                .then(|| categories.remove(&post.id).unwrap_or_default());
            let post_tags = include.tags.then(|| tags.remove(&post.id).unwrap_or_default());
            let comment_count = include
                .comment_count
                .then(|| comment_counts.get(&post.id).copied().unwrap_or(0));
            PostWithRelations {
                post,
                author,
                categories: post_categories,
                tags: post_tags,
                comment_count,
            }
        })
        .collect())
}

async fn load_authors_sqlite(
    conn: &mut SqliteConnection,
    author_ids: &[i64],
) -> RepoResult<HashMap<i64, AuthorSummary>> {
    let mut authors = HashMap::new();
    if author_ids.is_empty() {
        return Ok(authors);
    }
    let sql = format!(
        "SELECT id, name, email, image FROM users WHERE id IN ({})",
        placeholders(author_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in author_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        let author = AuthorSummary {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            image: row.try_get("image")?,
        };
        authors.insert(author.id, author);
    }
    Ok(authors)
}

async fn load_comment_counts_sqlite(
    conn: &mut SqliteConnection,
    post_ids: &[i64],
) -> RepoResult<HashMap<i64, i64>> {
    let mut counts = HashMap::new();
    if post_ids.is_empty() {
        return Ok(counts);
    }
    let sql = format!(
        "SELECT post_id, COUNT(*) AS total FROM comments WHERE post_id IN ({}) GROUP BY post_id",
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        counts.insert(row.try_get("post_id")?, row.try_get("total")?);
    }
    Ok(counts)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, input: &CreatePostInput) -> RepoResult<PostWithRelations> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    let status = input.status.unwrap_or_default();
    let published_at = (status == PostStatus::Published).then_some(now);

    ensure_author_mysql(&mut *tx, input.author_id).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, excerpt, content, status, featured, published_at,
                           view_count, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(status.as_str())
    .bind(input.featured)
    .bind(published_at)
    .bind(input.author_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_id() as i64;

    relations::apply_diff_mysql(&mut *tx, Relation::Categories, id, &RelationDiff::attach(&input.category_ids)).await?;
    relations::apply_diff_mysql(&mut *tx, Relation::Tags, id, &RelationDiff::attach(&input.tag_ids)).await?;

    let post = load_full_mysql(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

async fn update_post_mysql(
    pool: &MySqlPool,
    id: i64,
    input: &UpdatePostInput,
) -> RepoResult<PostWithRelations> {
    let mut tx = pool.begin().await?;

    let current = fetch_post_mysql(&mut *tx, id)
        .await?
        .filter(|post| !post.is_deleted())
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;

    let mut links_changed = false;
    for (relation, desired) in requested_links(input) {
        if desired.is_none() {
            continue;
        }
        let linked = relations::linked_ids_mysql(&mut *tx, relation, id).await?;
        let diff = RelationDiff::compute(&linked, desired);
        if !diff.is_noop() {
            relations::apply_diff_mysql(&mut *tx, relation, id, &diff).await?;
            links_changed = true;
        }
    }

    if input.has_field_changes() || links_changed {
        let (sql, binds) = update_statement(id, input, &current, Utc::now());
        bind_mysql(sqlx::query(&sql), &binds).execute(&mut *tx).await?;
    }

    let post = load_full_mysql(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

async fn soft_delete_post_mysql(pool: &MySqlPool, id: i64) -> RepoResult<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let affected = sqlx::query(
        "UPDATE posts SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(RepositoryError::not_found(EntityKind::Post, id));
    }

    for relation in Relation::ALL {
        let linked = relations::linked_ids_mysql(&mut *tx, relation, id).await?;
        relations::adjust_counters_mysql(&mut *tx, relation, &linked, -1).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn hard_delete_post_mysql(pool: &MySqlPool, id: i64) -> RepoResult<()> {
    let mut tx = pool.begin().await?;

    let post = fetch_post_mysql(&mut *tx, id)
        .await?
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;

    for relation in Relation::ALL {
        if !post.is_deleted() {
            let linked = relations::linked_ids_mysql(&mut *tx, relation, id).await?;
            relations::adjust_counters_mysql(&mut *tx, relation, &linked, -1).await?;
        }
        let sql = format!("DELETE FROM {} WHERE post_id = ?", relation.link_table());
        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    }
    sqlx::query("DELETE FROM comments WHERE post_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn ensure_author_mysql(conn: &mut MySqlConnection, author_id: i64) -> RepoResult<()> {
    let row = sqlx::query("SELECT id FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(author_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(RepositoryError::not_found(EntityKind::User, author_id)),
    }
}

/// Post row by id, soft-deleted or not
async fn fetch_post_mysql(conn: &mut MySqlConnection, id: i64) -> RepoResult<Option<Post>> {
    let sql = format!("{} WHERE p.id = ?", EntityStore::<Post>::select_sql());
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(Post::from_mysql_row).transpose()
}

/// Post with every relation, read on the given connection
async fn load_full_mysql(conn: &mut MySqlConnection, id: i64) -> RepoResult<PostWithRelations> {
    let post = fetch_post_mysql(&mut *conn, id)
        .await?
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))?;
    resolve_mysql(conn, vec![post], PostInclude::all())
        .await?
        .pop()
        .ok_or_else(|| RepositoryError::not_found(EntityKind::Post, id))
}

async fn resolve_mysql(
    conn: &mut MySqlConnection,
    posts: Vec<Post>,
    include: PostInclude,
) -> RepoResult<Vec<PostWithRelations>> {
    let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();

    let authors = if include.author {
        let mut author_ids: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        load_authors_mysql(&mut *conn, &author_ids).await?
    } else {
        HashMap::new()
    };
    let mut categories = if include.categories {
        relations::load_terms_mysql(&mut *conn, Relation::Categories, &post_ids).await?
    } else {
        HashMap::new()
    };
    let mut tags = if include.tags {
        relations::load_terms_mysql(&mut *conn, Relation::Tags, &post_ids).await?
    } else {
        HashMap::new()
    };
    let comment_counts = if include.comment_count {
        load_comment_counts_mysql(&mut *conn, &post_ids).await?
    } else {
        HashMap::new()
    };

    Ok(posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned();
            let post_categories = include
                .categories
                .then(|| categories.remove(&post.id).unwrap_or_default());
            let post_tags = include.tags.then(|| tags.remove(&post.id).unwrap_or_default());
            let comment_count = include
                .comment_count
                .then(|| comment_counts.get(&post.id).copied().unwrap_or(0));
            PostWithRelations {
                post,
                author,
                categories: post_categories,
                tags: post_tags,
                comment_count,
            }
        })
        .collect())
}

async fn load_authors_mysql(
    conn: &mut MySqlConnection,
    author_ids: &[i64],
) -> RepoResult<HashMap<i64, AuthorSummary>> {
    let mut authors = HashMap::new();
    if author_ids.is_empty() {
        return Ok(authors);
    }
    let sql = format!(
        "SELECT id, name, email, image FROM users WHERE id IN ({})",
        placeholders(author_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in author_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        let author = AuthorSummary {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            image: row.try_get("image")?,
        };
        authors.insert(author.id, author);
    }
    Ok(authors)
}

async fn load_comment_counts_mysql(
    conn: &mut MySqlConnection,
    post_ids: &[i64],
) -> RepoResult<HashMap<i64, i64>> {
    let mut counts = HashMap::new();
    if post_ids.is_empty() {
        return Ok(counts);
    }
    let sql = format!(
        "SELECT post_id, COUNT(*) AS total FROM comments WHERE post_id IN ({}) GROUP BY post_id",
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        counts.insert(row.try_get("post_id")?, row.try_get("total")?);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::category::{CategoryRepository, SqlxCategoryRepository};
    use crate::db::repositories::tag::{SqlxTagRepository, TagRepository};
    use crate::db::repositories::test_support::{insert_comment, insert_user, setup_pool};
    use crate::models::{CreateCategoryInput, CreateTagInput};

    struct Fixture {
        pool: DynDatabasePool,
        posts: SqlxPostRepository,
        categories: SqlxCategoryRepository,
        tags: SqlxTagRepository,
        author: i64,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = setup_pool().await;
            let author = insert_user(pool.as_sqlite().unwrap(), "author@example.com").await;
            Self {
                posts: SqlxPostRepository::new(pool.clone()),
                categories: SqlxCategoryRepository::new(pool.clone()),
                tags: SqlxTagRepository::new(pool.clone()),
                pool,
                author,
            }
        }

        fn sqlite(&self) -> &SqlitePool {
            self.pool.as_sqlite().unwrap()
        }

        async fn category(&self, name: &str) -> i64 {
            self.categories
                .create(&CreateCategoryInput::new(name, name.to_lowercase()))
                .await
                .unwrap()
                .id
        }

        async fn tag(&self, name: &str) -> i64 {
            self.tags
                .create(&CreateTagInput::new(name, name.to_lowercase()))
                .await
                .unwrap()
                .id
        }

        fn input(&self, slug: &str) -> CreatePostInput {
            CreatePostInput::new(format!("Post {slug}"), slug, "Body text", self.author)
        }

        async fn published(&self, slug: &str) -> PostWithRelations {
            self.posts
                .create(&self.input(slug).with_status(PostStatus::Published))
                .await
                .unwrap()
        }

        async fn category_count(&self, id: i64) -> i64 {
            self.categories.find_by_id(id).await.unwrap().unwrap().post_count
        }

        async fn tag_count(&self, id: i64) -> i64 {
            self.tags.find_by_id(id).await.unwrap().unwrap().post_count
        }

        /// Every counter equals the direct count of live linked posts
        async fn assert_counters_consistent(&self) {
            for category in self.categories.list().await.unwrap() {
                let direct = self.categories.count_linked_posts(category.id).await.unwrap();
                assert_eq!(category.post_count, direct, "category {}", category.slug);
            }
            for tag in self.tags.list().await.unwrap() {
                let direct = self.tags.count_linked_posts(tag.id).await.unwrap();
                assert_eq!(tag.post_count, direct, "tag {}", tag.slug);
            }
        }

        async fn link_rows(&self, table: &str, post_id: i64) -> i64 {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE post_id = ?");
            sqlx::query_scalar(&sql)
                .bind(post_id)
                .fetch_one(self.sqlite())
                .await
                .unwrap()
        }
    }

    fn term_ids(terms: &Option<Vec<crate::models::TermRef>>) -> Vec<i64> {
        let mut ids: Vec<i64> = terms.iter().flatten().map(|t| t.id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_create_with_relations() {
        let fx = Fixture::new().await;
        let tech = fx.category("Tech").await;
        let ai = fx.category("AI").await;
        let rust = fx.tag("Rust").await;
        let sql = fx.tag("SQL").await;
        let web = fx.tag("Web").await;

        let created = fx
            .posts
            .create(&fx.input("hello").with_categories([tech, ai]).with_tags([rust, sql, web]))
            .await
            .expect("Failed to create post");

        assert_eq!(created.post.status, PostStatus::Draft);
        assert!(created.post.published_at.is_none());
        assert_eq!(created.post.view_count, 0);
        assert_eq!(created.author.as_ref().map(|a| a.id), Some(fx.author));
        assert_eq!(term_ids(&created.categories), {
            let mut v = vec![tech, ai];
            v.sort_unstable();
            v
        });
        assert_eq!(created.tags.as_ref().map(Vec::len), Some(3));
        assert_eq!(created.comment_count, Some(0));

        for id in [tech, ai] {
            assert_eq!(fx.category_count(id).await, 1);
        }
        for id in [rust, sql, web] {
            assert_eq!(fx.tag_count(id).await, 1);
        }
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_create_published_stamps_published_at() {
        let fx = Fixture::new().await;
        let before = Utc::now();
        let post = fx.published("live").await;
        let stamped = post.post.published_at.expect("published_at should be set");
        assert!(stamped >= before);
    }

    #[tokio::test]
    async fn test_create_with_unknown_author_fails() {
        let fx = Fixture::new().await;
        let input = CreatePostInput::new("Orphan", "orphan", "Body", 9999);
        let err = fx.posts.create(&input).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: EntityKind::User, .. }));
    }

    #[tokio::test]
    async fn test_create_with_unknown_tag_rolls_back() {
        let fx = Fixture::new().await;
        let tech = fx.category("Tech").await;

        let err = fx
            .posts
            .create(&fx.input("broken").with_categories([tech]).with_tags([4242]))
            .await
            .unwrap_err();

        match err {
            RepositoryError::NotFound { entity, id } => {
                assert_eq!(entity, EntityKind::Tag);
                assert_eq!(id, "4242");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.category_count(tech).await, 0);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(fx.sqlite())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slug_leaves_counters_alone() {
        let fx = Fixture::new().await;
        let tech = fx.category("Tech").await;
        fx.posts
            .create(&fx.input("same").with_categories([tech]))
            .await
            .unwrap();

        let err = fx
            .posts
            .create(&fx.input("same").with_categories([tech]))
            .await
            .unwrap_err();

        assert!(err.is_conflict(), "unexpected error: {err:?}");
        assert_eq!(fx.category_count(tech).await, 1);
    }

    #[tokio::test]
    async fn test_update_swaps_one_category() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let b = fx.category("Beta").await;
        let c = fx.category("Gamma").await;
        let untouched = fx.category("Delta").await;
        let tags = [fx.tag("One").await, fx.tag("Two").await, fx.tag("Three").await];

        let post = fx
            .posts
            .create(&fx.input("swap").with_categories([a, b]).with_tags(tags))
            .await
            .unwrap();

        let updated = fx
            .posts
            .update(post.post.id, &UpdatePostInput::new().with_categories([a, c]))
            .await
            .unwrap();

        assert_eq!(term_ids(&updated.categories), vec![a, c]);
        assert_eq!(fx.category_count(a).await, 1);
        assert_eq!(fx.category_count(b).await, 0);
        assert_eq!(fx.category_count(c).await, 1);
        assert_eq!(fx.category_count(untouched).await, 0);
        for tag in tags {
            assert_eq!(fx.tag_count(tag).await, 1);
        }
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_update_with_same_set_is_noop() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let b = fx.category("Beta").await;
        let t = fx.tag("Rust").await;
        let post = fx
            .posts
            .create(&fx.input("stable").with_categories([a, b]).with_tags([t]))
            .await
            .unwrap();
        let before = fx.posts.find_by_id(post.post.id).await.unwrap().unwrap();

        // Same sets, reordered and with duplicates
        fx.posts
            .update(post.post.id, &UpdatePostInput::new().with_categories([b, a, b]).with_tags([t]))
            .await
            .unwrap();
        // Nothing requested at all
        fx.posts
            .update(post.post.id, &UpdatePostInput::new())
            .await
            .unwrap();

        let after = fx.posts.find_by_id(post.post.id).await.unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(fx.category_count(a).await, 1);
        assert_eq!(fx.category_count(b).await, 1);
        assert_eq!(fx.tag_count(t).await, 1);
        assert_eq!(fx.link_rows("post_categories", post.post.id).await, 2);
        assert_eq!(fx.link_rows("post_tags", post.post.id).await, 1);
    }

    #[tokio::test]
    async fn test_update_empty_set_clears_links() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let t = fx.tag("Rust").await;
        let post = fx
            .posts
            .create(&fx.input("clear").with_categories([a]).with_tags([t]))
            .await
            .unwrap();

        let updated = fx
            .posts
            .update(post.post.id, &UpdatePostInput::new().with_tags(Vec::<i64>::new()))
            .await
            .unwrap();

        assert_eq!(updated.tags, Some(vec![]));
        assert_eq!(term_ids(&updated.categories), vec![a]);
        assert_eq!(fx.tag_count(t).await, 0);
        assert_eq!(fx.category_count(a).await, 1);
    }

    #[tokio::test]
    async fn test_update_with_unknown_category_rolls_back() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let b = fx.category("Beta").await;
        let post = fx
            .posts
            .create(&fx.input("atomic").with_categories([a]))
            .await
            .unwrap();

        let err = fx
            .posts
            .update(
                post.post.id,
                &UpdatePostInput::new()
                    .with_title("Renamed")
                    .with_categories([b, 9999]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::NotFound { entity: EntityKind::Category, .. }));
        let reloaded = fx
            .posts
            .find_with_relations(post.post.id, PostInclude::all())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.post.title, "Post atomic");
        assert_eq!(term_ids(&reloaded.categories), vec![a]);
        assert_eq!(fx.category_count(a).await, 1);
        assert_eq!(fx.category_count(b).await, 0);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_update_to_published_stamps_once() {
        let fx = Fixture::new().await;
        let post = fx.posts.create(&fx.input("draft")).await.unwrap();
        assert!(post.post.published_at.is_none());

        let published = fx
            .posts
            .update(post.post.id, &UpdatePostInput::new().with_status(PostStatus::Published))
            .await
            .unwrap();
        let first = published.post.published_at.expect("stamped on publish");

        let retitled = fx
            .posts
            .update(
                post.post.id,
                &UpdatePostInput::new()
                    .with_title("Still published")
                    .with_status(PostStatus::Published),
            )
            .await
            .unwrap();
        assert_eq!(retitled.post.published_at, Some(first));
    }

    #[tokio::test]
    async fn test_update_status() {
        let fx = Fixture::new().await;
        let post = fx.posts.create(&fx.input("status")).await.unwrap();

        let published = fx
            .posts
            .update_status(post.post.id, PostStatus::Published)
            .await
            .unwrap();
        let stamped = published.published_at.expect("stamped on publish");

        let archived = fx
            .posts
            .update_status(post.post.id, PostStatus::Archived)
            .await
            .unwrap();
        assert_eq!(archived.status, PostStatus::Archived);
        assert_eq!(archived.published_at, Some(stamped));

        let republished = fx
            .posts
            .update_status(post.post.id, PostStatus::Published)
            .await
            .unwrap();
        assert!(republished.published_at.unwrap() >= stamped);

        let err = fx.posts.update_status(9999, PostStatus::Draft).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let b = fx.category("Beta").await;
        let t = fx.tag("Rust").await;
        let post = fx
            .posts
            .create(&fx.input("gone").with_categories([a, b]).with_tags([t]))
            .await
            .unwrap();
        let id = post.post.id;

        fx.posts.soft_delete(id).await.unwrap();

        assert_eq!(fx.category_count(a).await, 0);
        assert_eq!(fx.category_count(b).await, 0);
        assert_eq!(fx.tag_count(t).await, 0);
        assert!(fx.posts.find_by_id(id).await.unwrap().is_none());
        let row = fx.posts.find_including_deleted(id).await.unwrap().unwrap();
        assert!(row.deleted_at.is_some());
        assert_eq!(fx.link_rows("post_categories", id).await, 2);

        let listed = fx
            .posts
            .list(&PostQuery::default(), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        assert!(listed.data.iter().all(|p| p.post.id != id));

        assert!(fx.posts.soft_delete(id).await.unwrap_err().is_not_found());
        assert!(fx
            .posts
            .update(id, &UpdatePostInput::new().with_title("Back"))
            .await
            .unwrap_err()
            .is_not_found());
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_hard_delete_removes_comments_and_links() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let t = fx.tag("Rust").await;
        let post = fx
            .posts
            .create(&fx.input("purge").with_categories([a]).with_tags([t]))
            .await
            .unwrap();
        let id = post.post.id;
        insert_comment(fx.sqlite(), id, Some(fx.author)).await;
        insert_comment(fx.sqlite(), id, None).await;

        fx.posts.hard_delete(id).await.unwrap();

        assert!(fx.posts.find_including_deleted(id).await.unwrap().is_none());
        assert_eq!(fx.category_count(a).await, 0);
        assert_eq!(fx.tag_count(t).await, 0);
        assert_eq!(fx.link_rows("post_categories", id).await, 0);
        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(id)
            .fetch_one(fx.sqlite())
            .await
            .unwrap();
        assert_eq!(comments, 0);
        assert!(fx.posts.hard_delete(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_hard_delete_after_soft_delete_does_not_double_count() {
        let fx = Fixture::new().await;
        let a = fx.category("Alpha").await;
        let first = fx
            .posts
            .create(&fx.input("first").with_categories([a]))
            .await
            .unwrap();
        fx.posts
            .create(&fx.input("second").with_categories([a]))
            .await
            .unwrap();

        fx.posts.soft_delete(first.post.id).await.unwrap();
        fx.posts.hard_delete(first.post.id).await.unwrap();

        assert_eq!(fx.category_count(a).await, 1);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_increment_view_count() {
        let fx = Fixture::new().await;
        let post = fx.published("viewed").await;

        fx.posts.increment_view_count(post.post.id, 1).await.unwrap();
        fx.posts.increment_view_count(post.post.id, 5).await.unwrap();
        fx.posts.increment_view_count(post.post.id, 0).await.unwrap();

        let reloaded = fx.posts.find_by_id(post.post.id).await.unwrap().unwrap();
        assert_eq!(reloaded.view_count, 6);
        assert!(fx.posts.increment_view_count(9999, 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_pagination_over_published_posts() {
        let fx = Fixture::new().await;
        for i in 0..25 {
            fx.published(&format!("post-{i:02}")).await;
        }

        let first = fx
            .posts
            .list(&PostQuery::published(), &ListParams::new(1, 10), PostInclude::default())
            .await
            .unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first.meta.total, 25);
        assert_eq!(first.meta.total_pages, 3);
        assert!(first.has_next());

        let last = fx
            .posts
            .list(&PostQuery::published(), &ListParams::new(3, 10), PostInclude::default())
            .await
            .unwrap();
        assert_eq!(last.len(), 5);
        assert!(!last.has_next());
        assert!(last.data.iter().all(|p| p.author.is_none() && p.categories.is_none()));
    }

    #[tokio::test]
    async fn test_category_filter_scenario() {
        let fx = Fixture::new().await;
        let tech = fx.category("Tech").await;
        let ai = fx.category("AI").await;
        let biz = fx.category("Biz").await;

        let p1 = fx
            .posts
            .create(&fx.input("p1").with_status(PostStatus::Published).with_categories([tech, ai]))
            .await
            .unwrap();
        let p2 = fx
            .posts
            .create(&fx.input("p2").with_status(PostStatus::Published).with_categories([tech]))
            .await
            .unwrap();
        let p3 = fx
            .posts
            .create(&fx.input("p3").with_status(PostStatus::Published).with_categories([biz]))
            .await
            .unwrap();

        let in_tech = fx
            .posts
            .list(&PostQuery::published().with_category("tech"), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        let mut found: Vec<i64> = in_tech.data.iter().map(|p| p.post.id).collect();
        found.sort_unstable();
        assert_eq!(found, vec![p1.post.id, p2.post.id]);

        assert_eq!(fx.category_count(tech).await, 2);
        assert_eq!(fx.category_count(ai).await, 1);
        assert_eq!(fx.category_count(biz).await, 1);

        fx.posts.soft_delete(p2.post.id).await.unwrap();
        assert_eq!(fx.category_count(tech).await, 1);

        let related = fx
            .posts
            .related_posts(p3.post.id, &[tech, biz], DEFAULT_RELATED_LIMIT)
            .await
            .unwrap();
        let related: Vec<i64> = related.iter().map(|p| p.post.id).collect();
        assert_eq!(related, vec![p1.post.id]);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = Fixture::new().await;
        let rust = fx.tag("Rust").await;
        let other = insert_user(fx.sqlite(), "other@example.com").await;

        fx.posts
            .create(
                &fx.input("borrowing")
                    .with_excerpt("All about the Borrow Checker")
                    .with_status(PostStatus::Published)
                    .with_featured(true)
                    .with_tags([rust]),
            )
            .await
            .unwrap();
        fx.published("plain").await;
        fx.posts.create(&fx.input("draft-only")).await.unwrap();
        fx.posts
            .create(
                &CreatePostInput::new("Guest post", "guest", "Body", other)
                    .with_status(PostStatus::Published),
            )
            .await
            .unwrap();

        let list = |query: PostQuery| {
            let posts = &fx.posts;
            async move {
                posts
                    .list(&query, &ListParams::default(), PostInclude::default())
                    .await
                    .unwrap()
                    .data
                    .into_iter()
                    .map(|p| p.post.slug)
                    .collect::<Vec<_>>()
            }
        };

        assert_eq!(list(PostQuery::published().with_search("borrow checker")).await, vec!["borrowing"]);
        assert_eq!(list(PostQuery::published().with_search("  ")).await.len(), 3);
        assert_eq!(list(PostQuery::published().with_tag("rust")).await, vec!["borrowing"]);
        assert_eq!(list(PostQuery::published().with_featured(true)).await, vec!["borrowing"]);
        assert_eq!(list(PostQuery::published().with_author(other)).await, vec!["guest"]);
        assert_eq!(list(PostQuery::default().with_status(PostStatus::Draft)).await, vec!["draft-only"]);
        assert_eq!(list(PostQuery::default()).await.len(), 4);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let fx = Fixture::new().await;
        fx.posts
            .create(&fx.input("percent").with_excerpt("100% safe").with_status(PostStatus::Published))
            .await
            .unwrap();
        fx.published("plain").await;

        let found = fx
            .posts
            .list(&PostQuery::published().with_search("100%"), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let none = fx
            .posts
            .list(&PostQuery::published().with_search("_"), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_non_ascii_titles() {
        let fx = Fixture::new().await;
        fx.posts
            .create(
                &CreatePostInput::new("Café Éclair", "eclair", "Body text", fx.author)
                    .with_status(PostStatus::Published),
            )
            .await
            .unwrap();
        fx.published("plain").await;

        for needle in ["Éclair", "Café", "café", "CAFÉ", "ÉCLAIR"] {
            let found = fx
                .posts
                .list(&PostQuery::published().with_search(needle), &ListParams::default(), PostInclude::default())
                .await
                .unwrap();
            assert_eq!(found.len(), 1, "search for {needle:?}");
            assert_eq!(found.data[0].post.slug, "eclair");
        }
    }

    #[tokio::test]
    async fn test_scheduled_posts_are_hidden() {
        let fx = Fixture::new().await;
        let post = fx.published("future").await;
        sqlx::query("UPDATE posts SET published_at = ? WHERE id = ?")
            .bind(Utc::now() + chrono::Duration::days(1))
            .bind(post.post.id)
            .execute(fx.sqlite())
            .await
            .unwrap();

        let listed = fx
            .posts
            .list(&PostQuery::published(), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert!(fx.posts.find_published_by_slug("future").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ordering_ties_broken_by_id() {
        let fx = Fixture::new().await;
        let a = fx.published("a").await.post.id;
        let b = fx.published("b").await.post.id;
        let c = fx.published("c").await.post.id;
        let same = Utc::now() - chrono::Duration::hours(1);
        let earlier = same - chrono::Duration::hours(1);
        for (id, at) in [(a, earlier), (b, same), (c, same)] {
            sqlx::query("UPDATE posts SET published_at = ? WHERE id = ?")
                .bind(at)
                .bind(id)
                .execute(fx.sqlite())
                .await
                .unwrap();
        }

        let listed = fx
            .posts
            .list(&PostQuery::published(), &ListParams::default(), PostInclude::default())
            .await
            .unwrap();
        let order: Vec<i64> = listed.data.iter().map(|p| p.post.id).collect();
        assert_eq!(order, vec![b, c, a]);
    }

    #[tokio::test]
    async fn test_find_published_by_slug() {
        let fx = Fixture::new().await;
        let tech = fx.category("Tech").await;
        fx.posts.create(&fx.input("hidden")).await.unwrap();
        let live = fx
            .posts
            .create(&fx.input("visible").with_status(PostStatus::Published).with_categories([tech]))
            .await
            .unwrap();
        insert_comment(fx.sqlite(), live.post.id, None).await;

        assert!(fx.posts.find_published_by_slug("hidden").await.unwrap().is_none());
        let found = fx.posts.find_published_by_slug("visible").await.unwrap().unwrap();
        assert_eq!(found.post.id, live.post.id);
        assert_eq!(found.category_ids(), vec![tech]);
        assert_eq!(found.comment_count, Some(1));
        assert_eq!(found.author.unwrap().email, "author@example.com");
    }

    #[tokio::test]
    async fn test_find_with_relations_respects_include() {
        let fx = Fixture::new().await;
        let t = fx.tag("Rust").await;
        let post = fx.posts.create(&fx.input("partial").with_tags([t])).await.unwrap();

        let include = PostInclude {
            tags: true,
            ..PostInclude::default()
        };
        let found = fx
            .posts
            .find_with_relations(post.post.id, include)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tag_ids(), vec![t]);
        assert!(found.author.is_none());
        assert!(found.categories.is_none());
        assert!(found.comment_count.is_none());
        assert!(fx
            .posts
            .find_with_relations(9999, include)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_counters_stay_consistent_through_mixed_writes() {
        let fx = Fixture::new().await;
        let cats = [fx.category("A").await, fx.category("B").await, fx.category("C").await];
        let tags = [fx.tag("X").await, fx.tag("Y").await];

        let mut ids = Vec::new();
        for (i, slug) in ["m1", "m2", "m3", "m4"].into_iter().enumerate() {
            let post = fx
                .posts
                .create(
                    &fx.input(slug)
                        .with_categories(cats.iter().copied().take(i % 3 + 1))
                        .with_tags(tags.iter().copied().skip(i % 2)),
                )
                .await
                .unwrap();
            ids.push(post.post.id);
        }
        fx.posts
            .update(ids[0], &UpdatePostInput::new().with_categories([cats[2]]).with_tags(Vec::<i64>::new()))
            .await
            .unwrap();
        fx.posts.soft_delete(ids[1]).await.unwrap();
        fx.posts.hard_delete(ids[2]).await.unwrap();
        fx.posts
            .update(ids[3], &UpdatePostInput::new().with_tags(tags))
            .await
            .unwrap();

        fx.assert_counters_consistent().await;
    }
}
