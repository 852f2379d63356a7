//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::base::{decode_enum, Entity, EntityStore};
use crate::db::error::{EntityKind, RepoResult, RepositoryError};
use crate::db::filter::{bind_mysql, bind_sqlite, SqlValue, WhereClause};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{
    CreateUserInput, ListParams, Paginated, UpdateProfileInput, User, UserQuery, UserRole,
};

/// Reset tokens expire after this long unless the caller picks another window
pub const DEFAULT_RESET_TOKEN_TTL_HOURS: i64 = 24;

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
    const TABLE: &'static str = "users";
    const ALIAS: &'static str = "u";
    const COLUMNS: &'static str = "u.id, u.email, u.name, u.image, u.password_hash, u.role, u.is_active, \
        u.last_login_at, u.reset_token, u.reset_token_expiry, u.deactivated_at, u.created_at, \
        u.updated_at, u.deleted_at";
    const SOFT_DELETE: bool = true;

    fn from_sqlite_row(row: &SqliteRow) -> RepoResult<Self> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            password_hash: row.try_get("password_hash")?,
            role: decode_enum(&role)?,
            is_active: row.try_get("is_active")?,
            last_login_at: row.try_get("last_login_at")?,
            reset_token: row.try_get("reset_token")?,
            reset_token_expiry: row.try_get("reset_token_expiry")?,
            deactivated_at: row.try_get("deactivated_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn from_mysql_row(row: &MySqlRow) -> RepoResult<Self> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            password_hash: row.try_get("password_hash")?,
            role: decode_enum(&role)?,
            is_active: row.try_get("is_active")?,
            last_login_at: row.try_get("last_login_at")?,
            reset_token: row.try_get("reset_token")?,
            reset_token_expiry: row.try_get("reset_token_expiry")?,
            deactivated_at: row.try_get("deactivated_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user; emails are stored lowercased
    async fn create(&self, input: &CreateUserInput) -> RepoResult<User>;

    /// Get user by ID
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>>;

    /// Get user by email, ignoring case
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Update name and/or avatar
    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> RepoResult<User>;

    async fn update_password(&self, id: i64, password_hash: &str) -> RepoResult<()>;

    /// Stamp `last_login_at`
    async fn record_login(&self, id: i64) -> RepoResult<()>;

    /// Store a reset token; returns its expiry
    async fn set_reset_token(
        &self,
        id: i64,
        token: &str,
        ttl: Option<Duration>,
    ) -> RepoResult<DateTime<Utc>>;

    /// User holding `token`, provided it has not expired
    async fn find_by_reset_token(&self, token: &str) -> RepoResult<Option<User>>;

    async fn clear_reset_token(&self, id: i64) -> RepoResult<()>;

    async fn change_role(&self, id: i64, role: UserRole) -> RepoResult<User>;

    async fn deactivate(&self, id: i64) -> RepoResult<()>;

    async fn activate(&self, id: i64) -> RepoResult<()>;

    async fn count_active_by_role(&self, role: UserRole) -> RepoResult<i64>;

    /// Filtered, paginated listing, newest first
    async fn search(&self, query: &UserQuery, params: &ListParams) -> RepoResult<Paginated<User>>;

    async fn soft_delete(&self, id: i64) -> RepoResult<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    store: EntityStore<User>,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            store: EntityStore::new(pool),
        }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run `UPDATE users SET {sets}, updated_at = ? WHERE id = ?` on a live user
    async fn update_live(&self, id: i64, sets: &str, mut binds: Vec<SqlValue>) -> RepoResult<()> {
        let sql = format!(
            "UPDATE users SET {}, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            sets
        );
        binds.push(SqlValue::Timestamp(Utc::now()));
        binds.push(SqlValue::Int(id));

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
            return Err(RepositoryError::not_found(EntityKind::User, id));
        }
        Ok(())
    }

    async fn reload(&self, id: i64) -> RepoResult<User> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(EntityKind::User, id))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> RepoResult<User> {
        let id = match self.store.pool().backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_user_mysql(pool, input).await?,
        };
        tracing::info!(id, "Created user");
        self.reload(id).await
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        self.store.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let mut filter = EntityStore::<User>::live_scope();
        filter.push("u.email = ?", [SqlValue::from(normalize_email(email))]);
        self.store.find_one(&filter).await
    }

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> RepoResult<User> {
        if !input.has_changes() {
            return self.reload(id).await;
        }
        let mut sets = Vec::new();
        let mut binds = Vec::new();
        if let Some(name) = &input.name {
            sets.push("name = ?");
            binds.push(SqlValue::from(name.as_str()));
        }
        if let Some(image) = &input.image {
            sets.push("image = ?");
            binds.push(SqlValue::from(image.as_str()));
        }
        self.update_live(id, &sets.join(", "), binds).await?;
        self.reload(id).await
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> RepoResult<()> {
        self.update_live(id, "password_hash = ?", vec![SqlValue::from(password_hash)])
            .await?;
        tracing::info!(id, "Updated user password");
        Ok(())
    }

    async fn record_login(&self, id: i64) -> RepoResult<()> {
        self.update_live(id, "last_login_at = ?", vec![SqlValue::Timestamp(Utc::now())])
            .await
    }

    async fn set_reset_token(
        &self,
        id: i64,
        token: &str,
        ttl: Option<Duration>,
    ) -> RepoResult<DateTime<Utc>> {
        let expiry = Utc::now() + ttl.unwrap_or_else(|| Duration::hours(DEFAULT_RESET_TOKEN_TTL_HOURS));
        self.update_live(
            id,
            "reset_token = ?, reset_token_expiry = ?",
            vec![SqlValue::from(token), SqlValue::Timestamp(expiry)],
        )
        .await?;
        Ok(expiry)
    }

    async fn find_by_reset_token(&self, token: &str) -> RepoResult<Option<User>> {
        let mut filter = EntityStore::<User>::live_scope();
        filter.push("u.reset_token = ?", [SqlValue::from(token)]);
        filter.push("u.reset_token_expiry > ?", [SqlValue::Timestamp(Utc::now())]);
        self.store.find_one(&filter).await
    }

    async fn clear_reset_token(&self, id: i64) -> RepoResult<()> {
        self.update_live(id, "reset_token = NULL, reset_token_expiry = NULL", Vec::new())
            .await
    }

    async fn change_role(&self, id: i64, role: UserRole) -> RepoResult<User> {
        self.update_live(id, "role = ?", vec![SqlValue::from(role.as_str())])
            .await?;
        tracing::info!(id, role = %role, "Changed user role");
        self.reload(id).await
    }

    async fn deactivate(&self, id: i64) -> RepoResult<()> {
        self.update_live(
            id,
            "is_active = ?, deactivated_at = ?",
            vec![SqlValue::Bool(false), SqlValue::Timestamp(Utc::now())],
        )
        .await?;
        tracing::info!(id, "Deactivated user");
        Ok(())
    }

    async fn activate(&self, id: i64) -> RepoResult<()> {
        self.update_live(id, "is_active = ?, deactivated_at = NULL", vec![SqlValue::Bool(true)])
            .await
    }

    async fn count_active_by_role(&self, role: UserRole) -> RepoResult<i64> {
        let mut filter = EntityStore::<User>::live_scope();
        filter.push("u.is_active = ?", [SqlValue::Bool(true)]);
        filter.push("u.role = ?", [SqlValue::from(role.as_str())]);
        self.store.count(&filter).await
    }

    async fn search(&self, query: &UserQuery, params: &ListParams) -> RepoResult<Paginated<User>> {
        let filter = user_filter(query);
        self.store
            .paginate(&filter, "u.created_at DESC, u.id DESC", params)
            .await
    }

    async fn soft_delete(&self, id: i64) -> RepoResult<()> {
        self.store.soft_delete(id).await?;
        tracing::info!(id, "Soft deleted user");
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_filter(query: &UserQuery) -> WhereClause {
    let mut filter = EntityStore::<User>::live_scope();
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.push_search(&["u.name", "u.email"], search);
    }
    if let Some(role) = query.role {
        filter.push("u.role = ?", [SqlValue::from(role.as_str())]);
    }
    if let Some(active) = query.is_active {
        filter.push("u.is_active = ?", [SqlValue::Bool(active)]);
    }
    filter
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> RepoResult<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, name, password_hash, role, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(normalize_email(&input.email))
    .bind(&input.name)
    .bind(&input.password_hash)
    .bind(input.role.unwrap_or_default().as_str())
    .bind(true)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> RepoResult<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, name, password_hash, role, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(normalize_email(&input.email))
    .bind(&input.name)
    .bind(&input.password_hash)
    .bind(input.role.unwrap_or_default().as_str())
    .bind(true)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_id() as i64)
}
