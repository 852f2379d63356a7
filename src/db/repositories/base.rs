//! Generic single-table operations
//!
//! [`EntityStore`] runs the queries every entity repository needs (lookup by
//! id, counting, paging, existence, hard and soft delete) against the table
//! described by an [`Entity`] impl. Entity repositories compose a store and
//! add their own querying on top.

use std::marker::PhantomData;

use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};

use crate::db::error::{EntityKind, RepoResult, RepositoryError};
use crate::db::filter::{bind_mysql, bind_sqlite, SqlValue, WhereClause};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, Paginated};

/// Static description of an entity table
pub trait Entity: Sized + Send + Sync + Unpin + 'static {
    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Table alias used in every generated query
    const ALIAS: &'static str;
    /// Alias-qualified select list, in the order the row mappers expect
    const COLUMNS: &'static str;
    /// Whether the table has a `deleted_at` column
    const SOFT_DELETE: bool;

    fn from_sqlite_row(row: &SqliteRow) -> RepoResult<Self>;
    fn from_mysql_row(row: &MySqlRow) -> RepoResult<Self>;
}

/// Map a stored enum string through `FromStr`
pub(crate) fn decode_enum<T>(value: &str) -> RepoResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub struct EntityStore<E> {
    pool: DynDatabasePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &DynDatabasePool {
        &self.pool
    }

    /// `SELECT <columns> FROM <table> <alias>`
    pub fn select_sql() -> String {
        format!("SELECT {} FROM {} {}", E::COLUMNS, E::TABLE, E::ALIAS)
    }

    /// Alias-qualified column name
    pub fn column(name: &str) -> String {
        format!("{}.{}", E::ALIAS, name)
    }

    /// Filter that hides soft-deleted rows (empty for tables without soft delete)
    pub fn live_scope() -> WhereClause {
        let mut scope = WhereClause::new();
        if E::SOFT_DELETE {
            scope.push_raw(format!("{} IS NULL", Self::column("deleted_at")));
        }
        scope
    }

    /// Find a live row by id
    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<E>> {
        let mut filter = Self::live_scope();
        filter.push(format!("{} = ?", Self::column("id")), [SqlValue::Int(id)]);
        self.find_one(&filter).await
    }

    /// Find a row by id, soft-deleted or not
    pub async fn find_by_id_including_deleted(&self, id: i64) -> RepoResult<Option<E>> {
        let mut filter = WhereClause::new();
        filter.push(format!("{} = ?", Self::column("id")), [SqlValue::Int(id)]);
        self.find_one(&filter).await
    }

    /// First row matching `filter`
    pub async fn find_one(&self, filter: &WhereClause) -> RepoResult<Option<E>> {
        let sql = format!("{}{} LIMIT 1", Self::select_sql(), filter.sql());
        match self.pool.backend() {
            Backend::Sqlite(pool) => find_one_sqlite(pool, &sql, filter.params()).await,
            Backend::Mysql(pool) => find_one_mysql(pool, &sql, filter.params()).await,
        }
    }

    /// Count rows matching `filter`
    pub async fn count(&self, filter: &WhereClause) -> RepoResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} {}{}",
            E::TABLE,
            E::ALIAS,
            filter.sql()
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_sqlite(pool, &sql, filter.params()).await,
            Backend::Mysql(pool) => count_mysql(pool, &sql, filter.params()).await,
        }
    }

    /// One page of rows matching `filter`
    pub async fn find_page(
        &self,
        filter: &WhereClause,
        order_by: &str,
        params: &ListParams,
    ) -> RepoResult<Vec<E>> {
        let sql = format!(
            "{}{} ORDER BY {} LIMIT ? OFFSET ?",
            Self::select_sql(),
            filter.sql(),
            order_by
        );
        let mut binds = filter.params().to_vec();
        binds.push(SqlValue::Int(params.limit()));
        binds.push(SqlValue::Int(params.offset()));

        match self.pool.backend() {
            Backend::Sqlite(pool) => find_all_sqlite(pool, &sql, &binds).await,
            Backend::Mysql(pool) => find_all_mysql(pool, &sql, &binds).await,
        }
    }

    /// Page plus total, fetched concurrently
    pub async fn paginate(
        &self,
        filter: &WhereClause,
        order_by: &str,
        params: &ListParams,
    ) -> RepoResult<Paginated<E>> {
        let (total, data) = futures::try_join!(
            self.count(filter),
            self.find_page(filter, order_by, params)
        )?;
        Ok(Paginated::new(data, total, params))
    }

    /// Whether a live row with `id` exists
    pub async fn exists(&self, id: i64) -> RepoResult<bool> {
        let mut filter = Self::live_scope();
        filter.push(format!("{} = ?", Self::column("id")), [SqlValue::Int(id)]);
        Ok(self.count(&filter).await? > 0)
    }

    /// Remove the row; `NotFound` when nothing matched
    pub async fn hard_delete(&self, id: i64) -> RepoResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql).bind(id).execute(pool).await?.rows_affected(),
            Backend::Mysql(pool) => sqlx::query(&sql).bind(id).execute(pool).await?.rows_affected(),
        };
        if affected == 0 {
            return Err(RepositoryError::not_found(E::KIND, id));
        }
        tracing::debug!(entity = %E::KIND, id, "Hard deleted");
        Ok(())
    }

    /// Stamp `deleted_at`; `NotFound` when the row is missing or already deleted
    ///
    /// Tables without a `deleted_at` column fall back to a hard delete.
    pub async fn soft_delete(&self, id: i64) -> RepoResult<()> {
        if !E::SOFT_DELETE {
            return self.hard_delete(id).await;
        }
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            E::TABLE
        );
        let now = chrono::Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        if affected == 0 {
            return Err(RepositoryError::not_found(E::KIND, id));
        }
        tracing::debug!(entity = %E::KIND, id, "Soft deleted");
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_one_sqlite<E: Entity>(
    pool: &SqlitePool,
    sql: &str,
    params: &[SqlValue],
) -> RepoResult<Option<E>> {
    let row = bind_sqlite(sqlx::query(sql), params)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(E::from_sqlite_row).transpose()
}

async fn find_all_sqlite<E: Entity>(
    pool: &SqlitePool,
    sql: &str,
    params: &[SqlValue],
) -> RepoResult<Vec<E>> {
    let rows = bind_sqlite(sqlx::query(sql), params).fetch_all(pool).await?;
    rows.iter().map(E::from_sqlite_row).collect()
}

async fn count_sqlite(pool: &SqlitePool, sql: &str, params: &[SqlValue]) -> RepoResult<i64> {
    let row = bind_sqlite(sqlx::query(sql), params).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_one_mysql<E: Entity>(
    pool: &MySqlPool,
    sql: &str,
    params: &[SqlValue],
) -> RepoResult<Option<E>> {
    let row = bind_mysql(sqlx::query(sql), params)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(E::from_mysql_row).transpose()
}

async fn find_all_mysql<E: Entity>(
    pool: &MySqlPool,
    sql: &str,
    params: &[SqlValue],
) -> RepoResult<Vec<E>> {
    let rows = bind_mysql(sqlx::query(sql), params).fetch_all(pool).await?;
    rows.iter().map(E::from_mysql_row).collect()
}

async fn count_mysql(pool: &MySqlPool, sql: &str, params: &[SqlValue]) -> RepoResult<i64> {
    let row = bind_mysql(sqlx::query(sql), params).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}
