//! Repository error type
//!
//! Every repository operation returns [`RepoResult`]. Driver errors that carry
//! a database error code are normalized into [`RepositoryError::Database`] with
//! the code, the constraint class and the constraint name preserved; anything
//! else from sqlx is passed through unchanged.

use serde::Serialize;
use std::fmt;

/// Entities addressable through the repository layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Post,
    Category,
    Tag,
    ActivityLog,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Post => "Post",
            EntityKind::Category => "Category",
            EntityKind::Tag => "Tag",
            EntityKind::ActivityLog => "ActivityLog",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a database-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

impl From<sqlx::error::ErrorKind> for ConstraintKind {
    fn from(kind: sqlx::error::ErrorKind) -> Self {
        use sqlx::error::ErrorKind;
        match kind {
            ErrorKind::UniqueViolation => ConstraintKind::Unique,
            ErrorKind::ForeignKeyViolation => ConstraintKind::ForeignKey,
            ErrorKind::NotNullViolation => ConstraintKind::NotNull,
            ErrorKind::CheckViolation => ConstraintKind::Check,
            _ => ConstraintKind::Other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A referenced row does not exist; the operation was aborted
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// The database rejected the statement
    #[error("database error [{code}]: {message}")]
    Database {
        code: String,
        kind: ConstraintKind,
        message: String,
        constraint: Option<String>,
    },

    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// A stored value could not be mapped back into a model
    #[error("failed to decode stored value: {0}")]
    Decode(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

impl RepositoryError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    /// Unique or foreign-key violation
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::Database {
                kind: ConstraintKind::Unique | ConstraintKind::ForeignKey,
                ..
            }
        )
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => RepositoryError::Database {
                code: db.code().map(|c| c.into_owned()).unwrap_or_default(),
                kind: db.kind().into(),
                message: db.message().to_string(),
                constraint: db.constraint().map(str::to_string),
            },
            other => RepositoryError::Sqlx(other),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Decode(err.to_string())
    }
}
