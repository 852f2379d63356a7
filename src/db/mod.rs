//! Database layer
//!
//! This module provides the relational storage for Quill.
//! It supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The database driver is selected based on configuration.
//!
//! # Architecture
//!
//! The database layer uses a trait-based abstraction (`DatabasePool`) that
//! allows the application to work with either SQLite or MySQL without
//! knowing the specific backend. Repositories match on [`Backend`] and keep
//! one function per driver.
//!
//! # Usage
//!
//! ```ignore
//! use quill::config::DatabaseConfig;
//! use quill::db::{create_pool, migrations, Backend};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//!
//! match pool.backend() {
//!     Backend::Sqlite(sqlite) => { /* SQLite-specific operations */ }
//!     Backend::Mysql(mysql) => { /* MySQL-specific operations */ }
//! }
//! ```

pub mod error;
pub mod filter;
pub mod migrations;
pub mod pool;
pub mod relations;
pub mod repositories;

pub use error::{ConstraintKind, EntityKind, RepoResult, RepositoryError};
pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
