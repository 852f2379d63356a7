//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity; the
//! [`Repositories`] registry bundles them for the rest of the application.

pub mod base;
pub mod category;
pub mod post;
pub mod registry;
pub mod tag;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use base::{Entity, EntityStore};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use post::{PostRepository, SqlxPostRepository, DEFAULT_RELATED_LIMIT};
pub use registry::{Repositories, RepositoryRef};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository, DEFAULT_RESET_TOKEN_TTL_HOURS};
