//! Repository registry
//!
//! One container holding every repository, built once at startup from the
//! storage clients and cloned into request state.

use std::sync::Arc;

use super::category::{CategoryRepository, SqlxCategoryRepository};
use super::post::{PostRepository, SqlxPostRepository};
use super::tag::{SqlxTagRepository, TagRepository};
use super::user::{SqlxUserRepository, UserRepository};
use crate::db::EntityKind;
use crate::docstore::{ActivityLogRepository, SqlxActivityLogRepository};
use crate::storage::StorageClients;

/// Every repository, keyed by entity
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub activity: Arc<dyn ActivityLogRepository>,
}

/// Borrowed handle to one repository, as returned by [`Repositories::get`]
#[derive(Clone, Copy)]
pub enum RepositoryRef<'a> {
    User(&'a dyn UserRepository),
    Post(&'a dyn PostRepository),
    Category(&'a dyn CategoryRepository),
    Tag(&'a dyn TagRepository),
    ActivityLog(&'a dyn ActivityLogRepository),
}

impl RepositoryRef<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            RepositoryRef::User(_) => EntityKind::User,
            RepositoryRef::Post(_) => EntityKind::Post,
            RepositoryRef::Category(_) => EntityKind::Category,
            RepositoryRef::Tag(_) => EntityKind::Tag,
            RepositoryRef::ActivityLog(_) => EntityKind::ActivityLog,
        }
    }
}

impl Repositories {
    /// Wire the SQLx repositories onto the given pools
    pub fn new(storage: &StorageClients) -> Self {
        let pool = &storage.relational;
        Self {
            users: SqlxUserRepository::boxed(pool.clone()),
            posts: SqlxPostRepository::boxed(pool.clone()),
            categories: SqlxCategoryRepository::boxed(pool.clone()),
            tags: SqlxTagRepository::boxed(pool.clone()),
            activity: SqlxActivityLogRepository::boxed(
                storage.documents.clone(),
                storage.activity_ttl_days,
            ),
        }
    }

    /// Look a repository up by the entity it serves
    pub fn get(&self, kind: EntityKind) -> RepositoryRef<'_> {
        match kind {
            EntityKind::User => RepositoryRef::User(self.users.as_ref()),
            EntityKind::Post => RepositoryRef::Post(self.posts.as_ref()),
            EntityKind::Category => RepositoryRef::Category(self.categories.as_ref()),
            EntityKind::Tag => RepositoryRef::Tag(self.tags.as_ref()),
            EntityKind::ActivityLog => RepositoryRef::ActivityLog(self.activity.as_ref()),
        }
    }
}
