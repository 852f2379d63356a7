//! Data models
//!
//! Entities stored by the repository layer plus the closed query and
//! pagination structs their listings accept.

mod activity;
mod category;
mod pagination;
mod post;
mod tag;
mod user;

pub use activity::{
    ActivityLog, ActivityPage, ActivityPagination, ActivityQuery, LogActivityInput, SortOrder,
    DEFAULT_ACTIVITY_TAKE,
};
pub use category::{Category, CreateCategoryInput};
pub use pagination::{ListParams, PageMeta, Paginated, MAX_PAGE_SIZE};
pub use post::{
    AuthorSummary, CreatePostInput, Post, PostInclude, PostQuery, PostSort, PostStatus,
    PostWithRelations, TermRef, UpdatePostInput,
};
pub use tag::{CreateTagInput, Tag};
pub use user::{CreateUserInput, UpdateProfileInput, User, UserQuery, UserRole};
