//! Post model
//!
//! This module provides:
//! - `Post` entity and its `PostStatus`
//! - `PostWithRelations`, the shape returned by detail and listing operations
//! - Input types for creating and updating posts
//! - `PostQuery` / `PostInclude` / `PostSort` for filtered listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Post title
    pub title: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Short summary
    pub excerpt: Option<String>,
    /// Body
    pub content: String,
    /// Publication status
    pub status: PostStatus,
    /// Shown in featured listings
    pub featured: bool,
    /// Stamped when the post becomes Published
    pub published_at: Option<DateTime<Utc>>,
    /// Number of views, never negative
    pub view_count: i64,
    /// Author user ID
    pub author_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether anonymous readers may see this post at `now`
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Published
            && !self.is_deleted()
            && self.published_at.is_some_and(|at| at <= now)
    }
}

/// Post publication status
///
/// Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Draft - not visible to public
    #[default]
    Draft,
    /// Published - visible once `published_at` has passed
    Published,
    /// Archived - hidden but not deleted
    Archived,
}

impl PostStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid post status: {}", s)),
        }
    }
}

/// Author as embedded in a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

/// Category or tag as embedded in a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Post with the relations selected by a [`PostInclude`]
///
/// Relations that were not requested are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<TermRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TermRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<i64>,
}

impl PostWithRelations {
    /// Wrap a bare post with no relations resolved
    pub fn bare(post: Post) -> Self {
        Self {
            post,
            author: None,
            categories: None,
            tags: None,
            comment_count: None,
        }
    }

    pub fn category_ids(&self) -> Vec<i64> {
        self.categories
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.id)
            .collect()
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|t| t.id)
            .collect()
    }
}

/// Which relations to resolve alongside a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInclude {
    pub author: bool,
    pub categories: bool,
    pub tags: bool,
    pub comment_count: bool,
}

impl PostInclude {
    /// Resolve everything
    pub fn all() -> Self {
        Self {
            author: true,
            categories: true,
            tags: true,
            comment_count: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.author || self.categories || self.tags || self.comment_count)
    }
}

/// Input for creating a new post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    /// Defaults to Draft
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub featured: bool,
    pub author_id: i64,
    /// Initial category links
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// Initial tag links
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl CreatePostInput {
    pub fn new(
        title: impl Into<String>,
        slug: impl Into<String>,
        content: impl Into<String>,
        author_id: i64,
    ) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            excerpt: None,
            content: content.into(),
            status: None,
            featured: false,
            author_id,
            category_ids: Vec::new(),
            tag_ids: Vec::new(),
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_featured(mut self, featured: bool) -> Self {
        self.featured = featured;
        self
    }

    pub fn with_categories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.category_ids = ids.into_iter().collect();
        self
    }

    pub fn with_tags(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.tag_ids = ids.into_iter().collect();
        self
    }
}

/// Input for updating an existing post
///
/// `category_ids` / `tag_ids`: `None` leaves links untouched, `Some(vec![])`
/// clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub featured: Option<bool>,
    pub category_ids: Option<Vec<i64>>,
    pub tag_ids: Option<Vec<i64>>,
}

impl UpdatePostInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    pub fn with_categories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.category_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_tags(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.tag_ids = Some(ids.into_iter().collect());
        self
    }

    /// Check if any column on the post row itself changes
    pub fn has_field_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.excerpt.is_some()
            || self.content.is_some()
            || self.status.is_some()
            || self.featured.is_some()
    }
}

/// Listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSort {
    /// Newest publication first, ties by insertion order
    #[default]
    PublishedDesc,
    CreatedDesc,
    MostViewed,
    TitleAsc,
}

impl PostSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            PostSort::PublishedDesc => "p.published_at DESC, p.id ASC",
            PostSort::CreatedDesc => "p.created_at DESC, p.id ASC",
            PostSort::MostViewed => "p.view_count DESC, p.id ASC",
            PostSort::TitleAsc => "p.title ASC, p.id ASC",
        }
    }
}

/// Filters for post listings; every set filter is AND-combined
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostQuery {
    /// Case-insensitive substring over title, excerpt and content
    pub search: Option<String>,
    pub category_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub author_id: Option<i64>,
    /// Status Published and `published_at` not in the future
    pub published_only: bool,
    pub status: Option<PostStatus>,
    pub featured: Option<bool>,
    /// Soft-deleted posts are excluded unless this is set
    pub include_deleted: bool,
    pub sort: PostSort,
}

impl PostQuery {
    /// Public listing: published only, newest first
    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_category(mut self, slug: impl Into<String>) -> Self {
        self.category_slug = Some(slug.into());
        self
    }

    pub fn with_tag(mut self, slug: impl Into<String>) -> Self {
        self.tag_slug = Some(slug.into());
        self
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    pub fn with_sort(mut self, sort: PostSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}
