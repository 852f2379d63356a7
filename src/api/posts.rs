//! Post API endpoints
//!
//! - GET  /api/v1/posts - Published posts, filtered and paginated
//! - GET  /api/v1/posts/{slug} - One published post with its relations
//! - GET  /api/v1/posts/{id}/related - Posts sharing a category
//! - POST /api/v1/posts/{id}/view - Count a view

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::db::repositories::DEFAULT_RELATED_LIMIT;
use crate::models::{ListParams, Paginated, PostInclude, PostQuery, PostSort, PostWithRelations};

/// Query parameters for listing posts
#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub search: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Tag slug
    pub tag: Option<String>,
    pub author: Option<i64>,
    pub featured: Option<bool>,
    #[serde(default)]
    pub sort: PostSort,
}

fn default_page() -> u32 { 1 }
fn default_page_size() -> u32 { 10 }

impl ListPostsQuery {
    fn to_query(&self) -> PostQuery {
        PostQuery {
            search: self.search.clone(),
            category_slug: self.category.clone(),
            tag_slug: self.tag.clone(),
            author_id: self.author,
            featured: self.featured,
            sort: self.sort,
            ..PostQuery::published()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    #[serde(default = "default_related_limit")]
    pub limit: u32,
}

fn default_related_limit() -> u32 { DEFAULT_RELATED_LIMIT }

/// Build the posts router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{post}", get(get_post))
        .route("/{post}/related", get(related_posts))
        .route("/{post}/view", post(increment_view))
}

/// GET /api/v1/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Paginated<PostWithRelations>>, ApiError> {
    let params = ListParams::new(query.page, query.page_size);
    let include = PostInclude {
        author: true,
        categories: true,
        tags: true,
        comment_count: false,
    };
    let page = state.repos.posts.list(&query.to_query(), &params, include).await?;
    Ok(Json(page))
}

/// GET /api/v1/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostWithRelations>, ApiError> {
    let post = state
        .repos
        .posts
        .find_published_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", slug)))?;
    Ok(Json(post))
}

/// GET /api/v1/posts/{id}/related
async fn related_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RelatedQuery>,
) -> Result<Json<Vec<PostWithRelations>>, ApiError> {
    let post = state
        .repos
        .posts
        .find_with_relations(id, PostInclude { categories: true, ..PostInclude::default() })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", id)))?;

    let related = state
        .repos
        .posts
        .related_posts(id, &post.category_ids(), query.limit.min(20))
        .await?;
    Ok(Json(related))
}

/// POST /api/v1/posts/{id}/view
async fn increment_view(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.repos.posts.increment_view_count(id, 1).await?;
    Ok(StatusCode::NO_CONTENT)
}
