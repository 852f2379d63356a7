//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tag list, or the tag cloud with `?cloud=true`

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Tag;

/// Query parameters for tag list
#[derive(Debug, Deserialize)]
pub struct ListTagsQuery {
    /// Most used tags first, unused tags left out
    #[serde(default)]
    pub cloud: bool,
    /// Limit for tag cloud
    #[serde(default = "default_cloud_limit")]
    pub limit: u32,
}

fn default_cloud_limit() -> u32 { 50 }

#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
}

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_tags))
}

async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<ListTagsQuery>,
) -> Result<Json<TagListResponse>, ApiError> {
    let tags = if query.cloud {
        state.repos.tags.popular(query.limit).await?
    } else {
        state.repos.tags.list().await?
    };
    Ok(Json(TagListResponse { tags }))
}
