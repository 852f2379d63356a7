//! User API endpoints
//!
//! - GET /api/v1/users/{id}/activity - A user's recent activity documents

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{ActivityPage, ActivityQuery, SortOrder, DEFAULT_ACTIVITY_TAKE, MAX_PAGE_SIZE};

/// Query parameters for the activity feed
#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_take")]
    pub take: u32,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_take() -> u32 { DEFAULT_ACTIVITY_TAKE }

/// Build the users router
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/activity", get(user_activity))
}

async fn user_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityPage>, ApiError> {
    if params.take == 0 || params.take > MAX_PAGE_SIZE {
        return Err(ApiError::validation_error(format!(
            "take must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let query = ActivityQuery {
        skip: params.skip,
        take: params.take,
        order: params.order,
    };
    let page = state.repos.activity.user_activities(&user_id, &query).await?;
    Ok(Json(page))
}
