//! API layer - HTTP handlers and routing
//!
//! A thin JSON surface over the repository registry:
//! - Post endpoints (listing, lookup by slug, related posts, view counting)
//! - Category and tag listings
//! - User activity feed
//! - Health check

pub mod categories;
pub mod health;
pub mod middleware;
pub mod posts;
pub mod tags;
pub mod users;

use axum::{http::Method, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState};

/// Build the main API router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/posts", posts::router())
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .nest("/users", users::router())
        .nest("/health", health::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", build_api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
