//! Shared fixtures for repository tests

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::{create_test_pool, migrations, DynDatabasePool};

/// In-memory SQLite with every migration applied
pub async fn setup_pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub async fn insert_user(pool: &SqlitePool, email: &str) -> i64 {
    let now = Utc::now();
    sqlx::query("INSERT INTO users (email, name, role, created_at, updated_at) VALUES (?, ?, 'user', ?, ?)")
        .bind(email)
        .bind(email.split('@').next().unwrap_or(email))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("Failed to create user")
        .last_insert_rowid()
}

/// Draft post with no links and no counter changes
pub async fn insert_post(pool: &SqlitePool, author_id: i64, slug: &str) -> i64 {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO posts (title, slug, content, status, author_id, created_at, updated_at) VALUES (?, ?, 'Body', 'draft', ?, ?, ?)",
    )
    .bind(format!("Post {}", slug))
    .bind(slug)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to create post")
    .last_insert_rowid()
}

pub async fn insert_comment(pool: &SqlitePool, post_id: i64, author_id: Option<i64>) {
    sqlx::query("INSERT INTO comments (post_id, author_id, content, created_at) VALUES (?, ?, 'Nice post', ?)")
        .bind(post_id)
        .bind(author_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to create comment");
}
