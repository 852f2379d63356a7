//! Document store
//!
//! Append-only user activity documents kept on their own sqlx pool, apart
//! from the relational schema. Documents carry a UUID id and a JSON payload;
//! a TTL on creation time bounds how long they live.

mod activity;

pub use activity::{
    spawn_purge_task, ActivityLogRepository, SqlxActivityLogRepository, DEFAULT_RETENTION_DAYS,
};
