//! User activity log documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for activity listings
pub const DEFAULT_ACTIVITY_TAKE: u32 = 20;

/// One append-only activity document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    /// UUID v4
    pub id: String,
    pub user_id: String,
    pub action: String,
    /// Free-form JSON attached by the caller
    pub metadata: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `log_activity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogActivityInput {
    pub user_id: String,
    pub action: String,
    pub metadata: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl LogActivityInput {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            metadata: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}

/// Sort direction on creation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Skip/take window over a user's activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub skip: u32,
    pub take: u32,
    pub order: SortOrder,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            take: DEFAULT_ACTIVITY_TAKE,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPagination {
    pub total: i64,
    pub skip: u32,
    pub take: u32,
    pub has_more: bool,
}

impl ActivityPagination {
    pub fn new(total: i64, query: &ActivityQuery) -> Self {
        Self {
            total,
            skip: query.skip,
            take: query.take,
            has_more: (query.skip as i64 + query.take as i64) < total,
        }
    }
}

/// `{ data, pagination: { total, skip, take, hasMore } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPage {
    pub data: Vec<ActivityLog>,
    pub pagination: ActivityPagination,
}
