//! User model
//!
//! This module defines the User entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered account.
///
/// Credentials and reset tokens are never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar URL
    pub image: Option<String>,
    /// Password hash, absent for accounts without a password
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    /// User role
    pub role: UserRole,
    /// Inactive users are excluded from role counts
    pub is_active: bool,
    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub reset_token_expiry: Option<DateTime<Utc>>,
    /// When the account was deactivated
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Check if the user is an editor (or higher)
    pub fn is_editor(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Editor)
    }

    /// Whether a stored reset token is still usable at `now`
    pub fn has_valid_reset_token(&self, now: DateTime<Utc>) -> bool {
        self.reset_token.is_some() && self.reset_token_expiry.is_some_and(|exp| exp > now)
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular reader / commenter
    #[default]
    User,
    /// Can edit all content
    Editor,
    /// Full access
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Editor => "editor",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "editor" => Ok(UserRole::Editor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: String,
    pub name: Option<String>,
    /// Already hashed
    pub password_hash: Option<String>,
    /// Defaults to User
    pub role: Option<UserRole>,
}

impl CreateUserInput {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            password_hash: None,
            role: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Profile fields a user may change themselves
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub image: Option<String>,
}

impl UpdateProfileInput {
    pub fn has_changes(&self) -> bool {
        self.name.is_some() || self.image.is_some()
    }
}

/// Filters for the user search listing
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// Case-insensitive substring over name and email
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: 1,
            email: "reader@example.com".to_string(),
            name: Some("Reader".to_string()),
            image: None,
            password_hash: Some("hash".to_string()),
            role,
            is_active: true,
            last_login_at: None,
            reset_token: None,
            reset_token_expiry: None,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("editor".parse::<UserRole>().unwrap(), UserRole::Editor);
        assert_eq!("user".parse::<UserRole>().unwrap(), UserRole::User);
        assert!("author".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn test_role_checks() {
        assert!(sample_user(UserRole::Admin).is_admin());
        assert!(sample_user(UserRole::Admin).is_editor());
        assert!(sample_user(UserRole::Editor).is_editor());
        assert!(!sample_user(UserRole::User).is_editor());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut user = sample_user(UserRole::User);
        user.reset_token = Some("secret".to_string());
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert!(json.get("reset_token").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_reset_token_validity() {
        let now = Utc::now();
        let mut user = sample_user(UserRole::User);
        assert!(!user.has_valid_reset_token(now));

        user.reset_token = Some("t".to_string());
        user.reset_token_expiry = Some(now + Duration::hours(1));
        assert!(user.has_valid_reset_token(now));

        user.reset_token_expiry = Some(now - Duration::hours(1));
        assert!(!user.has_valid_reset_token(now));
    }
}
