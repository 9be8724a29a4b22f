// User candidate and filter types consumed by import/export

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Candidate user built from one import row (or a direct create request)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(
        min = 1,
        max = 255,
        message = "The name field is required and must not be greater than 255 characters."
    ))]
    pub name: String,

    #[validate(email(message = "The email field must be a valid email address."))]
    pub email: String,

    #[validate(length(max = 20, message = "The phone field must not be greater than 20 characters."))]
    pub phone: Option<String>,

    #[validate(length(min = 8, message = "The password field must be at least 8 characters."))]
    pub password: String,

    pub is_active: bool,

    pub roles: Vec<String>,
}

/// Persisted user as returned by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Columns a user listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserOrderBy {
    Id,
    Name,
    Email,
    #[default]
    CreatedAt,
}

impl UserOrderBy {
    pub fn column(&self) -> &'static str {
        match self {
            UserOrderBy::Id => "id",
            UserOrderBy::Name => "name",
            UserOrderBy::Email => "email",
            UserOrderBy::CreatedAt => "created_at",
        }
    }
}

/// Listing criteria shared by the synchronous listing and export jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default)]
    pub order_by: UserOrderBy,
    #[serde(default)]
    pub order_direction: SortDirection,
}

impl UserFilter {
    /// Build from a job's stored `filters` map; unknown keys are ignored
    pub fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(map.clone()))
    }

    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Human readable summary, e.g. `Search: john, Status: Active`
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(search) = &self.search {
            parts.push(format!("Search: {}", search));
        }
        if let Some(active) = self.is_active {
            parts.push(format!(
                "Status: {}",
                if active { "Active" } else { "Inactive" }
            ));
        }
        if let Some(role) = &self.role_name {
            parts.push(format!("Role: {}", role));
        }
        parts.join(", ")
    }
}
