//! Users, client sessions and frontend activity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: &str) -> Self {
        Self {
            id: super::new_id(),
            username: username.trim().to_string(),
            email: None,
            display_name: None,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub is_active: bool,
}

impl Session {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            id: super::new_id(),
            user_id,
            started_at: Utc::now(),
            ended_at: None,
            user_agent: None,
            ip_address: None,
            is_active: true,
        }
    }
}

/// UI event reported by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendActivity {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl FrontendActivity {
    pub fn new(session_id: &str, action: &str, details: Value) -> Self {
        Self {
            id: super::new_id(),
            session_id: session_id.to_string(),
            user_id: None,
            action: action.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }
}
