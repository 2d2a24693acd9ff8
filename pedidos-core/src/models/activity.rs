use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of action recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Login,
    Logout,
    Create,
    Update,
    Delete,
    View,
    PermissionChange,
    Restore,
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Login => "login",
            ActionType::Logout => "logout",
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::View => "view",
            ActionType::PermissionChange => "permission_change",
            ActionType::Restore => "restore",
            ActionType::Other => "other",
        }
    }
}

/// One entry in the user activity log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserActivity {
    pub id: i64,
    pub user_id: i64,
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// Activity entry joined with the acting user's name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserActivityResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub activity: UserActivity,
    pub username: String,
}

/// Login attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessLog {
    pub id: i64,
    pub user_id: i64,
    pub fecha_acceso: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub exitoso: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub action_type: Option<ActionType>,
    pub entity_type: Option<String>,
    pub user: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}
