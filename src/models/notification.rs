use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Success => "success",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
            NotificationType::System => "system",
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(NotificationType::Info),
            "success" => Ok(NotificationType::Success),
            "warning" => Ok(NotificationType::Warning),
            "error" => Ok(NotificationType::Error),
            "system" => Ok(NotificationType::System),
            other => Err(AppError::data_integrity(format!("unknown notification type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[schema(value_type = Object)]
    pub data: Option<Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbNotification {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub data: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbNotification {
    pub const COLUMNS: &'static str =
        "id, user_id, title, message, type, data, read_at, action_url, action_text, created_at, updated_at";
}

impl TryFrom<DbNotification> for Notification {
    type Error = AppError;

    fn try_from(value: DbNotification) -> Result<Self, Self::Error> {
        let data = value
            .data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(|err| AppError::data_integrity(format!("notification {} has malformed data: {err}", value.id)))?;

        Ok(Notification {
            id: value.id,
            user_id: value.user_id,
            title: value.title,
            message: value.message,
            kind: value.kind.parse()?,
            data,
            read_at: value.read_at,
            action_url: value.action_url,
            action_text: value.action_text,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationCreateRequest {
    pub user_id: Uuid,
    #[schema(example = "Maintenance window")]
    pub title: String,
    #[schema(example = "The panel will be read-only tonight from 22:00.")]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Option<Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationListQuery {
    /// `true` for unread only, `false` for read only, omitted for all
    pub unread: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}
