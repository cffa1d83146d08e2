use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::menu::{MenuId, MenuTree, ResolveWarning, RoleId};

const NAME_MAX: usize = 100;
const LABEL_MAX: usize = 100;
const ICON_MAX: usize = 50;
const ROUTE_MAX: usize = 100;
const URL_MAX: usize = 255;

/// Body for both creating and replacing a menu.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MenuUpsertRequest {
    #[schema(example = "users")]
    pub name: String,
    #[schema(example = "Users")]
    pub label: String,
    #[schema(example = "people")]
    pub icon: Option<String>,
    #[schema(example = "/users")]
    pub route: Option<String>,
    pub url: Option<String>,
    pub parent_id: Option<MenuId>,
    #[schema(example = 10)]
    pub order_by: Option<i32>,
    pub is_active: Option<bool>,
    /// Permission names that are all required to see the menu
    pub permissions: Option<Vec<String>>,
    /// Roles allowed to see the menu; omitted on update keeps the current set
    pub role_ids: Option<Vec<RoleId>>,
    pub description: Option<String>,
}

impl MenuUpsertRequest {
    pub fn validate(&self) -> AppResult<()> {
        required("name", &self.name, NAME_MAX)?;
        required("label", &self.label, LABEL_MAX)?;
        optional("icon", self.icon.as_deref(), ICON_MAX)?;
        optional("route", self.route.as_deref(), ROUTE_MAX)?;
        optional("url", self.url.as_deref(), URL_MAX)?;

        if matches!(self.order_by, Some(order) if order < 0) {
            return Err(AppError::bad_request("order_by must be zero or greater"));
        }

        if let Some(permissions) = &self.permissions {
            if permissions.iter().any(|p| p.trim().is_empty()) {
                return Err(AppError::bad_request("permissions must not contain empty names"));
            }
        }

        Ok(())
    }
}

fn required(field: &str, value: &str, max: usize) -> AppResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    optional(field, Some(value), max)
}

fn optional(field: &str, value: Option<&str>, max: usize) -> AppResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Resolved navigation plus any orphan references found while building it.
#[derive(Debug, Serialize, ToSchema)]
pub struct MenuTreeResponse {
    pub data: Vec<MenuTree>,
    #[schema(value_type = Vec<Object>)]
    pub warnings: Vec<ResolveWarning>,
}
