pub mod auth;
pub mod health;
pub mod menus;
pub mod notifications;
pub mod rbac;

use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::Principal;
use crate::errors::AppResult;
use crate::jwt::AuthUser;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Loads the caller's grants and checks one permission.
pub(crate) async fn authorize(state: &AppState, auth: &AuthUser, permission: &str) -> AppResult<Principal> {
    let principal = Principal::load(&state.pool, auth.user_id).await?;
    principal.require(permission)?;
    Ok(principal)
}
