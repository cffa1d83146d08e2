use std::collections::HashSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::menu::RoleId;

/// Principal represents the authenticated user with their effective grants
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role_ids: HashSet<RoleId>,
    pub roles: HashSet<String>,
    /// Union of the permissions of every assigned role
    pub permissions: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            role_ids: HashSet::new(),
            roles: HashSet::new(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = (RoleId, String)>) -> Self {
        for (id, name) in roles {
            self.role_ids.insert(id);
            self.roles.insert(name);
        }
        self
    }

    pub fn with_permissions(mut self, perms: impl IntoIterator<Item = String>) -> Self {
        self.permissions = perms.into_iter().collect();
        self
    }

    /// Loads role and permission grants for `user_id`.
    ///
    /// Tokens outlive account changes, so a deactivated or deleted user is
    /// refused here even when their token is still valid.
    pub async fn load(pool: &SqlitePool, user_id: Uuid) -> AppResult<Self> {
        let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
        if !active {
            return Err(AppError::forbidden("account is inactive"));
        }

        let roles = sqlx::query_as::<_, (i64, String)>(
            "SELECT r.id, r.name FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let permissions = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT p.name FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN user_roles ur ON ur.role_id = rp.role_id \
             WHERE ur.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(Self::new(user_id).with_roles(roles).with_permissions(permissions))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(super::roles::SUPER_ADMIN)
    }

    /// Gate for admin endpoints. Super admins pass every check.
    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.is_super_admin() {
            tracing::debug!(user_id = %self.user_id, permission, "super_admin bypass");
            return Ok(());
        }

        if self.has_permission(permission) {
            return Ok(());
        }

        tracing::debug!(user_id = %self.user_id, permission, "permission denied");
        Err(AppError::forbidden(format!("missing permission '{permission}'")))
    }

    /// Sorted names, for stable API responses.
    pub fn role_names(&self) -> Vec<String> {
        sorted(&self.roles)
    }

    pub fn permission_names(&self) -> Vec<String> {
        sorted(&self.permissions)
    }
}

fn sorted(names: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = names.iter().cloned().collect();
    names.sort();
    names
}
