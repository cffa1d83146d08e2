//! RBAC admin routes.
//!
//! Roles, permissions and user role assignments. Reads are open to any
//! authenticated user; every write requires `roles.manage`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::menu::RoleId;
use crate::models::rbac::*;
use crate::routes::authorize;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        // Roles
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id/permissions", get(get_role_permissions).post(assign_permission_to_role))
        // Permissions
        .route("/permissions", get(list_permissions).post(create_permission))
        // User role assignments
        .route("/users/:user_id/roles", get(get_user_roles).post(assign_role_to_user))
        .route("/users/:user_id/roles/:role_id", delete(revoke_role_from_user))
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// List all roles
#[utoipa::path(
    get,
    path = "/api/v1/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    let roles = sqlx::query_as::<_, Role>("SELECT id, name, display_name, description FROM roles ORDER BY id")
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(roles))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/api/v1/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Invalid role name"),
        (status = 403, description = "Missing permission 'roles.manage'"),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    authorize(&state, &auth, permissions::ROLES_MANAGE).await?;
    let name = req.name.trim();
    validate_grant_name("role", name).map_err(AppError::bad_request)?;

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE name = ?")
        .bind(name)
        .fetch_one(&state.pool)
        .await?;
    if taken > 0 {
        return Err(AppError::conflict(format!("role '{name}' already exists")));
    }

    let role = sqlx::query_as::<_, Role>(
        "INSERT INTO roles (name, display_name, description) VALUES (?, ?, ?) RETURNING id, name, display_name, description",
    )
    .bind(name)
    .bind(&req.display_name)
    .bind(&req.description)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(role_id = role.id, role = %role.name, user_id = %auth.user_id, "role created");
    Ok((StatusCode::CREATED, Json(role)))
}

/// Permissions granted by a role
#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Permissions of the role", body = Vec<Permission>),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_id): Path<RoleId>,
) -> AppResult<Json<Vec<Permission>>> {
    ensure_role(&state.pool, role_id).await?;

    let perms = sqlx::query_as::<_, Permission>(
        "SELECT p.id, p.name, p.description FROM permissions p \
         JOIN role_permissions rp ON rp.permission_id = p.id \
         WHERE rp.role_id = ? ORDER BY p.name",
    )
    .bind(role_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(perms))
}

/// Grant a permission to a role
#[utoipa::path(
    post,
    path = "/api/v1/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role ID")),
    request_body = AssignPermissionToRoleRequest,
    responses(
        (status = 204, description = "Permission granted"),
        (status = 403, description = "Missing permission 'roles.manage'"),
        (status = 404, description = "Role or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permission_to_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<RoleId>,
    Json(req): Json<AssignPermissionToRoleRequest>,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, permissions::ROLES_MANAGE).await?;
    ensure_role(&state.pool, role_id).await?;

    let known: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM permissions WHERE id = ?")
        .bind(req.permission_id)
        .fetch_one(&state.pool)
        .await?;
    if known == 0 {
        return Err(AppError::not_found("permission not found"));
    }

    sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(req.permission_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(role_id, permission_id = req.permission_id, user_id = %auth.user_id, "permission granted to role");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PERMISSION ENDPOINTS
// =============================================================================

/// List all permissions
#[utoipa::path(
    get,
    path = "/api/v1/permissions",
    tag = "RBAC",
    responses((status = 200, description = "List of permissions", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Permission>>> {
    let perms = sqlx::query_as::<_, Permission>("SELECT id, name, description FROM permissions ORDER BY name")
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(perms))
}

/// Create a new permission
#[utoipa::path(
    post,
    path = "/api/v1/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 400, description = "Invalid permission name"),
        (status = 409, description = "Permission name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    authorize(&state, &auth, permissions::ROLES_MANAGE).await?;
    let name = req.name.trim();
    validate_grant_name("permission", name).map_err(AppError::bad_request)?;

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM permissions WHERE name = ?")
        .bind(name)
        .fetch_one(&state.pool)
        .await?;
    if taken > 0 {
        return Err(AppError::conflict(format!("permission '{name}' already exists")));
    }

    let perm = sqlx::query_as::<_, Permission>(
        "INSERT INTO permissions (name, description) VALUES (?, ?) RETURNING id, name, description",
    )
    .bind(name)
    .bind(&req.description)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(permission_id = perm.id, permission = %perm.name, user_id = %auth.user_id, "permission created");
    Ok((StatusCode::CREATED, Json(perm)))
}

// =============================================================================
// USER ROLE ASSIGNMENTS
// =============================================================================

/// Roles assigned to a user
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Roles of the user", body = Vec<Role>),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Role>>> {
    if user_id != auth.user_id {
        authorize(&state, &auth, permissions::USERS_VIEW).await?;
    }
    ensure_user(&state.pool, user_id).await?;

    let roles = sqlx::query_as::<_, Role>(
        "SELECT r.id, r.name, r.display_name, r.description FROM roles r \
         JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = ? ORDER BY r.id",
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(roles))
}

/// Assign a role to a user
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 403, description = "Missing permission 'roles.manage'"),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role_to_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, permissions::ROLES_MANAGE).await?;
    ensure_user(&state.pool, user_id).await?;
    ensure_role(&state.pool, req.role_id).await?;

    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(req.role_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(target_user = %user_id, role_id = req.role_id, user_id = %auth.user_id, "role assigned");
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke a role from a user
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("role_id" = i64, Path, description = "Role ID")
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 404, description = "Assignment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role_from_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, role_id)): Path<(Uuid, RoleId)>,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, permissions::ROLES_MANAGE).await?;

    let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id)
        .bind(role_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("role assignment not found"));
    }

    tracing::info!(target_user = %user_id, role_id, user_id = %auth.user_id, "role revoked");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// HELPERS
// =============================================================================

async fn ensure_role(pool: &SqlitePool, role_id: RoleId) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(AppError::not_found("role not found"));
    }
    Ok(())
}

async fn ensure_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}
