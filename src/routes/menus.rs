use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::{permissions, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::menu::{self, MenuId, MenuNode, ResolvedMenus};
use crate::models::menu::{MenuTreeResponse, MenuUpsertRequest};
use crate::routes::authorize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_menus).post(create_menu))
        .route("/all", get(list_all_menus))
        .route("/:id", get(get_menu).put(update_menu).delete(delete_menu))
}

/// Navigation tree the caller may see.
#[utoipa::path(
    get,
    path = "/api/v1/menus",
    tag = "Menus",
    responses(
        (status = 200, description = "Menu tree filtered by the caller's roles and permissions", body = MenuTreeResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Stored menu hierarchy contains a cycle")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_menus(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MenuTreeResponse>> {
    let principal = Principal::load(&state.pool, auth.user_id).await?;
    let resolved = menu::resolve_for(&state.menus, &principal.role_ids, &principal.permissions).await?;
    Ok(Json(tree_response(resolved)))
}

/// Every menu, including inactive ones, for the admin editor.
#[utoipa::path(
    get,
    path = "/api/v1/menus/all",
    tag = "Menus",
    responses(
        (status = 200, description = "Complete menu tree", body = MenuTreeResponse),
        (status = 403, description = "Missing permission 'menus.manage'")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_all_menus(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MenuTreeResponse>> {
    authorize(&state, &auth, permissions::MENUS_MANAGE).await?;
    let resolved = menu::resolve_everything(&state.menus).await?;
    Ok(Json(tree_response(resolved)))
}

#[utoipa::path(
    get,
    path = "/api/v1/menus/{id}",
    tag = "Menus",
    params(("id" = i64, Path, description = "Menu id")),
    responses(
        (status = 200, description = "Menu item", body = MenuNode),
        (status = 404, description = "Menu not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<MenuId>,
) -> AppResult<Json<MenuNode>> {
    authorize(&state, &auth, permissions::MENUS_MANAGE).await?;
    let node = state
        .menus
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found("menu not found"))?;
    Ok(Json(node))
}

#[utoipa::path(
    post,
    path = "/api/v1/menus",
    tag = "Menus",
    request_body = MenuUpsertRequest,
    responses(
        (status = 201, description = "Menu created", body = MenuNode),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing permission 'menus.manage'")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<MenuUpsertRequest>,
) -> AppResult<(StatusCode, Json<MenuNode>)> {
    authorize(&state, &auth, permissions::MENUS_MANAGE).await?;
    payload.validate()?;

    let node = state.menus.create(&payload).await?;
    tracing::info!(menu_id = node.id, parent_id = ?node.parent_id, user_id = %auth.user_id, "menu created");

    Ok((StatusCode::CREATED, Json(node)))
}

#[utoipa::path(
    put,
    path = "/api/v1/menus/{id}",
    tag = "Menus",
    params(("id" = i64, Path, description = "Menu id")),
    request_body = MenuUpsertRequest,
    responses(
        (status = 200, description = "Menu updated", body = MenuNode),
        (status = 400, description = "Validation failed or the new parent would form a cycle"),
        (status = 404, description = "Menu not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<MenuId>,
    Json(payload): Json<MenuUpsertRequest>,
) -> AppResult<Json<MenuNode>> {
    authorize(&state, &auth, permissions::MENUS_MANAGE).await?;
    payload.validate()?;

    let node = state.menus.update(id, &payload).await?;
    tracing::info!(menu_id = id, parent_id = ?node.parent_id, user_id = %auth.user_id, "menu updated");

    Ok(Json(node))
}

#[utoipa::path(
    delete,
    path = "/api/v1/menus/{id}",
    tag = "Menus",
    params(("id" = i64, Path, description = "Menu id")),
    responses(
        (status = 204, description = "Menu deleted"),
        (status = 404, description = "Menu not found"),
        (status = 422, description = "Menu still has child items")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<MenuId>,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, permissions::MENUS_MANAGE).await?;

    let node = state.menus.delete(id).await?;
    tracing::info!(menu_id = id, label = %node.label, user_id = %auth.user_id, "menu deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn tree_response(resolved: ResolvedMenus) -> MenuTreeResponse {
    MenuTreeResponse {
        data: resolved.roots,
        warnings: resolved.warnings,
    }
}
