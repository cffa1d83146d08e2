use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::node::{MenuId, MenuNode, RoleId};
use crate::errors::{AppError, AppResult};
use crate::models::menu::MenuUpsertRequest;

/// Source of flat menu snapshots.
#[async_trait]
pub trait MenuRepository: Send + Sync {
    /// Every menu, active or not, with `allowed_role_ids` populated.
    async fn list_all(&self) -> AppResult<Vec<MenuNode>>;
}

const MENU_COLUMNS: &str =
    "id, parent_id, name, label, icon, route, url, order_by, is_active, permissions, description";

#[derive(Debug, Clone, FromRow)]
struct DbMenu {
    id: i64,
    parent_id: Option<i64>,
    name: String,
    label: String,
    icon: Option<String>,
    route: Option<String>,
    url: Option<String>,
    order_by: i32,
    is_active: bool,
    permissions: Option<String>,
    description: Option<String>,
}

impl DbMenu {
    fn into_node(self, allowed_role_ids: BTreeSet<RoleId>) -> AppResult<MenuNode> {
        let required_permissions = match self.permissions.as_deref().map(str::trim) {
            None | Some("") | Some("null") => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw).map_err(|err| {
                AppError::data_integrity(format!("menu {} has malformed permissions: {err}", self.id))
            })?,
        };

        Ok(MenuNode {
            id: self.id,
            parent_id: self.parent_id,
            name: self.name,
            label: self.label,
            icon: self.icon,
            route: self.route,
            url: self.url,
            description: self.description,
            order_by: self.order_by,
            is_active: self.is_active,
            required_permissions,
            allowed_role_ids,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteMenuRepository {
    pool: SqlitePool,
}

#[async_trait]
impl MenuRepository for SqliteMenuRepository {
    async fn list_all(&self) -> AppResult<Vec<MenuNode>> {
        // menus and their role links come from the same snapshot
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, DbMenu>(&format!("SELECT {MENU_COLUMNS} FROM menus ORDER BY id"))
            .fetch_all(&mut *tx)
            .await?;
        let links = sqlx::query_as::<_, (i64, i64)>("SELECT menu_id, role_id FROM menu_role")
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut roles_by_menu: HashMap<MenuId, BTreeSet<RoleId>> = HashMap::new();
        for (menu_id, role_id) in links {
            roles_by_menu.entry(menu_id).or_default().insert(role_id);
        }

        rows.into_iter()
            .map(|row| {
                let roles = roles_by_menu.remove(&row.id).unwrap_or_default();
                row.into_node(roles)
            })
            .collect()
    }
}

impl SqliteMenuRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: MenuId) -> AppResult<Option<MenuNode>> {
        let mut conn = self.pool.acquire().await?;
        fetch_node(&mut conn, id).await
    }

    pub async fn create(&self, input: &MenuUpsertRequest) -> AppResult<MenuNode> {
        let mut tx = self.pool.begin().await?;

        if let Some(parent_id) = input.parent_id {
            if !menu_exists(&mut tx, parent_id).await? {
                return Err(AppError::bad_request(format!("parent menu {parent_id} does not exist")));
            }
        }
        if let Some(role_ids) = &input.role_ids {
            ensure_roles_exist(&mut tx, role_ids).await?;
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO menus (parent_id, name, label, icon, route, url, order_by, is_active, permissions, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(input.parent_id)
        .bind(input.name.trim())
        .bind(input.label.trim())
        .bind(&input.icon)
        .bind(&input.route)
        .bind(&input.url)
        .bind(input.order_by.unwrap_or(0))
        .bind(input.is_active.unwrap_or(true))
        .bind(encode_permissions(input.permissions.as_deref())?)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(role_ids) = &input.role_ids {
            sync_roles(&mut tx, id, role_ids).await?;
        }

        let node = fetch_node(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::internal("created menu vanished before commit"))?;
        tx.commit().await?;

        Ok(node)
    }

    pub async fn update(&self, id: MenuId, input: &MenuUpsertRequest) -> AppResult<MenuNode> {
        let mut tx = self.pool.begin().await?;

        if !menu_exists(&mut tx, id).await? {
            return Err(AppError::not_found("menu not found"));
        }

        if let Some(parent_id) = input.parent_id {
            if parent_id == id {
                return Err(AppError::bad_request("a menu cannot be its own parent"));
            }
            if !menu_exists(&mut tx, parent_id).await? {
                return Err(AppError::bad_request(format!("parent menu {parent_id} does not exist")));
            }

            let parents: HashMap<MenuId, Option<MenuId>> =
                sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, parent_id FROM menus")
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .collect();
            if would_create_cycle(&parents, id, parent_id) {
                return Err(AppError::bad_request(format!(
                    "menu {parent_id} is a descendant of menu {id} and cannot become its parent"
                )));
            }
        }
        if let Some(role_ids) = &input.role_ids {
            ensure_roles_exist(&mut tx, role_ids).await?;
        }

        sqlx::query(
            "UPDATE menus SET parent_id = ?, name = ?, label = ?, icon = ?, route = ?, url = ?, order_by = ?, \
             is_active = ?, permissions = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(input.parent_id)
        .bind(input.name.trim())
        .bind(input.label.trim())
        .bind(&input.icon)
        .bind(&input.route)
        .bind(&input.url)
        .bind(input.order_by.unwrap_or(0))
        .bind(input.is_active.unwrap_or(true))
        .bind(encode_permissions(input.permissions.as_deref())?)
        .bind(&input.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(role_ids) = &input.role_ids {
            sync_roles(&mut tx, id, role_ids).await?;
        }

        let node = fetch_node(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("menu not found"))?;
        tx.commit().await?;

        Ok(node)
    }

    /// Removes a leaf menu and its role links; menus with children are refused.
    pub async fn delete(&self, id: MenuId) -> AppResult<MenuNode> {
        let mut tx = self.pool.begin().await?;

        let node = fetch_node(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("menu not found"))?;

        let children: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM menus WHERE parent_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if children > 0 {
            return Err(AppError::unprocessable("cannot delete menu with child items"));
        }

        sqlx::query("DELETE FROM menu_role WHERE menu_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM menus WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(node)
    }
}

async fn fetch_node(conn: &mut SqliteConnection, id: MenuId) -> AppResult<Option<MenuNode>> {
    let row = sqlx::query_as::<_, DbMenu>(&format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let roles: BTreeSet<RoleId> = sqlx::query_scalar::<_, i64>("SELECT role_id FROM menu_role WHERE menu_id = ?")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

    row.into_node(roles).map(Some)
}

async fn menu_exists(conn: &mut SqliteConnection, id: MenuId) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM menus WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

async fn ensure_roles_exist(conn: &mut SqliteConnection, role_ids: &[RoleId]) -> AppResult<()> {
    for role_id in role_ids.iter().copied().collect::<BTreeSet<RoleId>>() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE id = ?")
            .bind(role_id)
            .fetch_one(&mut *conn)
            .await?;
        if count == 0 {
            return Err(AppError::bad_request(format!("role {role_id} does not exist")));
        }
    }
    Ok(())
}

async fn sync_roles(conn: &mut SqliteConnection, menu_id: MenuId, role_ids: &[RoleId]) -> AppResult<()> {
    sqlx::query("DELETE FROM menu_role WHERE menu_id = ?")
        .bind(menu_id)
        .execute(&mut *conn)
        .await?;

    for role_id in role_ids {
        sqlx::query("INSERT OR IGNORE INTO menu_role (menu_id, role_id) VALUES (?, ?)")
            .bind(menu_id)
            .bind(role_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn encode_permissions(permissions: Option<&[String]>) -> AppResult<Option<String>> {
    match permissions {
        None | Some([]) => Ok(None),
        Some(list) => serde_json::to_string(list)
            .map(Some)
            .map_err(|err| AppError::internal(format!("failed to encode permissions: {err}"))),
    }
}

/// Whether re-parenting `id` under `new_parent` would close a loop.
///
/// Walks up from `new_parent`; reaching `id` means the new parent is one of its
/// descendants. An already-corrupt chain is also treated as a cycle.
fn would_create_cycle(parents: &HashMap<MenuId, Option<MenuId>>, id: MenuId, new_parent: MenuId) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);

    while let Some(current) = cursor {
        if current == id || !seen.insert(current) {
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}
