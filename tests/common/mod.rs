#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use menu_admin::create_app;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

/// Fresh database file with migrations applied and the router on top.
pub async fn spawn() -> Result<TestApp> {
    spawn_with(true).await
}

/// Same as [`spawn`] but without foreign key enforcement, so tests can plant
/// orphaned or cyclic menu rows.
pub async fn spawn_lenient() -> Result<TestApp> {
    spawn_with(false).await
}

async fn spawn_with(foreign_keys: bool) -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(foreign_keys);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
        };

        Ok((status, value))
    }

    /// Registers a user and returns `(token, user_id)`.
    pub async fn register(&self, name: &str, email: &str) -> Result<(String, String)> {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "password123" })),
            )
            .await?;
        if status != StatusCode::CREATED {
            panic!("register failed: {} - {}", status, body);
        }

        let token = body["token"].as_str().context("missing token")?.to_string();
        let user_id = body["user"]["id"].as_str().context("missing user id")?.to_string();
        Ok((token, user_id))
    }

    /// Registers a user holding `role` in addition to the default one.
    pub async fn register_with_role(&self, name: &str, email: &str, role: &str) -> Result<(String, String)> {
        let (token, user_id) = self.register(name, email).await?;
        self.grant_role(&user_id, role).await?;
        Ok((token, user_id))
    }

    pub async fn grant_role(&self, user_id: &str, role: &str) -> Result<()> {
        let user_id: uuid::Uuid = user_id.parse()?;
        let affected = sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?")
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await?
            .rows_affected();
        assert_eq!(affected, 1, "unknown role {role}");
        Ok(())
    }

    /// Plants a menu row directly, bypassing API validation.
    pub async fn insert_menu(&self, menu: PlantedMenu<'_>) -> Result<()> {
        let permissions = if menu.permissions.is_empty() {
            None
        } else {
            Some(serde_json::to_string(menu.permissions)?)
        };
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO menus (id, parent_id, name, label, order_by, is_active, permissions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(menu.id)
        .bind(menu.parent_id)
        .bind(menu.label.to_lowercase().replace(' ', "_"))
        .bind(menu.label)
        .bind(menu.order_by)
        .bind(menu.is_active)
        .bind(permissions)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        for role_id in menu.role_ids {
            sqlx::query("INSERT INTO menu_role (menu_id, role_id) VALUES (?, ?)")
                .bind(menu.id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

pub struct PlantedMenu<'a> {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub label: &'a str,
    pub order_by: i32,
    pub is_active: bool,
    pub role_ids: &'a [i64],
    pub permissions: &'a [&'a str],
}

impl<'a> PlantedMenu<'a> {
    pub fn new(id: i64, parent_id: Option<i64>, label: &'a str) -> Self {
        Self {
            id,
            parent_id,
            label,
            order_by: 0,
            is_active: true,
            role_ids: &[],
            permissions: &[],
        }
    }

    pub fn roles(mut self, role_ids: &'a [i64]) -> Self {
        self.role_ids = role_ids;
        self
    }

    pub fn permissions(mut self, permissions: &'a [&'a str]) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn order(mut self, order_by: i32) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Ids of a serialized tree, depth-first.
pub fn tree_ids(nodes: &Value) -> Vec<i64> {
    let mut ids = Vec::new();
    if let Some(nodes) = nodes.as_array() {
        for node in nodes {
            if let Some(id) = node["id"].as_i64() {
                ids.push(id);
            }
            ids.extend(tree_ids(&node["children"]));
        }
    }
    ids
}
