use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{tree_ids, TestApp};

async fn create(app: &TestApp, token: &str, body: Value) -> Result<i64> {
    let (status, created) = app.request("POST", "/api/v1/menus", Some(token), Some(body)).await?;
    if status != StatusCode::CREATED {
        panic!("menu create failed: {} - {}", status, created);
    }
    created["id"].as_i64().context("missing menu id")
}

#[tokio::test]
async fn admin_builds_and_reads_a_menu_tree() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let root = create(&app, &token, json!({ "name": "admin", "label": "Administration", "order_by": 2 })).await?;
    let users = create(
        &app,
        &token,
        json!({
            "name": "users",
            "label": "Users",
            "parent_id": root,
            "route": "/admin/users",
            "permissions": ["users.view"],
            "role_ids": [1, 2]
        }),
    )
    .await?;
    let home = create(&app, &token, json!({ "name": "home", "label": "Home", "order_by": 1 })).await?;

    let (status, node) = app.request("GET", &format!("/api/v1/menus/{}", users), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node["parent_id"], root);
    assert_eq!(node["required_permissions"], json!(["users.view"]));
    assert_eq!(node["allowed_role_ids"], json!([1, 2]));

    let (status, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree_ids(&body["data"]), vec![home, root, users]);

    Ok(())
}

#[tokio::test]
async fn plain_users_cannot_manage_menus() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register("Plain", "plain@example.com").await?;

    let (status, body) = app
        .request("POST", "/api/v1/menus", Some(&token), Some(json!({ "name": "x", "label": "X" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.request("GET", "/api/v1/menus/all", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn super_admin_bypasses_permission_checks() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Root", "root@example.com", "super_admin").await?;
    // strip the role's grants; the bypass must not depend on them
    sqlx::query("DELETE FROM role_permissions WHERE role_id = 1").execute(&app.pool).await?;

    create(&app, &token, json!({ "name": "home", "label": "Home" })).await?;

    Ok(())
}

#[tokio::test]
async fn invalid_payloads_are_rejected() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    for body in [
        json!({ "name": "", "label": "Empty name" }),
        json!({ "name": "neg", "label": "Negative", "order_by": -1 }),
        json!({ "name": "icon", "label": "Icon", "icon": "x".repeat(51) }),
        json!({ "name": "orphan", "label": "Orphan", "parent_id": 404 }),
        json!({ "name": "ghost", "label": "Ghost role", "role_ids": [77] }),
    ] {
        let (status, resp) = app.request("POST", "/api/v1/menus", Some(&token), Some(body.clone())).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {} -> {}", body, resp);
    }

    Ok(())
}

#[tokio::test]
async fn reparenting_under_a_descendant_is_refused() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let a = create(&app, &token, json!({ "name": "a", "label": "A" })).await?;
    let b = create(&app, &token, json!({ "name": "b", "label": "B", "parent_id": a })).await?;
    let c = create(&app, &token, json!({ "name": "c", "label": "C", "parent_id": b })).await?;

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/menus/{}", a),
            Some(&token),
            Some(json!({ "name": "a", "label": "A", "parent_id": c })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "cycle accepted: {}", body);

    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/v1/menus/{}", a),
            Some(&token),
            Some(json!({ "name": "a", "label": "A", "parent_id": a })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // moving the leaf to the top is fine
    let (status, moved) = app
        .request(
            "PUT",
            &format!("/api/v1/menus/{}", c),
            Some(&token),
            Some(json!({ "name": "c", "label": "C renamed" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(moved["parent_id"].is_null());
    assert_eq!(moved["label"], "C renamed");

    let (status, _) = app
        .request("PUT", "/api/v1/menus/999", Some(&token), Some(json!({ "name": "z", "label": "Z" })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn update_keeps_roles_unless_given() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let id = create(&app, &token, json!({ "name": "r", "label": "R", "role_ids": [2] })).await?;
    let uri = format!("/api/v1/menus/{}", id);

    let (_, node) = app
        .request("PUT", &uri, Some(&token), Some(json!({ "name": "r", "label": "R2" })))
        .await?;
    assert_eq!(node["allowed_role_ids"], json!([2]));

    let (_, node) = app
        .request("PUT", &uri, Some(&token), Some(json!({ "name": "r", "label": "R3", "role_ids": [] })))
        .await?;
    assert_eq!(node["allowed_role_ids"], json!([]));

    Ok(())
}

#[tokio::test]
async fn delete_refuses_parents_and_removes_leaves() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let parent = create(&app, &token, json!({ "name": "p", "label": "Parent" })).await?;
    let child = create(&app, &token, json!({ "name": "c", "label": "Child", "parent_id": parent, "role_ids": [3] })).await?;

    let (status, body) = app.request("DELETE", &format!("/api/v1/menus/{}", parent), Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "unprocessable");

    let (status, _) = app.request("DELETE", &format!("/api/v1/menus/{}", child), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let links: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM menu_role WHERE menu_id = ?")
        .bind(child)
        .fetch_one(&app.pool)
        .await?;
    assert_eq!(links, 0);

    let (status, _) = app.request("DELETE", &format!("/api/v1/menus/{}", child), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request("DELETE", &format!("/api/v1/menus/{}", parent), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}
