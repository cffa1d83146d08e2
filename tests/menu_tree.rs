use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{tree_ids, PlantedMenu, TestApp};

async fn with_auditor_role(app: &TestApp) -> Result<()> {
    sqlx::query("INSERT INTO roles (id, name, display_name) VALUES (5, 'auditor', 'Auditor')")
        .execute(&app.pool)
        .await?;
    Ok(())
}

async fn plant_chain(app: &TestApp) -> Result<()> {
    with_auditor_role(app).await?;
    app.insert_menu(PlantedMenu::new(1, None, "Reports")).await?;
    app.insert_menu(PlantedMenu::new(2, Some(1), "Audit").roles(&[5])).await?;
    app.insert_menu(PlantedMenu::new(3, Some(2), "Audit Trail")).await?;
    Ok(())
}

#[tokio::test]
async fn role_mismatch_prunes_the_whole_branch() -> Result<()> {
    let app = common::spawn_lenient().await?;
    plant_chain(&app).await?;
    let (token, _) = app.register("Plain", "plain@example.com").await?;

    let (status, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "menus failed: {}", body);

    // node 3 has no restriction of its own but its parent is hidden
    assert_eq!(tree_ids(&body["data"]), vec![1]);
    assert_eq!(body["data"][0]["children"], json!([]));
    assert_eq!(body["warnings"], json!([]));

    Ok(())
}

#[tokio::test]
async fn matching_role_reveals_the_full_chain() -> Result<()> {
    let app = common::spawn_lenient().await?;
    plant_chain(&app).await?;
    let (token, user_id) = app.register("Auditor", "auditor@example.com").await?;
    app.grant_role(&user_id, "auditor").await?;

    let (status, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "menus failed: {}", body);

    let data = &body["data"];
    assert_eq!(data.as_array().map(Vec::len), Some(1));
    assert_eq!(data[0]["id"], 1);
    assert_eq!(data[0]["children"][0]["id"], 2);
    assert_eq!(data[0]["children"][0]["children"][0]["id"], 3);
    assert_eq!(data[0]["children"][0]["allowed_role_ids"], json!([5]));

    Ok(())
}

#[tokio::test]
async fn orphan_is_surfaced_as_root_with_a_warning() -> Result<()> {
    let app = common::spawn_lenient().await?;
    app.insert_menu(PlantedMenu::new(1, None, "Dashboard").order(1)).await?;
    app.insert_menu(PlantedMenu::new(4, Some(99), "Stray").order(0)).await?;
    let (token, _) = app.register("Viewer", "viewer@example.com").await?;

    let (status, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "menus failed: {}", body);

    assert_eq!(tree_ids(&body["data"]), vec![4, 1]);
    assert_eq!(
        body["warnings"],
        json!([{ "kind": "orphan_reference", "menu_id": 4, "parent_id": 99 }])
    );

    let (status, me) = app.request("GET", "/api/v1/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree_ids(&me["menus"]), vec![4, 1]);
    assert_eq!(me["warnings"], body["warnings"]);

    Ok(())
}

#[tokio::test]
async fn parent_cycle_is_a_data_integrity_error() -> Result<()> {
    let app = common::spawn_lenient().await?;
    app.insert_menu(PlantedMenu::new(1, None, "Loop A")).await?;
    app.insert_menu(PlantedMenu::new(2, Some(1), "Loop B")).await?;
    sqlx::query("UPDATE menus SET parent_id = 2 WHERE id = 1")
        .execute(&app.pool)
        .await?;
    let (token, _) = app.register("Viewer", "viewer@example.com").await?;

    let (status, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "data_integrity");
    assert!(body.get("data").is_none(), "partial tree returned: {}", body);

    Ok(())
}

#[tokio::test]
async fn permission_requirements_are_all_of() -> Result<()> {
    let app = common::spawn_lenient().await?;
    app.insert_menu(PlantedMenu::new(1, None, "Dashboard").permissions(&["dashboard.view"])).await?;
    app.insert_menu(PlantedMenu::new(2, None, "Users").permissions(&["dashboard.view", "users.view"]).order(1))
        .await?;

    let (user_token, _) = app.register("Plain", "plain@example.com").await?;
    let (admin_token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let (_, body) = app.request("GET", "/api/v1/menus", Some(&user_token), None).await?;
    assert_eq!(tree_ids(&body["data"]), vec![1]);

    let (_, body) = app.request("GET", "/api/v1/menus", Some(&admin_token), None).await?;
    assert_eq!(tree_ids(&body["data"]), vec![1, 2]);

    Ok(())
}

#[tokio::test]
async fn inactive_menus_only_show_in_the_admin_view() -> Result<()> {
    let app = common::spawn_lenient().await?;
    app.insert_menu(PlantedMenu::new(1, None, "Settings").inactive()).await?;
    app.insert_menu(PlantedMenu::new(2, Some(1), "Mail")).await?;
    app.insert_menu(PlantedMenu::new(3, None, "Home").order(5)).await?;

    let (token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;

    let (_, body) = app.request("GET", "/api/v1/menus", Some(&token), None).await?;
    assert_eq!(tree_ids(&body["data"]), vec![3]);

    let (status, body) = app.request("GET", "/api/v1/menus/all", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "menus/all failed: {}", body);
    assert_eq!(tree_ids(&body["data"]), vec![1, 2, 3]);
    assert_eq!(body["data"][0]["is_active"], false);

    Ok(())
}

#[tokio::test]
async fn me_embeds_the_resolved_tree() -> Result<()> {
    let app = common::spawn_lenient().await?;
    plant_chain(&app).await?;
    let (token, user_id) = app.register("Auditor", "auditor@example.com").await?;
    app.grant_role(&user_id, "auditor").await?;

    let (status, me) = app.request("GET", "/api/v1/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree_ids(&me["menus"]), vec![1, 2, 3]);
    assert_eq!(me["roles"], json!(["auditor", "user"]));

    Ok(())
}
