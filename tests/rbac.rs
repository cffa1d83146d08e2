use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn seeded_roles_and_permissions_are_listed() -> Result<()> {
    let app = common::spawn().await?;
    let (token, _) = app.register("Plain", "plain@example.com").await?;

    let (status, roles) = app.request("GET", "/api/v1/roles", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = roles
        .as_array()
        .context("roles array")?
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["super_admin", "admin", "user"]);

    let (status, perms) = app.request("GET", "/api/v1/permissions", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perms.as_array().map(Vec::len), Some(5));

    let (status, perms) = app.request("GET", "/api/v1/roles/3/permissions", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perms[0]["name"], "dashboard.view");

    Ok(())
}

#[tokio::test]
async fn roles_manage_is_required_to_create_roles() -> Result<()> {
    let app = common::spawn().await?;
    let (user_token, _) = app.register("Plain", "plain@example.com").await?;
    // admin lacks roles.manage in the seed
    let (admin_token, _) = app.register_with_role("Admin", "admin@example.com", "admin").await?;
    let (root_token, _) = app.register_with_role("Root", "root@example.com", "super_admin").await?;

    let body = json!({ "name": "editor", "display_name": "Editor" });
    for token in [&user_token, &admin_token] {
        let (status, _) = app.request("POST", "/api/v1/roles", Some(token), Some(body.clone())).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, role) = app.request("POST", "/api/v1/roles", Some(&root_token), Some(body.clone())).await?;
    assert_eq!(status, StatusCode::CREATED, "role create failed: {}", role);
    assert_eq!(role["name"], "editor");
    assert!(role["id"].as_i64().is_some());

    let (status, _) = app.request("POST", "/api/v1/roles", Some(&root_token), Some(body)).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .request("POST", "/api/v1/roles", Some(&root_token), Some(json!({ "name": "Bad Name" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn granted_permission_changes_the_visible_menus() -> Result<()> {
    let app = common::spawn().await?;
    let (root_token, _) = app.register_with_role("Root", "root@example.com", "super_admin").await?;
    let (user_token, _) = app.register("Plain", "plain@example.com").await?;

    let (status, perm) = app
        .request(
            "POST",
            "/api/v1/permissions",
            Some(&root_token),
            Some(json!({ "name": "reports.view", "description": "View reports" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "permission create failed: {}", perm);
    let perm_id = perm["id"].as_i64().context("permission id")?;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/menus",
            Some(&root_token),
            Some(json!({ "name": "reports", "label": "Reports", "permissions": ["reports.view"] })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, before) = app.request("GET", "/api/v1/menus", Some(&user_token), None).await?;
    assert_eq!(before["data"], json!([]));

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/roles/3/permissions",
            Some(&root_token),
            Some(json!({ "permission_id": perm_id })),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, after) = app.request("GET", "/api/v1/menus", Some(&user_token), None).await?;
    assert_eq!(after["data"][0]["name"], "reports");

    let (status, _) = app
        .request("POST", "/api/v1/roles/3/permissions", Some(&root_token), Some(json!({ "permission_id": 999 })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn user_role_assignment_round_trip() -> Result<()> {
    let app = common::spawn().await?;
    let (root_token, _) = app.register_with_role("Root", "root@example.com", "super_admin").await?;
    let (user_token, user_id) = app.register("Plain", "plain@example.com").await?;
    let uri = format!("/api/v1/users/{}/roles", user_id);

    let (status, _) = app
        .request("POST", &uri, Some(&user_token), Some(json!({ "role_id": 2 })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request("POST", &uri, Some(&root_token), Some(json!({ "role_id": 2 })))
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // users may read their own roles
    let (status, roles) = app.request("GET", &uri, Some(&user_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = roles.as_array().context("roles")?.iter().filter_map(|r| r["id"].as_i64()).collect();
    assert_eq!(ids, vec![2, 3]);

    let (_, me) = app.request("GET", "/api/v1/auth/me", Some(&user_token), None).await?;
    assert!(me["permissions"].as_array().context("permissions")?.contains(&json!("menus.manage")));

    let (status, _) = app.request("DELETE", &format!("{}/2", uri), Some(&root_token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.request("DELETE", &format!("{}/2", uri), Some(&root_token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/users/{}/roles", uuid::Uuid::new_v4()),
            Some(&root_token),
            Some(json!({ "role_id": 2 })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
