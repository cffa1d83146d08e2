use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{menu, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::update_profile,
		routes::auth::change_password,
		routes::auth::logout,
		routes::auth::refresh,
		routes::menus::list_menus,
		routes::menus::list_all_menus,
		routes::menus::get_menu,
		routes::menus::create_menu,
		routes::menus::update_menu,
		routes::menus::delete_menu,
		routes::rbac::list_roles,
		routes::rbac::create_role,
		routes::rbac::get_role_permissions,
		routes::rbac::assign_permission_to_role,
		routes::rbac::list_permissions,
		routes::rbac::create_permission,
		routes::rbac::get_user_roles,
		routes::rbac::assign_role_to_user,
		routes::rbac::revoke_role_from_user,
		routes::notifications::list_notifications,
		routes::notifications::unread_count,
		routes::notifications::mark_read,
		routes::notifications::mark_all_read,
		routes::notifications::delete_notification,
		routes::notifications::send_notification
	),
	components(
		schemas(
			routes::MessageResponse,
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::MeResponse,
			models::user::ProfileUpdateRequest,
			models::user::ChangePasswordRequest,
			menu::MenuNode,
			menu::MenuTree,
			models::menu::MenuUpsertRequest,
			models::menu::MenuTreeResponse,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::Permission,
			models::rbac::PermissionCreateRequest,
			models::rbac::AssignRoleRequest,
			models::rbac::AssignPermissionToRoleRequest,
			models::notification::NotificationType,
			models::notification::Notification,
			models::notification::NotificationCreateRequest,
			models::notification::UnreadCount,
			models::notification::MarkedRead
		)
	),
	tags(
		(name = "Health", description = "Liveness and database probe"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Menus", description = "Role and permission aware navigation"),
		(name = "RBAC", description = "Roles, permissions and assignments"),
		(name = "Notifications", description = "Per-user notifications")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc);
	ensure_openapi_version(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn normalize_path_operations(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	let snapshot = paths.clone();
	for (path, item) in snapshot {
		if let Some(ops) = item.as_object() {
			let mut normalized = Map::new();
			for (method, val) in ops {
				let key = method.to_lowercase();
				if let Some(existing) = normalized.get_mut(&key) {
					merge_values(existing, val);
				} else {
					normalized.insert(key, val.clone());
				}
			}
			paths.insert(path, Value::Object(normalized));
		}
	}
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else { return; };
	let Some(components) = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};
	let Some(schemes) = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_openapi_version(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("openapi").or_insert_with(|| Value::String("3.1.0".to_string()));
	}
}

fn add_examples(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		if let Some(operations) = item.as_object_mut() {
			for operation in operations.values_mut() {
				apply_request_examples(operation);
				apply_response_examples(operation);
			}
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(app_json) = json_content(operation.get_mut("requestBody")) else { return; };
	let Some(reference) = app_json.get("schema").and_then(|s| s.get("$ref")).and_then(Value::as_str) else { return; };

	let example = match reference {
		"#/components/schemas/LoginRequest" => Some(json!({
			"email": "ada@example.com",
			"password": "S3cureP@ssw0rd"
		})),
		"#/components/schemas/RegisterRequest" => Some(json!({
			"name": "Ada Lovelace",
			"email": "ada@example.com",
			"password": "S3cureP@ssw0rd"
		})),
		"#/components/schemas/ChangePasswordRequest" => Some(json!({
			"current_password": "S3cureP@ssw0rd",
			"password": "N3wS3cureP@ss"
		})),
		"#/components/schemas/MenuUpsertRequest" => Some(json!({
			"name": "user_management",
			"label": "User Management",
			"icon": "people",
			"route": "/users",
			"parent_id": null,
			"order_by": 10,
			"permissions": ["users.view"],
			"role_ids": [1, 2]
		})),
		"#/components/schemas/NotificationCreateRequest" => Some(json!({
			"user_id": "00000000-0000-0000-0000-000000000000",
			"title": "Maintenance window",
			"message": "The panel will be read-only tonight from 22:00.",
			"type": "system"
		})),
		_ => None,
	};

	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}

fn apply_response_examples(operation: &mut Value) {
	let Some(responses) = operation.get_mut("responses").and_then(Value::as_object_mut) else { return; };

	for response in responses.values_mut() {
		let Some(app_json) = json_content(Some(response)) else { continue; };
		let Some(reference) = app_json.get("schema").and_then(|s| s.get("$ref")).and_then(Value::as_str) else { continue; };

		if reference == "#/components/schemas/MenuTreeResponse" {
			app_json.insert("example".to_string(), menu_tree_example());
		}
	}
}

fn json_content(container: Option<&mut Value>) -> Option<&mut Map<String, Value>> {
	container?
		.get_mut("content")?
		.as_object_mut()?
		.get_mut("application/json")?
		.as_object_mut()
}

fn menu_tree_example() -> Value {
	json!({
		"data": [{
			"id": 1,
			"parent_id": null,
			"name": "dashboard",
			"label": "Dashboard",
			"icon": "home",
			"route": "/dashboard",
			"url": null,
			"description": null,
			"order_by": 0,
			"is_active": true,
			"required_permissions": [],
			"allowed_role_ids": [],
			"children": []
		}],
		"warnings": []
	})
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
