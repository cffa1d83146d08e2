use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::notification::{
    DbNotification, MarkedRead, Notification, NotificationCreateRequest, NotificationListQuery, UnreadCount,
};
use crate::routes::authorize;
use crate::utils::utc_now;

const TITLE_MAX: usize = 255;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(send_notification))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/:id/read", post(mark_read))
        .route("/:id", delete(delete_notification))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "Notifications",
    params(NotificationListQuery),
    responses((status = 200, description = "Caller's notifications, newest first", body = [Notification])),
    security(("bearerAuth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let filter = match query.unread {
        Some(true) => " AND read_at IS NULL",
        Some(false) => " AND read_at IS NOT NULL",
        None => "",
    };
    let sql = format!(
        "SELECT {} FROM notifications WHERE user_id = ?{filter} ORDER BY created_at DESC, id DESC",
        DbNotification::COLUMNS
    );

    let rows = sqlx::query_as::<_, DbNotification>(&sql)
        .bind(auth.user_id)
        .fetch_all(&state.pool)
        .await?;

    let notifications: Vec<Notification> = rows
        .into_iter()
        .map(Notification::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(notifications))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    tag = "Notifications",
    responses((status = 200, description = "Unread notification count", body = UnreadCount)),
    security(("bearerAuth" = []))
)]
pub async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UnreadCount>> {
    let unread: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM notifications WHERE user_id = ? AND read_at IS NULL")
        .bind(auth.user_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(UnreadCount { unread }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 404, description = "Notification not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Notification>> {
    let now = utc_now();
    // keeps the first read timestamp
    let result = sqlx::query(
        "UPDATE notifications SET read_at = COALESCE(read_at, ?), updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(auth.user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("notification not found"));
    }

    let notification = fetch_owned(&state.pool, id, auth.user_id).await?;
    Ok(Json(notification))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read-all",
    tag = "Notifications",
    responses((status = 200, description = "Number of notifications marked as read", body = MarkedRead)),
    security(("bearerAuth" = []))
)]
pub async fn mark_all_read(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MarkedRead>> {
    let now = utc_now();
    let result = sqlx::query("UPDATE notifications SET read_at = ?, updated_at = ? WHERE user_id = ? AND read_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(MarkedRead {
        updated: result.rows_affected(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications/{id}",
    tag = "Notifications",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("notification not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "Notifications",
    request_body = NotificationCreateRequest,
    responses(
        (status = 201, description = "Notification sent", body = Notification),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing permission 'notifications.send'"),
        (status = 404, description = "Recipient not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn send_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NotificationCreateRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    authorize(&state, &auth, permissions::NOTIFICATIONS_SEND).await?;

    let title = payload.title.trim();
    if title.is_empty() || title.chars().count() > TITLE_MAX {
        return Err(AppError::bad_request(format!("title must be between 1 and {TITLE_MAX} characters")));
    }
    if payload.message.trim().is_empty() {
        return Err(AppError::bad_request("message is required"));
    }

    let recipient: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_one(&state.pool)
        .await?;
    if recipient == 0 {
        return Err(AppError::not_found("recipient not found"));
    }

    let data = payload
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| AppError::bad_request(format!("invalid data payload: {err}")))?;

    let now = utc_now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO notifications (user_id, title, message, type, data, action_url, action_text, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(payload.user_id)
    .bind(title)
    .bind(&payload.message)
    .bind(payload.kind.as_str())
    .bind(data)
    .bind(&payload.action_url)
    .bind(&payload.action_text)
    .bind(now)
    .bind(now)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(notification_id = id, recipient = %payload.user_id, sender = %auth.user_id, "notification sent");

    let notification = fetch_owned(&state.pool, id, payload.user_id).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn fetch_owned(pool: &SqlitePool, id: i64, user_id: Uuid) -> AppResult<Notification> {
    let row = sqlx::query_as::<_, DbNotification>(&format!(
        "SELECT {} FROM notifications WHERE id = ? AND user_id = ?",
        DbNotification::COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("notification not found"))?;

    Notification::try_from(row)
}
