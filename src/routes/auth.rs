use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::menu;
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, DbUser, LoginRequest, MeResponse, ProfileUpdateRequest, RegisterRequest, User,
};
use crate::routes::MessageResponse;
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid name, e-mail or password"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    let email = normalize_email(&payload.email)?;
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user_id)
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?")
        .bind(user_id)
        .bind(roles::USER)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "user registered");

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.into();
    let principal = Principal::load(&state.pool, user_id).await?;
    let token = state.jwt.encode(user_id)?;

    Ok((StatusCode::CREATED, Json(auth_response(token, user, &principal))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    let db_user = sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users WHERE email = ?", DbUser::COLUMNS))
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.is_active {
        return Err(AppError::forbidden("account is inactive"));
    }

    let now = utc_now();
    sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(db_user.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %db_user.id, "user logged in");

    let user: User = fetch_user_by_id(&state.pool, db_user.id).await?.into();
    let principal = Principal::load(&state.pool, user.id).await?;
    let token = state.jwt.encode(user.id)?;

    Ok(Json(auth_response(token, user, &principal)))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user with grants and navigation", body = MeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MeResponse>> {
    let user: User = fetch_user_by_id(&state.pool, auth.user_id).await?.into();
    let principal = Principal::load(&state.pool, auth.user_id).await?;
    let menus = menu::resolve_for(&state.menus, &principal.role_ids, &principal.permissions).await?;

    Ok(Json(MeResponse {
        user,
        roles: principal.role_names(),
        permissions: principal.permission_names(),
        menus: menus.roots,
        warnings: menus.warnings,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/profile",
    tag = "Auth",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid name, e-mail or password, or wrong current password"),
        (status = 403, description = "Account is inactive"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProfileUpdateRequest>,
) -> AppResult<Json<User>> {
    let db_user = fetch_active_user(&state.pool, auth.user_id).await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    if name.chars().count() > 255 {
        return Err(AppError::bad_request("name must be at most 255 characters"));
    }
    let email = normalize_email(&payload.email)?;
    if email != db_user.email {
        ensure_email_available(&state.pool, &email).await?;
    }

    let current = payload.current_password.as_deref().unwrap_or_default();
    let new_password = payload.password.as_deref().unwrap_or_default();
    if !current.is_empty() || !new_password.is_empty() {
        ensure_current_password(current, &db_user.password_hash)?;
    }
    let password_hash = if new_password.is_empty() {
        db_user.password_hash
    } else {
        hash_password(new_password)?
    };

    sqlx::query("UPDATE users SET name = ?, email = ?, password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(&email)
        .bind(password_hash)
        .bind(utc_now())
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %auth.user_id, "profile updated");

    let user: User = fetch_user_by_id(&state.pool, auth.user_id).await?.into();
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password or new password too short"),
        (status = 403, description = "Account is inactive")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = fetch_active_user(&state.pool, auth.user_id).await?;
    ensure_current_password(&payload.current_password, &db_user.password_hash)?;
    let password_hash = hash_password(&payload.password)?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %auth.user_id, "password changed");
    Ok(Json(MessageResponse::new("Password changed")))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    // tokens are stateless; the client discards its copy
    tracing::info!(user_id = %auth.user_id, "user logged out");
    Ok(Json(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Fresh token issued", body = AuthResponse),
        (status = 403, description = "Account is inactive")
    ),
    security(("bearerAuth" = []))
)]
pub async fn refresh(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<AuthResponse>> {
    let user: User = fetch_active_user(&state.pool, auth.user_id).await?.into();
    let principal = Principal::load(&state.pool, user.id).await?;
    let token = state.jwt.encode(user.id)?;

    Ok(Json(auth_response(token, user, &principal)))
}

fn auth_response(token: String, user: User, principal: &Principal) -> AuthResponse {
    AuthResponse {
        token,
        user,
        roles: principal.role_names(),
        permissions: principal.permission_names(),
    }
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

fn ensure_current_password(candidate: &str, password_hash: &str) -> AppResult<()> {
    if candidate.is_empty() || !verify_password(candidate, password_hash)? {
        return Err(AppError::bad_request("current password is incorrect"));
    }
    Ok(())
}

async fn fetch_active_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    let db_user = fetch_user_by_id(pool, user_id).await?;
    if !db_user.is_active {
        return Err(AppError::forbidden("account is inactive"));
    }
    Ok(db_user)
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users WHERE id = ?", DbUser::COLUMNS))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
