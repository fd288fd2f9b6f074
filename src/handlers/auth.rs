// src/handlers/auth.rs

use axum::{
    Extension, Json,
    body::Body,
    extract::State,
    http::Request,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{ChangePasswordRequest, LoginRequest, RefreshRequest, User},
    state::AppState,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, bearer_token, sign_jwt, verify_jwt},
    },
};

fn sign_token_pair(state: &AppState, id: i64, email: &str, role: &str) -> Result<(String, String), AppError> {
    let access = sign_jwt(
        id,
        email,
        role,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;
    let refresh = sign_jwt(
        id,
        email,
        role,
        &state.config.jwt_refresh_secret,
        state.config.jwt_refresh_expiration,
    )?;
    Ok((access, refresh))
}

/// Authenticates a user and returns an access/refresh token pair.
///
/// Every failed attempt feeds the per-email lockout counter; once locked,
/// attempts are refused regardless of credential correctness until the
/// window elapses.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    responses(
        (status = 200, description = "Access and refresh token pair"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Account locked after repeated failures"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if state.login_guard.is_locked(&payload.email) {
        return Err(AppError::Locked(format!(
            "Account locked. Please wait 30 minutes or contact support {}",
            state.config.support_contact
        )));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role, must_change_password, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let Some(user) = user else {
        state.login_guard.record_failure(&payload.email);
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    };

    if !verify_password(&payload.password, &user.password)? {
        state.login_guard.record_failure(&payload.email);
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    state.login_guard.clear(&payload.email);

    let (access_token, refresh_token) = sign_token_pair(&state, user.id, &user.email, &user.role)?;

    Ok(Json(json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role,
            "mustChangePassword": user.must_change_password,
        }
    })))
}

/// Exchanges a valid refresh token for a fresh token pair.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_jwt(&payload.refresh_token, &state.config.jwt_refresh_secret)
        .map_err(|_| AppError::AuthError("Invalid refresh token".to_string()))?;

    let (access_token, refresh_token) =
        sign_token_pair(&state, claims.user_id()?, &claims.email, &claims.role)?;

    Ok(Json(json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
    })))
}

/// Invalidates the presented access token for the rest of its lifetime.
pub async fn logout(
    State(state): State<AppState>,
    req: Request<Body>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = bearer_token(&req) {
        state.blocklist.block(token);
    }

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Replaces the caller's password and clears the must-change-password flag.
/// This is the only route a flagged student can still reach.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    let current_hash: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;

    let current_hash = current_hash.ok_or(AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.current_password, &current_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let new_hash = hash_password(&payload.new_password)?;

    sqlx::query("UPDATE users SET password = $1, must_change_password = FALSE WHERE id = $2")
        .bind(&new_hash)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}
