// src/utils/jwt.rs

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    permissions::{self, Permission, Role},
    state::AppState,
};

/// JWT Claims structure. The same shape is signed with the access secret and,
/// for refresh tokens, with the refresh secret.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's email, needed for the must-change-password lookup.
    pub email: String,
    /// User's role (e.g., 'student', 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    /// The subject must be a numeric user id; anything else means the token
    /// was not minted by us.
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token".to_string()))
    }
}

/// Signs a new JWT for the user.
pub fn sign_jwt(
    id: i64,
    email: &str,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        email: email.to_owned(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Pulls the bearer token out of the Authorization header, if present.
pub fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header against the access
/// secret and the logout blocklist, then injects `Claims` into the request
/// extensions for handlers to use.
///
/// Students carry one extra rule: while their must-change-password flag is set,
/// every protected route is refused until the credential is reset.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?
        .to_owned();

    if state.blocklist.contains(&token) {
        return Err(AppError::AuthError("Token blocked".to_string()));
    }

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;

    let role = Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;

    if role == Role::Student {
        let must_change: Option<bool> =
            sqlx::query_scalar("SELECT must_change_password FROM users WHERE id = $1")
                .bind(claims.user_id()?)
                .fetch_optional(&state.pool)
                .await?;

        if must_change.unwrap_or(false) {
            return Err(AppError::Forbidden("Password change required".to_string()));
        }
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Same as `auth_middleware` minus the must-change-password lookup.
///
/// Only the password-change route uses this; a flagged student has to be able
/// to reach it to clear the flag.
pub async fn auth_token_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?
        .to_owned();

    if state.blocklist.contains(&token) {
        return Err(AppError::AuthError("Token blocked".to_string()));
    }

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;

    Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// In-handler permission check for paths where different methods carry
/// different requirements and a route layer cannot split them.
pub fn ensure_permissions(claims: &Claims, required: &[Permission]) -> Result<(), AppError> {
    let role = Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;

    if !permissions::authorize(role, required) {
        return Err(AppError::Forbidden("Permission denied".to_string()));
    }

    Ok(())
}

/// Axum Middleware: Authorization by capability.
///
/// Must be layered AFTER `auth_middleware`. Succeeds iff every required
/// permission is in the caller's role's statically configured set.
///
/// Used in routes as:
/// `middleware::from_fn(|req, next| require_permissions(req, next, &[Permission::ManageQuestions]))`
pub async fn require_permissions(
    req: Request<Body>,
    next: Next,
    required: &'static [Permission],
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;

    let role = Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;

    if !permissions::authorize(role, required) {
        return Err(AppError::Forbidden("Permission denied".to_string()));
    }

    Ok(next.run(req).await)
}

/// Axum Middleware: Authorization by literal role.
///
/// Must be layered AFTER `auth_middleware`. No hierarchy is computed - the
/// caller's role has to be one of the allowed roles.
pub async fn require_roles(
    req: Request<Body>,
    next: Next,
    allowed: &'static [Role],
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;

    let role = Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;

    if !allowed.contains(&role) {
        return Err(AppError::Forbidden("Role not authorized".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_with_sub(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            email: "user@example.com".to_string(),
            role: "student".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn user_id_parses_a_numeric_subject() {
        assert_eq!(claims_with_sub("42").user_id().unwrap(), 42);
    }

    #[test]
    fn user_id_rejects_a_malformed_subject() {
        assert!(claims_with_sub("not-a-number").user_id().is_err());
        assert!(claims_with_sub("").user_id().is_err());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let token = sign_jwt(7, "user@example.com", "admin", "secret", 3600).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn verify_fails_with_the_wrong_secret() {
        let token = sign_jwt(7, "user@example.com", "admin", "secret", 3600).unwrap();
        assert!(verify_jwt(&token, "other-secret").is_err());
    }
}
