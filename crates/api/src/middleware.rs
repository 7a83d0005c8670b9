use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use natours_auth::Role;
use natours_core::DomainError;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub const TOKEN_COOKIE: &str = "jwt";

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";
const USER_GONE: &str = "The user belonging to this token does no longer exist.";
const PASSWORD_CHANGED: &str = "User recently changed password! Please log in again.";

/// Authenticate the caller and attach a [`PrincipalContext`].
pub async fn protect(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers())
        .map(str::to_owned)
        .ok_or_else(|| DomainError::unauthenticated(NOT_LOGGED_IN))?;

    let claims = services.jwt.validate(&token, Utc::now()).map_err(|e| {
        tracing::debug!(reason = %e, "token rejected");
        e
    })?;

    let user = services
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| DomainError::unauthenticated(USER_GONE))?;

    if user.changed_password_after(claims.iat_ms) {
        tracing::debug!(user_id = %user.id, "token predates password change");
        return Err(DomainError::unauthenticated(PASSWORD_CHANGED).into());
    }

    req.extensions_mut().insert(PrincipalContext::new(user));
    Ok(next.run(req).await)
}

/// Only let callers whose role is in the whitelist through. Must run after
/// [`protect`].
pub async fn restrict_to(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .map(PrincipalContext::principal)
        .ok_or_else(|| DomainError::unauthenticated(NOT_LOGGED_IN))?;

    natours_auth::restrict_to(&principal, allowed).map_err(|e| {
        tracing::debug!(user_id = %principal.user_id, role = %principal.role, "role not allowed");
        e
    })?;

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <token>` first, then the `jwt` cookie.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|t| !t.is_empty())
}
