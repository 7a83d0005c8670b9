//! Credential endpoints: signup, login, password reset and change.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use natours_auth::user::normalize_email;
use natours_auth::{NewUser, RESET_TOKEN_TTL_MINUTES, User, reset};
use natours_core::{DocumentId, DomainError, Resource, decode_body};
use natours_infra::{EmailMessage, present};
use natours_query::FilterClause;

use crate::app::dto::{
    self, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, UpdatePasswordRequest,
};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::TOKEN_COOKIE;
use crate::sanitize::SanitizedJson;

/// Issue a token for `user`: set it as a cookie and return it in the body.
pub fn send_token(services: &AppServices, user: &User, status: StatusCode) -> ApiResult<Response> {
    let token = services.tokens.issue(user.id, Utc::now())?;
    let cookie = session_cookie(services, &token);
    let body = json!({
        "status": "success",
        "token": token,
        "data": { "user": present(user)? },
    });
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

fn session_cookie(services: &AppServices, token: &str) -> String {
    let config = &services.config;
    let secure = if config.environment.is_production() { "; Secure" } else { "" };
    format!(
        "{TOKEN_COOKIE}={token}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax{secure}",
        config.jwt_cookie_ttl.num_seconds()
    )
}

/// Open registration. The role is always `user`; other roles are granted by
/// an administrator.
pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let mut draft: NewUser = decode_body(body)?;
    draft.role = None;

    let user = User::create(draft, DocumentId::new(), Utc::now())?;
    services.users.create(&user).await?;
    tracing::info!(user_id = %user.id, "user signed up");

    send_token(&services, &user, StatusCode::CREATED)
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let req: LoginRequest = decode_body(body)?;
    let (Some(email), Some(password)) = (
        req.email.filter(|e| !e.trim().is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(DomainError::bad_request("Please provide email and password").into());
    };

    let user = services
        .users
        .find_one(vec![FilterClause::eq("email", normalize_email(&email))])
        .await?;

    match user {
        Some(user) if user.correct_password(&password) => {
            tracing::info!(user_id = %user.id, "user logged in");
            send_token(&services, &user, StatusCode::OK)
        }
        _ => {
            tracing::debug!("login rejected");
            Err(DomainError::unauthenticated("Incorrect email or password").into())
        }
    }
}

/// Email a single-use reset link. When delivery fails the token is
/// withdrawn again.
pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let req: ForgotPasswordRequest = decode_body(body)?;
    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();

    let mut user = services
        .users
        .find_one(vec![FilterClause::eq("email", email)])
        .await?
        .ok_or_else(|| DomainError::NotFound("There is no user with that email address".into()))?;

    let plain = user.create_password_reset_token(Utc::now());
    services.users.replace(&user).await?;

    let scheme = if services.config.environment.is_production() { "https" } else { "http" };
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let reset_url = format!("{scheme}://{host}/api/v1/users/resetPassword/{plain}");

    let message = EmailMessage {
        to: user.email.clone(),
        subject: format!("Your password reset token (valid for {RESET_TOKEN_TTL_MINUTES} min)"),
        body: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             confirmPassword to: {reset_url}\nIf you didn't forget your password, please ignore this email."
        ),
    };

    if let Err(e) = services.mailer.send(message).await {
        user.clear_password_reset();
        services.users.replace(&user).await?;
        return Err(e.into());
    }

    tracing::info!(user_id = %user.id, "password reset token sent");
    Ok(dto::message("Token sent to email!"))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let req: ResetPasswordRequest = decode_body(body)?;
    let now = Utc::now();

    let mut user = services
        .users
        .find_one(vec![FilterClause::eq("passwordResetToken", reset::digest(&token))])
        .await?
        .filter(|user| user.reset_token_valid(now))
        .ok_or_else(|| DomainError::bad_request("Token is invalid or has expired."))?;

    user.set_password(req.password, req.confirm_password, now)?;
    services.users.replace(&user).await?;
    tracing::info!(user_id = %user.id, "password reset");

    send_token(&services, &user, StatusCode::OK)
}

pub async fn update_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let req: UpdatePasswordRequest = decode_body(body)?;
    let mut user = caller.into_user();

    let current_ok = req
        .password_current
        .as_deref()
        .is_some_and(|p| user.correct_password(p));
    if !current_ok {
        return Err(DomainError::unauthenticated("Your current password is wrong.").into());
    }

    user.set_password(req.password, req.confirm_password, Utc::now())?;
    if !services.users.replace(&user).await? {
        return Err(DomainError::not_found(User::NAME).into());
    }
    tracing::info!(user_id = %user.id, "password changed");

    send_token(&services, &user, StatusCode::OK)
}
