use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Extension,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};

use natours_auth::{Role, User};
use natours_core::{DomainError, Resource, decode_body};
use natours_infra::{Repository, present};

use crate::app::dto::{self, UpdateMeRequest};
use crate::app::errors::ApiResult;
use crate::app::routes::auth;
use crate::app::routes::resource::{self, ApiResource};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware;
use crate::sanitize::SanitizedJson;

const ADMINS: &[Role] = &[Role::ADMIN];

pub fn router(services: Arc<AppServices>) -> Router {
    let public = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/:token", patch(auth::reset_password));

    let admin = Router::new()
        .route("/", get(resource::list::<User>).post(resource::create::<User>))
        .route(
            "/:id",
            get(resource::get_one::<User>)
                .patch(resource::update::<User>)
                .delete(resource::delete::<User>),
        )
        .route_layer(from_fn_with_state(ADMINS, middleware::restrict_to));

    let account = Router::new()
        .route("/updatePassword", patch(auth::update_password))
        .route("/me", get(me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", delete(delete_me))
        .merge(admin)
        .route_layer(from_fn_with_state(services, middleware::protect));

    public.merge(account)
}

#[async_trait]
impl ApiResource for User {
    fn repository(services: &AppServices) -> Arc<dyn Repository<Self>> {
        Arc::clone(&services.users)
    }
}

pub async fn me(Extension(caller): Extension<PrincipalContext>) -> ApiResult<Response> {
    Ok(dto::success(StatusCode::OK, "data", present(caller.user())?))
}

/// Change name or email. Password changes go through `/updatePassword`.
pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let req: UpdateMeRequest = decode_body(body)?;
    if req.password.is_some() || req.confirm_password.is_some() {
        return Err(DomainError::bad_request(
            "This route is not for password updates. Please use /updatePassword.",
        )
        .into());
    }

    let mut user = caller.into_user();
    user.update_profile(req.name, req.email)?;
    if !services.users.replace(&user).await? {
        return Err(DomainError::not_found(User::NAME).into());
    }

    Ok(dto::success(StatusCode::OK, "user", present(&user)?))
}

/// Soft delete: the account stays stored but drops out of every query.
pub async fn delete_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
) -> ApiResult<Response> {
    let mut user = caller.into_user();
    user.deactivate();
    services.users.replace(&user).await?;
    tracing::info!(user_id = %user.id, "account deactivated");
    Ok(dto::no_content())
}
