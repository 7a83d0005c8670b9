//! One error type for every handler and middleware, and its HTTP rendering.
//!
//! Operational errors (bad input, missing documents, failed auth) go out with
//! their own status and message. Anything else is logged and rendered as a
//! generic 500 so internals never reach the client.

use axum::extract::{OriginalUri, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use natours_auth::{AuthzError, TokenError, TokenValidationError};
use natours_core::DomainError;
use natours_infra::{MailError, StoreError};
use natours_query::QueryParamsError;

const GENERIC_MESSAGE: &str = "Something went wrong.";
const MAIL_FAILED: &str = "There was an error sending the email. Try again later.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenValidationError),

    #[error(transparent)]
    Signing(#[from] TokenError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Query(#[from] QueryParamsError),

    /// An extractor refused the request before the handler ran (bad JSON,
    /// body over the size limit).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Can't find {0} on this server.")]
    RouteNotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Domain(e) => match e {
                DomainError::Validation(_)
                | DomainError::Cast { .. }
                | DomainError::Duplicate { .. }
                | DomainError::BadRequest(_) => StatusCode::BAD_REQUEST,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(StoreError::Duplicate { .. }) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Signing(_) | Self::Mail(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::Authz(_) => StatusCode::FORBIDDEN,
            Self::Query(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Whether the message is meant for the client.
    pub fn is_operational(&self) -> bool {
        match self {
            Self::Domain(e) => e.is_operational(),
            Self::Store(StoreError::Duplicate { .. }) => true,
            Self::Store(_) | Self::Signing(_) => false,
            _ => true,
        }
    }

    /// Message as the client sees it in production.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(StoreError::Duplicate { field, value }) => {
                DomainError::duplicate(field.as_str(), value.as_str()).to_string()
            }
            Self::Mail(_) => MAIL_FAILED.to_string(),
            Self::Query(e) => DomainError::validation(e.to_string()).to_string(),
            _ if !self.is_operational() => GENERIC_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Store(_) => "store",
            Self::Token(_) => "token",
            Self::Signing(_) => "signing",
            Self::Authz(_) => "authorization",
            Self::Mail(_) => "mail",
            Self::Query(_) => "query",
            Self::Rejected { .. } => "rejected",
            Self::RouteNotFound(_) => "route",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.is_operational() || matches!(self, Self::Mail(_)) {
            tracing::error!(error = %self, detail = ?self, "request failed");
        }

        let report = ErrorReport {
            status,
            kind: self.kind(),
            message: if self.is_operational() {
                self.public_message()
            } else {
                self.to_string()
            },
            detail: format!("{self:?}"),
        };

        let mut response = json_error(status, self.public_message());
        response.extensions_mut().insert(report);
        response
    }
}

/// `{status: "fail" | "error", message}`; `fail` for client errors.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "status": status_label(status),
            "message": message.into(),
        })),
    )
        .into_response()
}

fn status_label(status: StatusCode) -> &'static str {
    if status.is_client_error() { "fail" } else { "error" }
}

/// Full error description carried on the response for development builds.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub detail: String,
}

/// Development only: replace the client-safe error body with the full
/// report.
pub async fn expose_error_detail(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    (
        report.status,
        axum::Json(json!({
            "status": status_label(report.status),
            "message": report.message,
            "error": report.kind,
            "detail": report.detail,
        })),
    )
        .into_response()
}

pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_their_status() {
        let cases = [
            (DomainError::validation("Review cannot be empty"), StatusCode::BAD_REQUEST),
            (DomainError::cast("id", "abc"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("tour"), StatusCode::NOT_FOUND),
            (DomainError::unauthenticated("no"), StatusCode::UNAUTHORIZED),
            (DomainError::forbidden("no"), StatusCode::FORBIDDEN),
            (DomainError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn duplicate_store_error_is_operational() {
        let err = ApiError::from(StoreError::Duplicate {
            field: "name".into(),
            value: "The Forest Hiker".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Duplicate field value: \"The Forest Hiker\". Please use another value."
        );
    }

    #[test]
    fn internal_errors_are_hidden() {
        let err = ApiError::from(StoreError::Backend("connection reset".into()));
        assert!(!err.is_operational());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Something went wrong.");

        let err = ApiError::from(DomainError::internal("invariant broken"));
        assert_eq!(err.public_message(), "Something went wrong.");
    }

    #[test]
    fn token_and_mail_errors_keep_their_messages() {
        let err = ApiError::from(TokenValidationError::Expired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), "Your token has expired. Please log in again");

        let err = ApiError::from(MailError::Transport("smtp down".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), MAIL_FAILED);
    }

    #[test]
    fn response_carries_report_and_label() {
        let response = ApiError::RouteNotFound("/api/v2/nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.message, "Can't find /api/v2/nope on this server.");
        assert_eq!(status_label(StatusCode::INTERNAL_SERVER_ERROR), "error");
        assert_eq!(status_label(StatusCode::NOT_FOUND), "fail");
    }
}
