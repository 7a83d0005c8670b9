use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    #[serde(alias = "passwordConfirm")]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password_current: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "passwordConfirm")]
    pub confirm_password: Option<String>,
}

/// Self-service profile update. Password fields are only read to reject
/// them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "passwordConfirm")]
    pub confirm_password: Option<String>,
}

// -------------------------
// Response envelopes
// -------------------------

/// `{status: "success", data: {<key>: value}}`
pub fn success(status: StatusCode, key: &str, value: impl Into<Value>) -> Response {
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), value.into());
    (status, Json(json!({ "status": "success", "data": data }))).into_response()
}

/// `{status: "success", results, data: {<key>: [...]}}`
pub fn list(key: &str, items: Vec<Value>) -> Response {
    let results = items.len();
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), Value::Array(items));
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "results": results, "data": data })),
    )
        .into_response()
}

/// `{status: "success", message}` for actions with nothing to return.
pub fn message(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": message })),
    )
        .into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
