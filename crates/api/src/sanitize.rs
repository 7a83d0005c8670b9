//! Request body sanitization.
//!
//! Every JSON body is cleaned before a handler sees it: object keys that
//! look like store operators (`$gt`) or path traversals (`a.b`) are dropped,
//! and every string is run through an HTML sanitizer that keeps a small set
//! of formatting tags.

use std::collections::HashSet;
use std::sync::LazyLock;

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde_json::{Map, Value};

use crate::app::errors::ApiError;

const ALLOWED_TAGS: &[&str] = &[
    "b", "i", "em", "strong", "ul", "ol", "li", "p", "br", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote",
];

static CLEANER: LazyLock<ammonia::Builder<'static>> = LazyLock::new(|| {
    let mut builder = ammonia::Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect::<HashSet<_>>())
        .url_schemes(HashSet::from(["http", "https"]));
    builder
});

/// Clean a JSON value recursively.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(sanitize_object(map)),
        other => other,
    }
}

fn sanitize_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, _)| {
            let keep = !key.starts_with('$') && !key.contains('.');
            if !keep {
                tracing::debug!(key = %key, "dropped operator-like key from request body");
            }
            keep
        })
        .map(|(key, value)| (key, sanitize(value)))
        .collect()
}

fn clean_text(text: &str) -> String {
    // Plain text needs no pass through the HTML parser.
    if !text.contains(['<', '>', '&']) {
        return text.to_string();
    }
    CLEANER.clean(text).to_string()
}

/// `Json<Value>` with [`sanitize`] applied. Rejections become operational
/// API errors with the rejection's own status.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedJson(pub Value);

#[axum::async_trait]
impl<S> FromRequest<S> for SanitizedJson
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Rejected {
                status: rejection.status(),
                message: rejection.body_text(),
            })?;
        Ok(Self(sanitize(value)))
    }
}
