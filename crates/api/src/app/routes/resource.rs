//! Generic CRUD handlers.
//!
//! Each handler is written once against [`ApiResource`] and instantiated per
//! resource type in the route tables (`get(resource::list::<Tour>)`).
//! Resource-specific behaviour lives in the three hooks: preparing a create
//! body, the post-commit step after a write, and embedding related
//! documents into a response.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Extension, Path, RawQuery};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Map, Value};

use natours_core::{DocumentId, DomainError, Resource, decode_body};
use natours_infra::{Document, Repository, present};
use natours_query::{FilterClause, QueryParams, translate};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::sanitize::SanitizedJson;

/// HTTP-side behaviour of a stored resource.
#[async_trait]
pub trait ApiResource: Resource {
    fn repository(services: &AppServices) -> Arc<dyn Repository<Self>>;

    /// Fill in a create body before it is decoded. `parent` is the id of the
    /// enclosing resource on nested routes.
    async fn prepare_draft(
        _services: &AppServices,
        _body: &mut Map<String, Value>,
        _caller: &PrincipalContext,
        _parent: Option<DocumentId>,
    ) -> ApiResult<()> {
        Ok(())
    }

    /// Post-commit step after a create, update or delete of `resource`.
    async fn after_write(_services: &AppServices, _resource: &Self) -> ApiResult<()> {
        Ok(())
    }

    /// Embed related documents. `detail` is set for single-document reads.
    async fn populate(_services: &AppServices, _doc: &mut Document, _detail: bool) -> ApiResult<()> {
        Ok(())
    }
}

pub async fn list<R: ApiResource>(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let params = query_params::<R>(query.as_deref())?;
    list_scoped::<R>(&services, &params, Vec::new()).await
}

/// Parse a raw query string for `R`. Filter values on numeric fields must
/// be numbers (`price[gte]=abc` is a cast error).
pub fn query_params<R: Resource>(raw: Option<&str>) -> ApiResult<QueryParams> {
    let params = QueryParams::parse_with(raw.unwrap_or_default(), R::REPEATABLE_FILTERS)?;
    for (field, ops) in params.filters() {
        if !R::NUMERIC_FIELDS.contains(&field) {
            continue;
        }
        if let Some((_, value)) = ops.iter().find(|(_, v)| v.trim().parse::<f64>().is_err()) {
            return Err(DomainError::cast(field, value.as_str()).into());
        }
    }
    Ok(params)
}

/// List with extra clauses applied before translation.
pub async fn list_scoped<R: ApiResource>(
    services: &AppServices,
    params: &QueryParams,
    scope: Vec<FilterClause>,
) -> ApiResult<Response> {
    let repo = R::repository(services);
    let base = scope.into_iter().fold(repo.query(), |q, clause| q.scoped(clause));
    let mut docs = repo.list(translate(base, params)).await?;
    for doc in &mut docs {
        R::populate(services, doc, false).await?;
    }
    Ok(dto::list("data", docs.into_iter().map(Value::Object).collect()))
}

pub async fn get_one<R: ApiResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let resource = fetch::<R>(&services, &id).await?;
    render_one::<R>(&services, &resource, StatusCode::OK).await
}

pub async fn create<R: ApiResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    create_in::<R>(&services, &caller, None, body).await
}

/// Create under an optional parent (nested routes).
pub async fn create_in<R: ApiResource>(
    services: &AppServices,
    caller: &PrincipalContext,
    parent: Option<DocumentId>,
    body: Value,
) -> ApiResult<Response> {
    let mut body = into_object(body)?;
    R::prepare_draft(services, &mut body, caller, parent).await?;
    let draft: R::Draft = decode_body(Value::Object(body))?;

    let resource = R::create(draft, DocumentId::new(), Utc::now())?;
    R::repository(services).create(&resource).await?;
    R::after_write(services, &resource).await?;
    tracing::info!(collection = R::COLLECTION, id = %resource.id(), "created");

    render_one::<R>(services, &resource, StatusCode::CREATED).await
}

pub async fn update<R: ApiResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let mut resource = fetch::<R>(&services, &id).await?;
    let patch: R::Patch = decode_body(body)?;
    resource.apply_patch(patch, Utc::now())?;

    if !R::repository(&services).replace(&resource).await? {
        return Err(DomainError::not_found(R::NAME).into());
    }
    R::after_write(&services, &resource).await?;
    tracing::info!(collection = R::COLLECTION, id = %resource.id(), "updated");

    render_one::<R>(&services, &resource, StatusCode::OK).await
}

pub async fn delete<R: ApiResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: DocumentId = id.parse()?;
    let removed = R::repository(&services)
        .delete(id)
        .await?
        .ok_or_else(|| DomainError::not_found(R::NAME))?;
    R::after_write(&services, &removed).await?;
    tracing::info!(collection = R::COLLECTION, %id, "deleted");

    Ok(dto::no_content())
}

/// Load by a raw path id; malformed ids are cast errors, unknown ids 404.
pub async fn fetch<R: ApiResource>(services: &AppServices, raw_id: &str) -> ApiResult<R> {
    let id: DocumentId = raw_id.parse()?;
    R::repository(services)
        .find_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found(R::NAME).into())
}

async fn render_one<R: ApiResource>(
    services: &AppServices,
    resource: &R,
    status: StatusCode,
) -> ApiResult<Response> {
    let mut doc = present(resource)?;
    R::populate(services, &mut doc, true).await?;
    Ok(dto::success(status, "data", doc))
}

fn into_object(body: Value) -> ApiResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(DomainError::validation("Request body must be a JSON object").into()),
    }
}

/// Keep only `keys` of a presented document (for embedded references).
pub fn pick(doc: &Document, keys: &[&str]) -> Value {
    Value::Object(
        doc.iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}
