use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Extension, Path, RawQuery},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use serde_json::{Value, json};

use natours_auth::Role;
use natours_core::{DocumentId, DomainError};
use natours_infra::{Document, Repository, present};
use natours_query::FilterClause;
use natours_reviews::Review;
use natours_tours::{Tour, monthly_plan, tour_stats};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::routes::resource::{self, ApiResource, pick};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware;
use crate::sanitize::SanitizedJson;

const TOUR_EDITORS: &[Role] = &[Role::ADMIN, Role::LEAD_GUIDE];
const TOUR_PLANNERS: &[Role] = &[Role::ADMIN, Role::LEAD_GUIDE, Role::GUIDE];
const REVIEW_AUTHORS: &[Role] = &[Role::USER];

const GUIDE_FIELDS: &[&str] = &["id", "name", "email", "role", "photo"];

pub fn router(services: Arc<AppServices>) -> Router {
    let public = Router::new()
        .route("/", get(resource::list::<Tour>))
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(stats))
        .route("/:id", get(resource::get_one::<Tour>));

    let editors = Router::new()
        .route("/", post(resource::create::<Tour>))
        .route(
            "/:id",
            patch(resource::update::<Tour>).delete(resource::delete::<Tour>),
        )
        .route_layer(from_fn_with_state(TOUR_EDITORS, middleware::restrict_to));

    let planners = Router::new()
        .route("/monthly-plan/:year", get(plan))
        .route_layer(from_fn_with_state(TOUR_PLANNERS, middleware::restrict_to));

    let review_authors = Router::new()
        .route("/:id/reviews", post(create_review))
        .route_layer(from_fn_with_state(REVIEW_AUTHORS, middleware::restrict_to));

    let protected = Router::new()
        .route("/:id/reviews", get(list_reviews))
        .merge(editors)
        .merge(planners)
        .merge(review_authors)
        .route_layer(from_fn_with_state(services, middleware::protect));

    public.merge(protected)
}

#[async_trait]
impl ApiResource for Tour {
    fn repository(services: &AppServices) -> Arc<dyn Repository<Self>> {
        Arc::clone(&services.tours)
    }

    async fn populate(services: &AppServices, doc: &mut Document, detail: bool) -> ApiResult<()> {
        if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
            doc.insert("durationWeeks".into(), json!(duration / 7.0));
        }

        if let Some(Value::Array(ids)) = doc.get("guides").cloned() {
            let mut guides = Vec::with_capacity(ids.len());
            for id in ids.iter().filter_map(Value::as_str).filter_map(|s| s.parse().ok()) {
                if let Some(guide) = services.users.find_by_id(id).await? {
                    guides.push(pick(&present(&guide)?, GUIDE_FIELDS));
                }
            }
            doc.insert("guides".into(), Value::Array(guides));
        }

        if !detail {
            return Ok(());
        }
        let Some(tour_id) = doc
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DocumentId>().ok())
        else {
            return Ok(());
        };

        let reviews = services
            .reviews
            .find_many(vec![FilterClause::eq("tour", tour_id)])
            .await?;
        let mut embedded = Vec::with_capacity(reviews.len());
        for review in &reviews {
            let mut review_doc = present(review)?;
            Review::populate(services, &mut review_doc, false).await?;
            embedded.push(Value::Object(review_doc));
        }
        doc.insert("reviews".into(), Value::Array(embedded));
        Ok(())
    }
}

/// The five best-rated, cheapest tours with a short field list.
pub async fn top_five_cheap(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let mut params = resource::query_params::<Tour>(query.as_deref())?;
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("fields", "name,price,ratingsAverage,summary,difficulty");
    resource::list_scoped::<Tour>(&services, &params, Vec::new()).await
}

pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<Response> {
    let tours = services.tours.find_many(Vec::new()).await?;
    let stats = serde_json::to_value(tour_stats(&tours))
        .map_err(|e| DomainError::internal(e.to_string()))?;
    Ok(dto::success(StatusCode::OK, "stats", stats))
}

pub async fn plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(year): Path<String>,
) -> ApiResult<Response> {
    let year: i32 = year
        .parse()
        .map_err(|_| DomainError::cast("year", year.as_str()))?;
    let tours = services.tours.find_many(Vec::new()).await?;
    let plan = serde_json::to_value(monthly_plan(&tours, year))
        .map_err(|e| DomainError::internal(e.to_string()))?;
    Ok(dto::success(StatusCode::OK, "plan", plan))
}

pub async fn list_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let tour_id = DocumentId::parse_field("tour", &id)?;
    let params = resource::query_params::<Review>(query.as_deref())?;
    resource::list_scoped::<Review>(&services, &params, vec![FilterClause::eq("tour", tour_id)])
        .await
}

pub async fn create_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    SanitizedJson(body): SanitizedJson,
) -> ApiResult<Response> {
    let tour_id = DocumentId::parse_field("tour", &id)?;
    resource::create_in::<Review>(&services, &caller, Some(tour_id), body).await
}
