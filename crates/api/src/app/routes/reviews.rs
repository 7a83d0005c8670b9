use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use serde_json::{Map, Value};

use natours_auth::Role;
use natours_core::{DocumentId, DomainError, Resource};
use natours_infra::{Document, Repository, present};
use natours_query::FilterClause;
use natours_reviews::{RatingSummary, Review};
use natours_tours::Tour;

use crate::app::errors::ApiResult;
use crate::app::routes::resource::{self, ApiResource, pick};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware;

const REVIEW_AUTHORS: &[Role] = &[Role::USER];
const REVIEW_EDITORS: &[Role] = &[Role::USER, Role::ADMIN];

const AUTHOR_FIELDS: &[&str] = &["id", "name", "photo"];

/// Every review route requires a logged-in caller.
pub fn router(services: Arc<AppServices>) -> Router {
    let authors = Router::new()
        .route("/", post(resource::create::<Review>))
        .route_layer(from_fn_with_state(REVIEW_AUTHORS, middleware::restrict_to));

    let editors = Router::new()
        .route(
            "/:id",
            patch(resource::update::<Review>).delete(resource::delete::<Review>),
        )
        .route_layer(from_fn_with_state(REVIEW_EDITORS, middleware::restrict_to));

    Router::new()
        .route("/", get(resource::list::<Review>))
        .route("/:id", get(resource::get_one::<Review>))
        .merge(authors)
        .merge(editors)
        .route_layer(from_fn_with_state(services, middleware::protect))
}

#[async_trait]
impl ApiResource for Review {
    fn repository(services: &AppServices) -> Arc<dyn Repository<Self>> {
        Arc::clone(&services.reviews)
    }

    /// The tour comes from the nested route when there is one, otherwise
    /// from the body; the author is always the caller.
    async fn prepare_draft(
        services: &AppServices,
        body: &mut Map<String, Value>,
        caller: &PrincipalContext,
        parent: Option<DocumentId>,
    ) -> ApiResult<()> {
        if let Some(tour) = parent {
            body.insert("tour".into(), tour.into());
        }
        body.insert("user".into(), caller.user_id().into());

        let tour = match body.get("tour").and_then(Value::as_str) {
            Some(raw) => DocumentId::parse_field("tour", raw)?,
            None => return Ok(()),
        };
        if services.tours.find_by_id(tour).await?.is_none() {
            return Err(DomainError::not_found(Tour::NAME).into());
        }
        Ok(())
    }

    async fn after_write(services: &AppServices, review: &Self) -> ApiResult<()> {
        recompute_ratings(services, review.tour).await
    }

    async fn populate(services: &AppServices, doc: &mut Document, _detail: bool) -> ApiResult<()> {
        let Some(user_id) = doc
            .get("user")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DocumentId>().ok())
        else {
            return Ok(());
        };

        let author = match services.users.find_by_id(user_id).await? {
            Some(user) => pick(&present(&user)?, AUTHOR_FIELDS),
            None => Value::Null,
        };
        doc.insert("user".into(), author);
        Ok(())
    }
}

/// Rewrite the tour's rating aggregates from its current reviews.
pub async fn recompute_ratings(services: &AppServices, tour_id: DocumentId) -> ApiResult<()> {
    let reviews = services
        .reviews
        .find_many(vec![FilterClause::eq("tour", tour_id)])
        .await?;

    let Some(mut tour) = services.tours.find_by_id(tour_id).await? else {
        tracing::debug!(%tour_id, "rating recompute skipped, tour not visible");
        return Ok(());
    };

    let summary = RatingSummary::from_reviews(&reviews);
    summary.apply_to(&mut tour);
    services.tours.replace(&tour).await?;
    tracing::debug!(
        %tour_id,
        quantity = summary.quantity,
        average = summary.average,
        "tour ratings recomputed"
    );
    Ok(())
}
