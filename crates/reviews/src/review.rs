use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use natours_core::{DocumentId, DomainError, DomainResult, Resource, Violations};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: DocumentId,
    pub review: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(with = "natours_core::timestamp")]
    pub created_at: DateTime<Utc>,
    pub tour: DocumentId,
    pub user: DocumentId,
}

/// Create body. `tour` and `user` may be filled in from the route and the
/// caller before the draft is built.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewDraft {
    pub review: Option<String>,
    pub rating: Option<f64>,
    pub tour: Option<String>,
    pub user: Option<String>,
}

/// Update body: the text and the rating. A review never moves to another
/// tour or author.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
    pub review: Option<String>,
    pub rating: Option<f64>,
}

impl Resource for Review {
    type Draft = ReviewDraft;
    type Patch = ReviewPatch;

    const COLLECTION: &'static str = "reviews";
    const NAME: &'static str = "review";
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[&["tour", "user"]];
    const NUMERIC_FIELDS: &'static [&'static str] = &["rating"];

    fn id(&self) -> DocumentId {
        self.id
    }

    fn create(draft: ReviewDraft, id: DocumentId, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut v = Violations::new();
        let text = v.require(
            draft.review.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            "Review cannot be empty",
        );
        let tour = v.require(draft.tour, "Review must belong to a tour.");
        let user = v.require(draft.user, "Review must belong to a user.");
        v.finish()?;

        let (Some(text), Some(tour), Some(user)) = (text, tour, user) else {
            return Err(DomainError::internal("review draft passed validation with missing fields"));
        };

        let review = Self {
            id,
            review: text,
            rating: draft.rating,
            created_at: now,
            tour: DocumentId::parse_field("tour", &tour)?,
            user: DocumentId::parse_field("user", &user)?,
        };
        review.validate()?;
        Ok(review)
    }

    fn apply_patch(&mut self, patch: ReviewPatch, _now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(text) = patch.review {
            self.review = text.trim().to_string();
        }
        if patch.rating.is_some() {
            self.rating = patch.rating;
        }
        self.validate()
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(!self.review.is_empty(), "Review cannot be empty");
        if let Some(rating) = self.rating {
            v.check(rating >= 1.0, "Rating must be above 1.0");
            v.check(rating <= 5.0, "Rating must be below 5.0");
        }
        v.finish()
    }
}
