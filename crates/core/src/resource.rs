//! The interface every stored resource implements.
//!
//! Generic handlers and repositories only ever see a resource through this
//! trait: how to build one from a request body, how to patch it, what makes it
//! valid, and a few static facts about how it is stored.

use chrono::{DateTime, Utc};
use natours_query::FilterClause;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DomainError, DomainResult};
use crate::id::DocumentId;

pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Request body accepted on create.
    type Draft: DeserializeOwned + Send;
    /// Request body accepted on update. Every field is optional.
    type Patch: DeserializeOwned + Send;

    /// Store collection name.
    const COLLECTION: &'static str;
    /// Singular name used in messages (`No tour found with that ID`).
    const NAME: &'static str;
    /// Ordering when the query names none. `None` keeps insertion order.
    const DEFAULT_SORT: Option<&'static str> = Some("-createdAt");
    /// Returned only when a projection asks for them by name.
    const INTERNAL_FIELDS: &'static [&'static str] = &[];
    /// Never returned.
    const PRIVATE_FIELDS: &'static [&'static str] = &[];
    /// Field sets whose combined values must be unique in the collection.
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[];
    /// Filter fields that may be given more than once in a query string.
    /// Any other filter field keeps only its last value per operator.
    const REPEATABLE_FILTERS: &'static [&'static str] = &[];
    /// Numeric fields. A query value for one of them must parse as a number.
    const NUMERIC_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> DocumentId;

    /// Build and validate a new resource.
    fn create(draft: Self::Draft, id: DocumentId, now: DateTime<Utc>) -> DomainResult<Self>;

    /// Apply `patch` and re-validate the result.
    fn apply_patch(&mut self, patch: Self::Patch, now: DateTime<Utc>) -> DomainResult<()>;

    fn validate(&self) -> DomainResult<()>;

    /// Clauses every query on this resource starts from.
    fn base_scope() -> Vec<FilterClause> {
        Vec::new()
    }
}

/// Decode a request body into a draft or patch.
pub fn decode_body<T: DeserializeOwned>(body: serde_json::Value) -> DomainResult<T> {
    serde_json::from_value(body).map_err(|e| DomainError::validation(e.to_string()))
}
