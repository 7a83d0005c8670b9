//! Document store seam.
//!
//! Resources are stored as JSON objects (`Document`) in named collections.
//! A [`DocumentQuery`] is the store-side implementation of
//! [`QueryBuilder`]: the query translator composes it, a [`DocumentStore`]
//! executes it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use natours_core::Resource;
use natours_query::{FilterClause, PageWindow, Projection, QueryBuilder, SortSpec};

pub mod eval;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDocumentStore;

/// A stored resource in its JSON form.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique index already holds this value.
    #[error("duplicate value {value} for unique field {field}")]
    Duplicate { field: String, value: String },

    /// A document could not be converted to or from its resource type.
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// An unexecuted query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: &'static str,
    /// Conjunction of the base scope and every requested filter.
    pub clauses: Vec<FilterClause>,
    pub sort: Option<SortSpec>,
    /// Used when the request names no sort. `None` keeps insertion order.
    pub default_sort: Option<SortSpec>,
    /// Applied after fetching, never by the store.
    pub projection: Projection,
    pub internal_fields: &'static [&'static str],
    pub private_fields: &'static [&'static str],
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocumentQuery {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            clauses: Vec::new(),
            sort: None,
            default_sort: None,
            projection: Projection::Default,
            internal_fields: &[],
            private_fields: &[],
            skip: 0,
            limit: None,
        }
    }

    /// Everything of `R` its base scope allows, in `R`'s default order.
    pub fn for_resource<R: Resource>() -> Self {
        Self {
            clauses: R::base_scope(),
            default_sort: R::DEFAULT_SORT.and_then(SortSpec::parse),
            internal_fields: R::INTERNAL_FIELDS,
            private_fields: R::PRIVATE_FIELDS,
            ..Self::new(R::COLLECTION)
        }
    }

    /// Narrow the query before translation (e.g. reviews of one tour).
    pub fn scoped(mut self, clause: FilterClause) -> Self {
        self.clauses.push(clause);
        self
    }
}

impl QueryBuilder for DocumentQuery {
    fn filter(mut self, clauses: Vec<FilterClause>) -> Self {
        self.clauses.extend(clauses);
        self
    }

    fn sort(mut self, spec: SortSpec) -> Self {
        self.sort = Some(spec);
        self
    }

    fn default_sort(mut self) -> Self {
        self.sort = self.default_sort.clone();
        self
    }

    fn project(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    fn paginate(mut self, window: PageWindow) -> Self {
        self.skip = window.skip();
        self.limit = Some(window.limit());
        self
    }
}

/// Persistence for JSON documents.
///
/// Unique indexes are passed per call as lists of field sets; a write whose
/// values for every field of a set equal another document's fails with
/// [`StoreError::Duplicate`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(
        &self,
        collection: &str,
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<(), StoreError>;

    /// Filter, sort and paginate. Projection is left to the caller.
    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError>;

    /// Replace the first document matching `clauses`. `false` when none does.
    async fn replace(
        &self,
        collection: &str,
        clauses: &[FilterClause],
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<bool, StoreError>;

    /// Remove the first document matching `clauses` and return it.
    async fn delete(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn insert(
        &self,
        collection: &str,
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<(), StoreError> {
        (**self).insert(collection, doc, unique).await
    }

    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        (**self).find(query).await
    }

    async fn find_one(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        (**self).find_one(collection, clauses).await
    }

    async fn replace(
        &self,
        collection: &str,
        clauses: &[FilterClause],
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<bool, StoreError> {
        (**self).replace(collection, clauses, doc, unique).await
    }

    async fn delete(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        (**self).delete(collection, clauses).await
    }
}
