//! Typed repositories over the document store.
//!
//! One [`DocumentRepository`] per resource type; every lookup starts from the
//! resource's base scope, so a secret tour or a deactivated user is simply
//! "not there".

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use natours_core::{DocumentId, Resource};
use natours_query::FilterClause;

use crate::store::eval::project;
use crate::store::{Document, DocumentQuery, DocumentStore, StoreError};

#[async_trait]
pub trait Repository<R: Resource>: Send + Sync {
    /// Unexecuted query over the base scope, ready for translation.
    fn query(&self) -> DocumentQuery;

    /// Execute a composed query; documents come back projected for clients.
    async fn list(&self, query: DocumentQuery) -> Result<Vec<Document>, StoreError>;

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<R>, StoreError>;

    async fn find_one(&self, clauses: Vec<FilterClause>) -> Result<Option<R>, StoreError>;

    /// Every in-scope resource matching `clauses`, in insertion order.
    async fn find_many(&self, clauses: Vec<FilterClause>) -> Result<Vec<R>, StoreError>;

    async fn create(&self, resource: &R) -> Result<(), StoreError>;

    /// Overwrite the stored resource with the same id. `false` when it no
    /// longer exists (or fell out of scope).
    async fn replace(&self, resource: &R) -> Result<bool, StoreError>;

    async fn delete(&self, id: DocumentId) -> Result<Option<R>, StoreError>;
}

pub struct DocumentRepository<R> {
    store: Arc<dyn DocumentStore>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for DocumentRepository<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> DocumentRepository<R> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _resource: PhantomData,
        }
    }

    fn scoped(clauses: Vec<FilterClause>) -> Vec<FilterClause> {
        let mut scope = R::base_scope();
        scope.extend(clauses);
        scope
    }

    fn by_id(id: DocumentId) -> Vec<FilterClause> {
        Self::scoped(vec![FilterClause::eq("id", id)])
    }
}

#[async_trait]
impl<R: Resource> Repository<R> for DocumentRepository<R> {
    fn query(&self) -> DocumentQuery {
        DocumentQuery::for_resource::<R>()
    }

    async fn list(&self, query: DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let docs = self.store.find(&query).await?;
        Ok(docs
            .into_iter()
            .map(|doc| {
                project(
                    doc,
                    &query.projection,
                    query.internal_fields,
                    query.private_fields,
                )
            })
            .collect())
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<R>, StoreError> {
        self.store
            .find_one(R::COLLECTION, &Self::by_id(id))
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_one(&self, clauses: Vec<FilterClause>) -> Result<Option<R>, StoreError> {
        self.store
            .find_one(R::COLLECTION, &Self::scoped(clauses))
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_many(&self, clauses: Vec<FilterClause>) -> Result<Vec<R>, StoreError> {
        let query = DocumentQuery {
            clauses: Self::scoped(clauses),
            ..DocumentQuery::new(R::COLLECTION)
        };
        self.store.find(&query).await?.into_iter().map(decode).collect()
    }

    async fn create(&self, resource: &R) -> Result<(), StoreError> {
        self.store
            .insert(R::COLLECTION, encode(resource)?, R::UNIQUE_INDEXES)
            .await
    }

    async fn replace(&self, resource: &R) -> Result<bool, StoreError> {
        self.store
            .replace(
                R::COLLECTION,
                &Self::by_id(resource.id()),
                encode(resource)?,
                R::UNIQUE_INDEXES,
            )
            .await
    }

    async fn delete(&self, id: DocumentId) -> Result<Option<R>, StoreError> {
        self.store
            .delete(R::COLLECTION, &Self::by_id(id))
            .await?
            .map(decode)
            .transpose()
    }
}

fn encode<R: Resource>(resource: &R) -> Result<Document, StoreError> {
    match serde_json::to_value(resource) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(StoreError::Malformed(format!(
            "{} did not serialize to an object: {other}",
            R::NAME
        ))),
        Err(e) => Err(StoreError::Malformed(e.to_string())),
    }
}

fn decode<R: Resource>(doc: Document) -> Result<R, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// The client-facing form of a single resource: internal and private fields
/// removed.
pub fn present<R: Resource>(resource: &R) -> Result<Document, StoreError> {
    Ok(project(
        encode(resource)?,
        &natours_query::Projection::Default,
        R::INTERNAL_FIELDS,
        R::PRIVATE_FIELDS,
    ))
}
