use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use natours_query::FilterClause;

use super::eval::{matches, sort_documents, unique_conflict};
use super::{Document, DocumentQuery, DocumentStore, StoreError};

/// In-memory document store for tests/dev.
///
/// Each collection is a `Vec` in insertion order, which is also the order
/// queries without a sort return.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Document>>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Document>>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(
        &self,
        collection: &str,
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<(), StoreError> {
        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(conflict) = unique_conflict(docs.iter(), &doc, unique) {
            return Err(conflict);
        }
        docs.push(doc);
        Ok(())
    }

    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let collections = self.read()?;
        let Some(docs) = collections.get(query.collection) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Document> = docs
            .iter()
            .filter(|doc| matches(doc, &query.clauses))
            .cloned()
            .collect();
        drop(collections);

        if let Some(spec) = &query.sort {
            sort_documents(&mut found, spec);
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches(doc, clauses)))
            .cloned())
    }

    async fn replace(
        &self,
        collection: &str,
        clauses: &[FilterClause],
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<bool, StoreError> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(position) = docs.iter().position(|d| matches(d, clauses)) else {
            return Ok(false);
        };

        let others = docs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .map(|(_, d)| d);
        if let Some(conflict) = unique_conflict(others, &doc, unique) {
            return Err(conflict);
        }
        docs[position] = doc;
        Ok(true)
    }

    async fn delete(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|d| matches(d, clauses))
            .map(|position| docs.remove(position)))
    }
}
