//! In-memory storage implementation for record stores.
//!
//! Collections are kept as insertion-ordered lists of BSON documents behind one async-aware
//! read-write lock. Every backend call takes the lock once, so each call is atomic with respect
//! to the others, including [`StoreBackend::insert_or_merge`].

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};
use tracing::{debug, warn};

use recordlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome, UpsertOutcome},
    change::UpdateBundle,
    error::{RecordStoreError, RecordStoreResult},
    id::{ID_FIELD, INTERNAL_ID_FIELD, RecordId},
    index::IndexSpec,
    path::{get_path, set_path},
    query::{Expr, Query, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, compare_values, resolve, same_identity};

/// Documents and secondary indexes of one collection.
#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    fn position_of_id(&self, id: &Bson) -> Option<usize> {
        self.documents.iter().position(|document| {
            document
                .get(INTERNAL_ID_FIELD)
                .is_some_and(|stored| same_identity(stored, id))
        })
    }

    fn position_matching(&self, filter: &Expr) -> RecordStoreResult<Option<usize>> {
        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::matches(document, Some(filter))? {
                return Ok(Some(position));
            }
        }

        Ok(None)
    }

    /// Checks the unique indexes for `candidate`, ignoring the document at `skip`.
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> RecordStoreResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, document)| same_keys(index, document, candidate));

            if clash {
                return Err(RecordStoreError::Backend(format!(
                    "Duplicate key for unique index {}",
                    index.name()
                )));
            }
        }

        Ok(())
    }

    fn insert(&mut self, collection: &str, document: Document) -> RecordStoreResult<Bson> {
        let (id, document) = match document.get(INTERNAL_ID_FIELD) {
            Some(id) => (id.clone(), document),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut identified = Document::new();
                identified.insert(INTERNAL_ID_FIELD, id.clone());

                for (key, value) in document {
                    identified.insert(key, value);
                }

                (id, identified)
            }
        };

        if self.position_of_id(&id).is_some() {
            return Err(RecordStoreError::DuplicateIdentity(
                RecordId::from_bson(&id).map_or_else(|| id.to_string(), |id| id.to_string()),
                collection.to_string(),
            ));
        }

        self.check_unique(&document, None)?;
        self.documents.push(document);

        Ok(id)
    }

    fn merge(&mut self, position: usize, update: &UpdateBundle) -> RecordStoreResult<bool> {
        let mut merged = self.documents[position].clone();

        if !update.apply_to(&mut merged)? {
            return Ok(false);
        }

        self.check_unique(&merged, Some(position))?;
        self.documents[position] = merged;

        Ok(true)
    }
}

fn same_keys(index: &IndexSpec, left: &Document, right: &Document) -> bool {
    index.keys.iter().all(|(field, _)| {
        let left = resolve(left, field);
        let right = resolve(right, field);
        let left = left.as_deref().map(Comparable::from).unwrap_or(Comparable::Null);
        let right = right.as_deref().map(Comparable::from).unwrap_or(Comparable::Null);

        left == right
    })
}

fn project(document: &Document, fields: &[String]) -> RecordStoreResult<Document> {
    let mut projected = Document::new();

    if let Some(id) = document.get(INTERNAL_ID_FIELD) {
        projected.insert(INTERNAL_ID_FIELD, id.clone());
    }

    for field in fields {
        if field == ID_FIELD || field == INTERNAL_ID_FIELD {
            continue;
        }

        if let Some(value) = get_path(document, field) {
            set_path(&mut projected, field, value.clone())?;
        }
    }

    Ok(projected)
}

/// Thread-safe in-memory record storage backend.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state; clones share the same
/// data and the same connection state, so shutting one down disconnects all of them.
///
/// Generated identities are `ObjectId`s, exactly like a MongoDB server generates them, and
/// unique indexes are enforced. Queries scan the whole collection.
///
/// # Example
///
/// ```ignore
/// use recordlayer_memory::InMemoryStore;
/// use recordlayer::{RecordStore, change::ChangeSet};
///
/// let store = RecordStore::connect(InMemoryStore::builder()).await?;
/// let id = store.collection("users").add(ChangeSet::new().set("name", "Alice")).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents and indexes
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
    connected: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty, connected in-memory store.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns `false` once the store has been shut down.
    pub fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::Acquire)
    }

    fn ensure_connected(&self) -> RecordStoreResult<()> {
        match self.is_connected() {
            true => Ok(()),
            false => Err(RecordStoreError::NotConnected),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>> {
        self.ensure_connected()?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut documents = Vec::new();

        for document in &stored.documents {
            if DocumentEvaluator::matches(document, query.filter.as_ref())? {
                documents.push(document);
            }
        }

        // Stable, so ties keep insertion order.
        if !query.sort.is_empty() {
            documents.sort_by(|left, right| {
                query.sort.iter().fold(std::cmp::Ordering::Equal, |ordering, key| {
                    ordering.then_with(|| {
                        let left = resolve(left, &key.field);
                        let right = resolve(right, &key.field);
                        let ordering = compare_values(left.as_deref(), right.as_deref());

                        match key.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                })
            });
        }

        documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| match &query.projection {
                Some(fields) => project(document, fields),
                None => Ok(document.clone()),
            })
            .collect()
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> RecordStoreResult<u64> {
        self.ensure_connected()?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;

        for document in &stored.documents {
            if DocumentEvaluator::matches(document, filter.as_ref())? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RecordStoreResult<Bson> {
        self.ensure_connected()?;

        let mut collections = self.collections.write().await;

        collections
            .entry(collection.to_string())
            .or_default()
            .insert(collection, document)
    }

    async fn insert_or_merge(
        &self,
        collection: &str,
        id: Bson,
        document: Document,
        update: UpdateBundle,
    ) -> RecordStoreResult<UpsertOutcome> {
        self.ensure_connected()?;

        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(collection.to_string())
            .or_default();

        match stored.position_of_id(&id) {
            Some(position) => {
                stored.merge(position, &update)?;
                Ok(UpsertOutcome::Merged)
            }
            None => {
                stored.insert(collection, document)?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        update: UpdateBundle,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        self.ensure_connected()?;

        if array_filters.as_ref().is_some_and(|filters| !filters.is_empty()) {
            warn!(collection, "array filters are not supported by the in-memory store");

            return Err(RecordStoreError::Backend(
                "Array filters are not supported by the in-memory store".to_string(),
            ));
        }

        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };
        let Some(position) = stored.position_matching(&filter)? else {
            return Ok(UpdateOutcome::default());
        };

        let modified = stored.merge(position, &update)?;

        Ok(UpdateOutcome {
            matched: 1,
            modified: modified as u64,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> RecordStoreResult<u64> {
        self.ensure_connected()?;

        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };

        match stored.position_matching(&filter)? {
            Some(position) => {
                stored.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        self.ensure_connected()?;

        if index.keys.is_empty() {
            return Err(RecordStoreError::InvalidArgument("An index needs at least one key".to_string()));
        }

        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(collection.to_string())
            .or_default();

        if let Some(existing) = stored.indexes.iter().find(|existing| existing.keys == index.keys) {
            return match existing.unique == index.unique {
                true => Ok(()),
                false => Err(RecordStoreError::Backend(format!(
                    "Index {} already exists with different options",
                    index.name()
                ))),
            };
        }

        if index.unique {
            for (position, document) in stored.documents.iter().enumerate() {
                let clash = stored.documents[position + 1..]
                    .iter()
                    .any(|other| same_keys(&index, document, other));

                if clash {
                    return Err(RecordStoreError::Backend(format!(
                        "Cannot build unique index {}: duplicate keys exist",
                        index.name()
                    )));
                }
            }
        }

        debug!(collection, index = %index.name(), "created index");
        stored.indexes.push(index);

        Ok(())
    }

    async fn drop_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        self.ensure_connected()?;

        if index.keys.len() == 1 && index.keys[0].0 == INTERNAL_ID_FIELD {
            return Err(RecordStoreError::InvalidArgument("Cannot drop the _id index".to_string()));
        }

        let not_found = || RecordStoreError::Backend(format!("Index not found with name [{}]", index.name()));

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(not_found)?;
        let position = stored
            .indexes
            .iter()
            .position(|existing| existing.keys == index.keys)
            .ok_or_else(not_found)?;

        stored.indexes.remove(position);
        debug!(collection, index = %index.name(), "dropped index");

        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> RecordStoreResult<Vec<IndexSpec>> {
        self.ensure_connected()?;

        let collections = self.collections.read().await;

        Ok(match collections.get(collection) {
            Some(stored) => std::iter::once(IndexSpec::new().asc(INTERNAL_ID_FIELD))
                .chain(stored.indexes.iter().cloned())
                .collect(),
            None => Vec::new(),
        })
    }

    async fn shutdown(self) -> RecordStoreResult<()> {
        self.connected.store(false, AtomicOrdering::Release);
        debug!("in-memory store shut down");

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use recordlayer_memory::InMemoryStore;
/// use recordlayer::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> RecordStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use recordlayer_core::{change::ChangeSet, query::Filter};

    #[tokio::test]
    async fn generates_object_ids_first() {
        let store = InMemoryStore::new();
        let id = store
            .insert_one("users", doc! { "name": "Alice" })
            .await
            .unwrap();
        let stored = store
            .find_one("users", Query::new())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn rejects_duplicate_identities() {
        let store = InMemoryStore::new();
        store.insert_one("users", doc! { "_id": "u1" }).await.unwrap();

        assert!(matches!(
            store.insert_one("users", doc! { "_id": "u1" }).await,
            Err(RecordStoreError::DuplicateIdentity(..))
        ));
    }

    #[tokio::test]
    async fn insert_or_merge_picks_the_branch_atomically() {
        let store = InMemoryStore::new();
        let bundle = ChangeSet::new().set("b", 2).compile().unwrap();

        let first = store
            .insert_or_merge("c", "x".into(), doc! { "_id": "x", "a": 1 }, bundle.clone())
            .await
            .unwrap();
        let second = store
            .insert_or_merge("c", "x".into(), doc! { "_id": "x", "a": 1 }, bundle)
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Merged);
        assert_eq!(
            store.find("c", Query::new()).await.unwrap(),
            vec![doc! { "_id": "x", "a": 1, "b": 2 }]
        );
    }

    #[tokio::test]
    async fn sorts_on_several_keys_and_projects() {
        let store = InMemoryStore::new();

        for (id, group, rank) in [("a", 1, 3), ("b", 2, 1), ("c", 1, 1)] {
            store
                .insert_one("c", doc! { "_id": id, "group": group, "rank": rank, "extra": true })
                .await
                .unwrap();
        }

        let query = Query::builder()
            .sort("group", SortDirection::Asc)
            .sort("rank", SortDirection::Desc)
            .projection(["rank"])
            .build();
        let documents = store.find("c", query).await.unwrap();

        assert_eq!(
            documents,
            vec![
                doc! { "_id": "a", "rank": 3 },
                doc! { "_id": "c", "rank": 1 },
                doc! { "_id": "b", "rank": 1 },
            ]
        );
    }

    #[tokio::test]
    async fn enforces_unique_indexes() {
        let store = InMemoryStore::new();
        store
            .create_index("users", IndexSpec::new().asc("email").unique())
            .await
            .unwrap();
        store
            .insert_one("users", doc! { "_id": "u1", "email": "a@x" })
            .await
            .unwrap();

        assert!(matches!(
            store.insert_one("users", doc! { "_id": "u2", "email": "a@x" }).await,
            Err(RecordStoreError::Backend(_))
        ));
        assert_eq!(store.list_indexes("users").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unique_keys_compare_large_integers_exactly() {
        let big = 1_234_567_890_123_456_789_i64;
        let store = InMemoryStore::new();
        store
            .create_index("users", IndexSpec::new().asc("snowflake").unique())
            .await
            .unwrap();

        store.insert_one("users", doc! { "_id": big, "snowflake": big }).await.unwrap();
        store
            .insert_one("users", doc! { "_id": big - 1, "snowflake": big - 1 })
            .await
            .unwrap();

        assert_eq!(store.count("users", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn refuses_array_filters() {
        let store = InMemoryStore::new();
        let bundle = ChangeSet::new().set("a", 1).compile().unwrap();

        assert!(matches!(
            store
                .update_one("c", Filter::id("x"), bundle, Some(vec![doc! { "elem.qty": { "$gt": 1 } }]))
                .await,
            Err(RecordStoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn disconnects_every_clone_on_shutdown() {
        let store = InMemoryStore::new();
        let handle = store.clone();

        store.shutdown().await.unwrap();

        assert!(!handle.is_connected());
        assert!(matches!(
            handle.find("c", Query::new()).await,
            Err(RecordStoreError::NotConnected)
        ));
    }
}
