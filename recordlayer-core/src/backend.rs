//! Storage backend abstraction.
//!
//! [`StoreBackend`] is the contract the record layer consumes: a handful of single-document
//! primitives over named collections of raw BSON documents. Backends own connections, sessions,
//! retries and timeouts; the record layer issues one call per logical step and propagates every
//! error unchanged.
//!
//! Documents crossing this boundary are in *stored* shape: the identity lives under
//! [`INTERNAL_ID_FIELD`](crate::id::INTERNAL_ID_FIELD). Filters and sort keys, on the other hand,
//! address the identity by its application name, [`ID_FIELD`](crate::id::ID_FIELD), and a backend
//! must match an application identifier against whatever identity value it stored for it.
//!
//! # Implementing a backend
//!
//! ```ignore
//! use recordlayer::backend::StoreBackend;
//!
//! #[derive(Debug)]
//! struct MyBackend { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl StoreBackend for MyBackend {
//!     async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>> {
//!         /* ... */
//!     }
//!     // ...
//! }
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    change::UpdateBundle,
    error::RecordStoreResult,
    index::IndexSpec,
    query::{Expr, Query},
};

/// Which branch an [`StoreBackend::insert_or_merge`] call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with the identifier existed; the creation document was inserted.
    Inserted,
    /// A record existed; the update bundle was merged into it.
    Merged,
}

/// Result of a single-document merge-update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Number of documents the filter matched (0 or 1).
    pub matched: u64,
    /// Number of documents actually changed (0 or 1).
    pub modified: u64,
}

/// Abstract interface for record storage backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and tolerate concurrent calls. No call holds any
/// lock across calls; consistency between calls is the backing store's business.
///
/// # Connection state
///
/// A backend is connected when built. After [`StoreBackend::shutdown`] every operation on any
/// remaining handle fails with [`RecordStoreError::NotConnected`](crate::error::RecordStoreError::NotConnected).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents matching the query, sorted, projected and windowed as requested.
    async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>>;

    /// Returns the first document matching the query (after sorting), if any.
    async fn find_one(&self, collection: &str, query: Query) -> RecordStoreResult<Option<Document>> {
        Ok(self
            .find(collection, Query { limit: Some(1), ..query })
            .await?
            .into_iter()
            .next())
    }

    /// Counts the documents matching the filter.
    async fn count(&self, collection: &str, filter: Option<Expr>) -> RecordStoreResult<u64>;

    /// Inserts a new document and returns its stored identity.
    ///
    /// When the document has no identity the backend generates one.
    ///
    /// # Errors
    ///
    /// Fails with [`RecordStoreError::DuplicateIdentity`](crate::error::RecordStoreError::DuplicateIdentity)
    /// when a document with the same identity already exists.
    async fn insert_one(&self, collection: &str, document: Document) -> RecordStoreResult<Bson>;

    /// Atomically inserts `document` when no document with identity `id` exists, or merges
    /// `update` into the existing one otherwise.
    ///
    /// `document` already carries `id` as its identity.
    async fn insert_or_merge(
        &self,
        collection: &str,
        id: Bson,
        document: Document,
        update: UpdateBundle,
    ) -> RecordStoreResult<UpsertOutcome>;

    /// Merges `update` into the first document matching `filter`.
    ///
    /// Matching nothing is not an error. `array_filters` select the elements addressed by
    /// `$[<identifier>]` positional paths and are forwarded uninspected.
    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        update: UpdateBundle,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter` and returns the number deleted (0 or 1).
    async fn delete_one(&self, collection: &str, filter: Expr) -> RecordStoreResult<u64>;

    /// Creates an index. Keys use the internal identity field name.
    async fn create_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()>;

    /// Drops the index with the given keys. Keys use the internal identity field name.
    async fn drop_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()>;

    /// Lists the collection's indexes, including the implicit identity index.
    async fn list_indexes(&self, collection: &str) -> RecordStoreResult<Vec<IndexSpec>>;

    /// Closes the backend's connection and releases its resources.
    async fn shutdown(self) -> RecordStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>> {
        (*self).find(collection, query).await
    }

    async fn find_one(&self, collection: &str, query: Query) -> RecordStoreResult<Option<Document>> {
        (*self).find_one(collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> RecordStoreResult<u64> {
        (*self).count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RecordStoreResult<Bson> {
        (*self).insert_one(collection, document).await
    }

    async fn insert_or_merge(
        &self,
        collection: &str,
        id: Bson,
        document: Document,
        update: UpdateBundle,
    ) -> RecordStoreResult<UpsertOutcome> {
        (*self)
            .insert_or_merge(collection, id, document, update)
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        update: UpdateBundle,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        (*self)
            .update_one(collection, filter, update, array_filters)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> RecordStoreResult<u64> {
        (*self).delete_one(collection, filter).await
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        (*self).create_index(collection, index).await
    }

    async fn drop_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        (*self).drop_index(collection, index).await
    }

    async fn list_indexes(&self, collection: &str) -> RecordStoreResult<Vec<IndexSpec>> {
        (*self).list_indexes(collection).await
    }
}

#[async_trait]
impl<B> StoreBackend for &mut B
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>> {
        (**self).find(collection, query).await
    }

    async fn find_one(&self, collection: &str, query: Query) -> RecordStoreResult<Option<Document>> {
        (**self).find_one(collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> RecordStoreResult<u64> {
        (**self).count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RecordStoreResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_or_merge(
        &self,
        collection: &str,
        id: Bson,
        document: Document,
        update: UpdateBundle,
    ) -> RecordStoreResult<UpsertOutcome> {
        (**self)
            .insert_or_merge(collection, id, document, update)
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        update: UpdateBundle,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        (**self)
            .update_one(collection, filter, update, array_filters)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> RecordStoreResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        (**self).create_index(collection, index).await
    }

    async fn drop_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        (**self).drop_index(collection, index).await
    }

    async fn list_indexes(&self, collection: &str) -> RecordStoreResult<Vec<IndexSpec>> {
        (**self).list_indexes(collection).await
    }
}

/// Factory for backends; building a backend establishes its connection.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> RecordStoreResult<Self::Backend>;
}
