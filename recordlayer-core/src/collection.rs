//! Record collections: the create/read/update/delete/list surface.
//!
//! - [`Collection`] works with untyped BSON documents.
//! - [`Repository`] wraps a collection for one [`Payload`] type and returns typed [`Record`]s.
//!
//! Every write goes through the same pipeline: the caller's change set is stripped of reserved
//! fields, compiled into an [`UpdateBundle`] and stamped with the lifecycle timestamps.
//!
//! - A *creation* drops null values, attaches the identifier and `createTime`, and inserts.
//! - A *merge-update* keeps nulls as removals, attaches `updateTime`, and merges into the existing
//!   record, leaving unmentioned fields untouched.
//! - `set` prepares both and lets the backend pick atomically, so concurrent `set`s of a new
//!   identifier never fail: one creates, the others merge.
//!
//! Every returned document has its identity normalized (see [`restore_document`]).

use bson::{Bson, Document};
use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::{StoreBackend, UpdateOutcome, UpsertOutcome},
    change::{ChangeSet, IntoChangeSet, UpdateBundle},
    error::{RecordStoreError, RecordStoreResult},
    id::{ID_FIELD, INTERNAL_ID_FIELD, RecordId, restore_document},
    index::IndexSpec,
    page::{Page, PageRequest},
    query::{Expr, Filter, Query},
    record::{CREATE_TIME_FIELD, Payload, PayloadExt, Record, now_millis},
};

/// Builds the document inserted on the creation path.
fn creation_document(id: Option<&RecordId>, changes: ChangeSet, now: i64) -> RecordStoreResult<Document> {
    let mut document = Document::new();

    if let Some(id) = id {
        document.insert(INTERNAL_ID_FIELD, id.to_bson());
    }

    // Directives behave as if merged into an empty record.
    changes
        .strip_reserved()
        .drop_nulls()
        .compile()?
        .apply_to(&mut document)?;

    document.insert(CREATE_TIME_FIELD, Bson::Int64(now));

    Ok(document)
}

/// Builds the bundle merged on the update path.
fn merge_bundle(changes: ChangeSet, now: i64) -> RecordStoreResult<UpdateBundle> {
    let mut bundle = changes.strip_reserved().compile()?;
    bundle.stamp_update_time(now);

    Ok(bundle)
}

/// An untyped collection of records, bound to a backend reference.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when a record with the identifier exists.
    pub async fn id_exists(&self, id: impl Into<RecordId>) -> RecordStoreResult<bool> {
        let query = Query::builder()
            .filter(Filter::id(id))
            .projection([ID_FIELD])
            .build();

        Ok(self
            .backend
            .find_one(&self.name, query)
            .await?
            .is_some())
    }

    /// Returns the record with the identifier, or `None`.
    pub async fn get(&self, id: impl Into<RecordId>) -> RecordStoreResult<Option<Document>> {
        Ok(self
            .backend
            .find_one(&self.name, Query::filtered(Filter::id(id)))
            .await?
            .map(restore_document))
    }

    /// Returns every record matching the query.
    pub async fn find(&self, query: Query) -> RecordStoreResult<Vec<Document>> {
        Ok(self
            .backend
            .find(&self.name, query)
            .await?
            .into_iter()
            .map(restore_document)
            .collect())
    }

    /// Returns the given fields (plus the identifier) of every record matching the query.
    pub async fn find_part<S: Into<String>>(
        &self,
        query: Query,
        fields: impl IntoIterator<Item = S>,
    ) -> RecordStoreResult<Vec<Document>> {
        let query = Query {
            projection: Some(fields.into_iter().map(Into::into).collect()),
            ..query
        };

        self.find(query).await
    }

    /// Returns the first record matching the query (after sorting), or `None`.
    pub async fn find_one(&self, query: Query) -> RecordStoreResult<Option<Document>> {
        Ok(self
            .backend
            .find_one(&self.name, query)
            .await?
            .map(restore_document))
    }

    /// Counts the records matching the filter.
    pub async fn count(&self, filter: Option<Expr>) -> RecordStoreResult<u64> {
        self.backend.count(&self.name, filter).await
    }

    /// Returns one page of the records matching the query, with the total count and page count.
    ///
    /// The query's own offset and limit are replaced by the page window. A page past the last one
    /// is empty, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidArgument`] when the page size is zero.
    pub async fn list(&self, query: Query, request: PageRequest) -> RecordStoreResult<Page<Document>> {
        request.validate()?;

        let total_count = self
            .backend
            .count(&self.name, query.filter.clone())
            .await?;
        let window = Query {
            offset: Some(request.offset()),
            limit: Some(request.page_size),
            ..query
        };
        let items = self.find(window).await?;

        debug!(collection = %self.name, page = request.page, total_count, "listed records");

        Ok(Page::builder(items)
            .with_total_count(total_count)
            .with_request(request)
            .build())
    }

    /// Creates the record if it does not exist, merges the changes into it otherwise.
    ///
    /// Changes that cannot describe a new record, such as `$[]` paths, still merge into an
    /// existing one; without one the creation error is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// Fails with [`RecordStoreError::ConflictingChange`] when the changes target one field
    /// through several categories, and with any backend error.
    pub async fn set(&self, id: impl Into<RecordId>, changes: impl IntoChangeSet) -> RecordStoreResult<UpsertOutcome> {
        let id = id.into();
        let changes = changes.into_change_set()?;
        let now = now_millis();

        let creation = creation_document(Some(&id), changes.clone(), now);
        let bundle = merge_bundle(changes, now)?;
        let outcome = match creation {
            Ok(document) => {
                self.backend
                    .insert_or_merge(&self.name, id.to_bson(), document, bundle)
                    .await?
            }
            // Changes that only make sense against a stored record: merge or report why not.
            Err(error) => {
                let result = self
                    .backend
                    .update_one(&self.name, Filter::id(id.clone()), bundle, None)
                    .await?;

                if result.matched == 0 {
                    return Err(error);
                }

                UpsertOutcome::Merged
            }
        };

        debug!(collection = %self.name, %id, ?outcome, "set record");

        Ok(outcome)
    }

    /// Creates a record with the identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`RecordStoreError::DuplicateIdentity`] when the identifier already exists.
    pub async fn create(&self, id: impl Into<RecordId>, changes: impl IntoChangeSet) -> RecordStoreResult<()> {
        let id = id.into();
        let document = creation_document(Some(&id), changes.into_change_set()?, now_millis())?;

        self.backend
            .insert_one(&self.name, document)
            .await?;

        debug!(collection = %self.name, %id, "created record");

        Ok(())
    }

    /// Merges the changes into the record with the identifier.
    ///
    /// Updating a missing record matches nothing and is not an error. `array_filters` are
    /// forwarded to the backend for `$[<identifier>]` positional paths.
    pub async fn update(
        &self,
        id: impl Into<RecordId>,
        changes: impl IntoChangeSet,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        let id = id.into();
        let bundle = merge_bundle(changes.into_change_set()?, now_millis())?;
        let outcome = self
            .backend
            .update_one(&self.name, Filter::id(id.clone()), bundle, array_filters)
            .await?;

        debug!(collection = %self.name, %id, matched = outcome.matched, "updated record");

        Ok(outcome)
    }

    /// Creates a record with a store-generated identifier and returns it.
    pub async fn add(&self, changes: impl IntoChangeSet) -> RecordStoreResult<RecordId> {
        let document = creation_document(None, changes.into_change_set()?, now_millis())?;
        let stored = self
            .backend
            .insert_one(&self.name, document)
            .await?;
        let id = RecordId::from_bson(&stored)
            .ok_or_else(|| RecordStoreError::InvalidDocument(format!("Unsupported generated identity {stored}")))?;

        debug!(collection = %self.name, %id, "added record");

        Ok(id)
    }

    /// Deletes the record with the identifier and returns the number deleted.
    ///
    /// Deleting a missing record is not an error.
    pub async fn delete(&self, id: impl Into<RecordId>) -> RecordStoreResult<u64> {
        let id = id.into();
        let deleted = self
            .backend
            .delete_one(&self.name, Filter::id(id.clone()))
            .await?;

        debug!(collection = %self.name, %id, deleted, "deleted record");

        Ok(deleted)
    }

    /// Creates an index.
    pub async fn create_index(&self, index: IndexSpec) -> RecordStoreResult<()> {
        self.backend
            .create_index(&self.name, index.to_internal())
            .await
    }

    /// Drops the index with the given keys.
    pub async fn delete_index(&self, index: IndexSpec) -> RecordStoreResult<()> {
        self.backend
            .drop_index(&self.name, index.to_internal())
            .await
    }

    /// Lists the indexes of the collection, one `field -> direction` key list per index.
    pub async fn get_indexes(&self) -> RecordStoreResult<Vec<IndexSpec>> {
        Ok(self
            .backend
            .list_indexes(&self.name)
            .await?
            .iter()
            .map(IndexSpec::to_external)
            .collect())
    }
}

/// A typed repository for records with payload `P`.
///
/// Reads deserialize into [`Record<P>`]. `find_part` returns documents because a projection
/// rarely fits `P`.
#[derive(Debug)]
pub struct Repository<'a, B: StoreBackend, P: Payload> {
    collection: Collection<'a, B>,
    _marker: PhantomData<P>,
}

impl<'a, B: StoreBackend, P: Payload> Repository<'a, B, P> {
    pub(crate) fn new(collection: Collection<'a, B>) -> Self {
        Self { collection, _marker: PhantomData }
    }

    /// Returns the name of the underlying collection.
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Returns the untyped collection this repository wraps.
    pub fn collection(&self) -> &Collection<'a, B> {
        &self.collection
    }

    pub async fn id_exists(&self, id: impl Into<RecordId>) -> RecordStoreResult<bool> {
        self.collection.id_exists(id).await
    }

    pub async fn get(&self, id: impl Into<RecordId>) -> RecordStoreResult<Option<Record<P>>> {
        self.collection
            .get(id)
            .await?
            .map(Record::from_document)
            .transpose()
    }

    pub async fn find(&self, query: Query) -> RecordStoreResult<Vec<Record<P>>> {
        self.collection
            .find(query)
            .await?
            .into_iter()
            .map(Record::from_document)
            .collect()
    }

    pub async fn find_part<S: Into<String>>(
        &self,
        query: Query,
        fields: impl IntoIterator<Item = S>,
    ) -> RecordStoreResult<Vec<Document>> {
        self.collection.find_part(query, fields).await
    }

    pub async fn find_one(&self, query: Query) -> RecordStoreResult<Option<Record<P>>> {
        self.collection
            .find_one(query)
            .await?
            .map(Record::from_document)
            .transpose()
    }

    pub async fn count(&self, filter: Option<Expr>) -> RecordStoreResult<u64> {
        self.collection.count(filter).await
    }

    pub async fn list(&self, query: Query, request: PageRequest) -> RecordStoreResult<Page<Record<P>>> {
        self.collection
            .list(query, request)
            .await?
            .try_map(Record::from_document)
    }

    /// Creates the record or merges `payload` into it.
    ///
    /// Payload fields serialized as null remove the stored field on merge and are skipped on
    /// creation.
    pub async fn set(&self, id: impl Into<RecordId>, payload: &P) -> RecordStoreResult<UpsertOutcome> {
        let id = id.into();
        self.collection
            .set(id, payload.to_document()?)
            .await
    }

    /// Like [`Repository::set`], with an explicit change set instead of a payload.
    pub async fn set_changes(&self, id: impl Into<RecordId>, changes: impl IntoChangeSet) -> RecordStoreResult<UpsertOutcome> {
        self.collection.set(id, changes).await
    }

    pub async fn create(&self, id: impl Into<RecordId>, payload: &P) -> RecordStoreResult<()> {
        let id = id.into();
        self.collection
            .create(id, payload.to_document()?)
            .await
    }

    pub async fn update(
        &self,
        id: impl Into<RecordId>,
        changes: impl IntoChangeSet,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        self.collection
            .update(id, changes, array_filters)
            .await
    }

    pub async fn add(&self, payload: &P) -> RecordStoreResult<RecordId> {
        self.collection
            .add(payload.to_document()?)
            .await
    }

    pub async fn delete(&self, id: impl Into<RecordId>) -> RecordStoreResult<u64> {
        self.collection.delete(id).await
    }

    pub async fn create_index(&self, index: IndexSpec) -> RecordStoreResult<()> {
        self.collection.create_index(index).await
    }

    pub async fn delete_index(&self, index: IndexSpec) -> RecordStoreResult<()> {
        self.collection.delete_index(index).await
    }

    pub async fn get_indexes(&self) -> RecordStoreResult<Vec<IndexSpec>> {
        self.collection.get_indexes().await
    }
}
