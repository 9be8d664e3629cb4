use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info};

use recordlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome, UpsertOutcome},
    change::UpdateBundle,
    error::{RecordStoreError, RecordStoreResult},
    id::{INTERNAL_ID_FIELD, RecordId},
    index::IndexSpec,
    query::{Expr, Query, SortDirection},
};

use crate::query::MongoQueryTranslator;

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_NOT_FOUND: i32 = 26;
const ID_INDEX: &str = "_id_";

fn backend_error(error: MongoError) -> RecordStoreError {
    RecordStoreError::Backend(error.to_string())
}

/// Returns `true` when a duplicate-key message names the identity index itself.
///
/// Server messages read `E11000 duplicate key error collection: <ns> index: <name> dup key: ...`.
fn names_identity_index(message: &str) -> bool {
    let mut words = message.split_whitespace();

    while let Some(word) = words.next() {
        if word == "index:" {
            return words.next() == Some(ID_INDEX);
        }
    }

    false
}

/// Returns `true` for a duplicate-key write error on the identity index.
fn is_duplicate_identity(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY && names_identity_index(&write_error.message)
        }
        _ => false,
    }
}

fn is_namespace_not_found(error: &MongoError) -> bool {
    matches!(error.kind.as_ref(), ErrorKind::Command(command_error) if command_error.code == NAMESPACE_NOT_FOUND)
}

fn index_from_model(model: IndexModel) -> IndexSpec {
    let keys = model
        .keys
        .iter()
        .filter_map(|(field, direction)| SortDirection::from_bson(direction).map(|direction| (field.clone(), direction)))
        .collect();
    let unique = model
        .options
        .and_then(|options| options.unique)
        .unwrap_or(false);

    IndexSpec { keys, unique }
}

/// MongoDB record storage backend.
///
/// Cloning shares the driver's connection pool and the connection state.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: Database,
    connected: Arc<AtomicBool>,
}

impl MongoDbStore {
    /// Wraps a connected client.
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn builder(uri: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(uri, database)
    }

    /// Returns the database this store reads and writes.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> RecordStoreResult<MongoCollection<Document>> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(RecordStoreError::NotConnected);
        }

        Ok(self.database.collection(collection_name))
    }

    fn duplicate_identity(id: &Bson, collection: &str) -> RecordStoreError {
        RecordStoreError::DuplicateIdentity(
            RecordId::from_bson(id).map_or_else(|| id.to_string(), |id| id.to_string()),
            collection.to_string(),
        )
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, query: Query) -> RecordStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        options.limit = query.limit.map(|limit| limit as i64);
        options.skip = query.offset.map(|skip| skip as u64);
        options.sort = MongoQueryTranslator::sort(&query.sort);
        options.projection = query
            .projection
            .as_deref()
            .map(MongoQueryTranslator::projection);

        self.get_collection(collection)?
            .find(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> RecordStoreResult<u64> {
        self.get_collection(collection)?
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RecordStoreResult<Bson> {
        let id = document.get(INTERNAL_ID_FIELD).cloned();

        match self
            .get_collection(collection)?
            .insert_one(document)
            .await
        {
            Ok(result) => Ok(result.inserted_id),
            Err(error) if is_duplicate_identity(&error) => Err(Self::duplicate_identity(
                &id.unwrap_or(Bson::Null),
                collection,
            )),
            Err(error) => Err(backend_error(error)),
        }
    }

    async fn insert_or_merge(
        &self,
        collection: &str,
        id: Bson,
        document: Document,
        update: UpdateBundle,
    ) -> RecordStoreResult<UpsertOutcome> {
        let handle = self.get_collection(collection)?;

        // The identity index arbitrates concurrent creations: whoever loses merges instead.
        match handle.insert_one(document).await {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(error) if is_duplicate_identity(&error) => {
                let result = handle
                    .update_one(doc! { INTERNAL_ID_FIELD: id }, update.to_document())
                    .await
                    .map_err(backend_error)?;

                // Nothing to merge into: surface the insert failure instead of losing the write.
                if result.matched_count == 0 {
                    return Err(backend_error(error));
                }

                Ok(UpsertOutcome::Merged)
            }
            Err(error) => Err(backend_error(error)),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        update: UpdateBundle,
        array_filters: Option<Vec<Document>>,
    ) -> RecordStoreResult<UpdateOutcome> {
        let handle = self.get_collection(collection)?;
        let mut action = handle.update_one(MongoQueryTranslator::filter(Some(&filter))?, update.to_document());

        if let Some(array_filters) = array_filters {
            action = action.array_filters(array_filters);
        }

        let result = action.await.map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> RecordStoreResult<u64> {
        Ok(self
            .get_collection(collection)?
            .delete_one(MongoQueryTranslator::filter(Some(&filter))?)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        if index.keys.is_empty() {
            return Err(RecordStoreError::InvalidArgument("An index needs at least one key".to_string()));
        }

        let keys = index
            .keys
            .iter()
            .map(|(field, direction)| (field.clone(), Bson::Int32(direction.value())))
            .collect::<Document>();

        self.get_collection(collection)?
            .create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(
                        IndexOptions::builder()
                            .unique(index.unique)
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(backend_error)?;

        debug!(collection, index = %index.name(), "created index");

        Ok(())
    }

    async fn drop_index(&self, collection: &str, index: IndexSpec) -> RecordStoreResult<()> {
        if index.keys.len() == 1 && index.keys[0].0 == INTERNAL_ID_FIELD {
            return Err(RecordStoreError::InvalidArgument("Cannot drop the _id index".to_string()));
        }

        self.get_collection(collection)?
            .drop_index(index.name())
            .await
            .map_err(backend_error)?;

        debug!(collection, index = %index.name(), "dropped index");

        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> RecordStoreResult<Vec<IndexSpec>> {
        let cursor = match self
            .get_collection(collection)?
            .list_indexes()
            .await
        {
            Ok(cursor) => cursor,
            Err(error) if is_namespace_not_found(&error) => return Ok(Vec::new()),
            Err(error) => return Err(backend_error(error)),
        };

        Ok(cursor
            .try_collect::<Vec<IndexModel>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(index_from_model)
            .collect())
    }

    async fn shutdown(self) -> RecordStoreResult<()> {
        self.connected.store(false, Ordering::Release);
        self.client.shutdown().immediate(true).await;

        info!(database = %self.database.name(), "disconnected from MongoDB");

        Ok(())
    }
}

/// Connection settings, loadable from an application's own configuration file.
///
/// ```ignore
/// let config: MongoDbConfig = serde_json::from_str(r#"{ "uri": "mongodb://localhost", "database": "app" }"#)?;
/// let store = MongoDbStoreBuilder::from_config(&config).build().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoDbConfig {
    pub uri: String,
    pub database: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub server_selection_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    uri: String,
    database: String,
    app_name: Option<String>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
}

impl MongoDbStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            app_name: None,
            connect_timeout: None,
            server_selection_timeout: None,
        }
    }

    pub fn from_config(config: &MongoDbConfig) -> Self {
        let mut builder = Self::new(&config.uri, &config.database);

        builder.app_name = config.app_name.clone();
        builder.connect_timeout = config.connect_timeout_ms.map(Duration::from_millis);
        builder.server_selection_timeout = config.server_selection_timeout_ms.map(Duration::from_millis);

        builder
    }

    /// Name reported to the server in connection handshakes.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    /// Connects and pings the server, so a wrong address fails here rather than on first use.
    async fn build(self) -> RecordStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| RecordStoreError::Initialization(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }
        if self.connect_timeout.is_some() {
            options.connect_timeout = self.connect_timeout;
        }
        if self.server_selection_timeout.is_some() {
            options.server_selection_timeout = self.server_selection_timeout;
        }

        let client = Client::with_options(options)
            .map_err(|e| RecordStoreError::Initialization(e.to_string()))?;

        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| RecordStoreError::Initialization(e.to_string()))?;

        info!(database = %self.database, "connected to MongoDB");

        Ok(MongoDbStore::new(client, &self.database))
    }
}
