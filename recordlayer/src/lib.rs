//! Main recordlayer crate providing a unified record-access layer over document stores.
//!
//! This crate is the primary entry point for users of the recordlayer framework. It re-exports
//! the core types and functionality from the sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Typed records** - Define payloads with Serde; reads return [`record::Record`] envelopes
//! - **Merge updates** - Partial, non-destructive changes with increment and array directives
//! - **Atomic set** - Create-or-merge in one backend call, no separate existence check
//! - **Paginated lists** - Counted, zero-indexed pages
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use recordlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! impl Payload for User {
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> RecordStoreResult<()> {
//!     let store = RecordStore::connect(InMemoryStore::builder()).await?;
//!     let users = store.repository::<User>();
//!
//!     users.set("u1", &User { name: "Alice".to_string() }).await?;
//!     users.update("u1", ChangeSet::new().increment("logins", 1), None).await?;
//!
//!     let page = users
//!         .list(
//!             Query::builder()
//!                 .filter(Filter::eq("name", "Alice"))
//!                 .sort("createTime", SortDirection::Desc)
//!                 .build(),
//!             PageRequest::new(0, 10),
//!         )
//!         .await?;
//!
//!     println!("{} users", page.total_count);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use recordlayer_core::{
    backend, change, collection, error, id, index, page, query, record, store,
    ChangeSet, Collection, Filter, Page, PageRequest, Payload, Query, Record, RecordId, RecordStore,
    RecordStoreError, RecordStoreResult, Repository,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use recordlayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use recordlayer_mongodb::{MongoDbConfig, MongoDbStore, MongoDbStoreBuilder};
}
