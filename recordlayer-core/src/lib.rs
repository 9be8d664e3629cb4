//! A thin record access layer over schemaless document stores.
//!
//! This crate is the core of the recordlayer project and provides:
//!
//! - **Identifiers** ([`id`]) - Record identifiers and identity normalization
//! - **Change sets** ([`change`]) - Typed partial updates and the directive compiler
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Query and filtering API** ([`query`]) - Filters, sort keys and projections
//! - **Collections interface** ([`collection`]) - Create/read/update/delete/list over one collection
//! - **Record store** ([`store`]) - The explicit session handing out collections
//! - **Pagination** ([`page`]) - Page requests and counted result pages
//! - **Indexes** ([`index`]) - Index specifications
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use recordlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//!     pub nickname: Option<String>,
//! }
//!
//! impl Payload for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//! }
//!
//! let store = RecordStore::connect(InMemoryStore::builder()).await?;
//! let users = store.repository::<User>();
//!
//! users.set("u1", &User { name: "Alice".into(), nickname: None }).await?;
//! users.update("u1", ChangeSet::new().increment("logins", 1), None).await?;
//! ```

pub mod backend;
pub mod change;
pub mod collection;
pub mod error;
pub mod id;
pub mod index;
pub mod page;
pub mod path;
pub mod query;
pub mod record;
pub mod store;

pub use backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome, UpsertOutcome};
pub use change::{Change, ChangeSet, IntoChangeSet, UpdateBundle};
pub use collection::{Collection, Repository};
pub use error::{RecordStoreError, RecordStoreResult};
pub use id::RecordId;
pub use index::IndexSpec;
pub use page::{Page, PageRequest};
pub use query::{Expr, Filter, Query, SortDirection};
pub use record::{Payload, PayloadExt, Record};
pub use store::RecordStore;
