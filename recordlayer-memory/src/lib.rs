//! In-memory record storage backend for recordlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Store semantics** - Generated `ObjectId` identities, merge-update directives, unique indexes
//! - **Full query support** - Filtering, multi-key sorting, projection and windowing
//!
//! # Quick Start
//!
//! ```ignore
//! use recordlayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RecordStore::connect(InMemoryStore::builder()).await?;
//!     let users = store.collection("users");
//!
//!     let id = users.add(ChangeSet::new().set("name", "Alice")).await?;
//!     assert!(users.id_exists(id).await?);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
