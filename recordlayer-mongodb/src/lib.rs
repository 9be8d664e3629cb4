//! MongoDB backend implementation for recordlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait, enabling
//! persistent record storage on MongoDB's query and update engine.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! recordlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native directives** - Compiled change sets are sent as a single MongoDB update
//! - **Atomic set** - The identity index decides between creation and merge
//! - **Indexing** - Creating, dropping and listing MongoDB indexes
//!
//! # Example
//!
//! ```ignore
//! use recordlayer::{RecordStore, mongodb::MongoDbStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .app_name("inventory")
//!         .server_selection_timeout(Duration::from_secs(5));
//!     let store = RecordStore::connect(builder).await?;
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod query;
pub mod store;

pub use store::{MongoDbConfig, MongoDbStore, MongoDbStoreBuilder};
