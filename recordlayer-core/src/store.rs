//! The record store session.
//!
//! A [`RecordStore`] owns a connected backend. It is created explicitly at startup, handed by
//! reference to every [`Collection`] and [`Repository`] it creates, and closed explicitly with
//! [`RecordStore::shutdown`]. There is no ambient, global connection.
//!
//! ```ignore
//! use recordlayer::{prelude::*, memory::InMemoryStore};
//!
//! let store = RecordStore::new(InMemoryStore::builder().build().await?);
//! let users = store.repository::<User>();
//! users.set("u1", &User { name: "Alice".into() }).await?;
//! store.shutdown().await?;
//! ```

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, Repository},
    error::RecordStoreResult,
    record::Payload,
};

/// A connected record store bound to a specific backend implementation.
#[derive(Debug)]
pub struct RecordStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> RecordStore<B> {
    /// Creates a store over an already connected backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Builds (connects) a backend and wraps it in a store.
    pub async fn connect<T>(builder: T) -> RecordStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        Ok(Self::new(builder.build().await?))
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns an untyped collection working with BSON documents.
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_, B> {
        Collection::new(name.into(), &self.backend)
    }

    /// Returns a typed repository for the payload type `P`, bound to `P::collection_name()`.
    pub fn repository<P: Payload>(&self) -> Repository<'_, B, P> {
        Repository::new(self.collection(P::collection_name()))
    }

    /// Closes the backend's connection.
    pub async fn shutdown(self) -> RecordStoreResult<()> {
        self.backend.shutdown().await
    }
}
