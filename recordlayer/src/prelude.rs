//! Convenient re-exports of commonly used types from recordlayer.
//!
//! ```ignore
//! use recordlayer::prelude::*;
//! ```

pub use recordlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome, UpsertOutcome},
    change::{Change, ChangeSet, IntoChangeSet},
    collection::{Collection, Repository},
    error::{RecordStoreError, RecordStoreResult},
    id::RecordId,
    index::IndexSpec,
    page::{Page, PageRequest},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, Sort, SortDirection},
    record::{Payload, PayloadExt, Record},
    store::RecordStore,
};
