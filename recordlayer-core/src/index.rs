//! Index specifications.
//!
//! An index is an ordered list of `(field, direction)` keys plus a uniqueness flag. The
//! identifier is named [`ID_FIELD`] here like everywhere else; backends translate it to their
//! internal identity field with [`IndexSpec::to_internal`] and back with
//! [`IndexSpec::to_external`].

use crate::{
    id::{ID_FIELD, INTERNAL_ID_FIELD},
    query::SortDirection,
};

/// Keys and options of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed fields in key order.
    pub keys: Vec<(String, SortDirection)>,
    /// Whether the index rejects duplicate key values.
    pub unique: bool,
}

impl IndexSpec {
    /// Creates an empty, non-unique index specification.
    pub fn new() -> Self {
        Self { keys: Vec::new(), unique: false }
    }

    /// Appends an ascending key.
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.key(field, SortDirection::Asc)
    }

    /// Appends a descending key.
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.key(field, SortDirection::Desc)
    }

    /// Appends a key.
    pub fn key(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Marks the index as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// The conventional index name, e.g. `name_1_createTime_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}_{}", direction.value()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Renames the application identity field to the internal one.
    pub fn to_internal(&self) -> Self {
        self.rename(ID_FIELD, INTERNAL_ID_FIELD)
    }

    /// Renames the internal identity field to the application one.
    pub fn to_external(&self) -> Self {
        self.rename(INTERNAL_ID_FIELD, ID_FIELD)
    }

    fn rename(&self, from: &str, to: &str) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .map(|(field, direction)| {
                    (if field == from { to.to_string() } else { field.clone() }, *direction)
                })
                .collect(),
            unique: self.unique,
        }
    }
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self::new()
    }
}
