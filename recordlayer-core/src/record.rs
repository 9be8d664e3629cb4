//! Record payloads and the record envelope.
//!
//! A [`Payload`] is the application-defined part of a record. Reads wrap it in a [`Record`],
//! which adds the identifier and the lifecycle timestamps managed by the store.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{RecordStoreError, RecordStoreResult},
    id::RecordId,
};

/// Wire name of the creation timestamp.
pub const CREATE_TIME_FIELD: &str = "createTime";

/// Wire name of the last-update timestamp.
pub const UPDATE_TIME_FIELD: &str = "updateTime";

/// Returns the current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Core trait for record payload types.
///
/// # Example
///
/// ```ignore
/// use recordlayer::record::Payload;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub name: String,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub email: Option<String>,
/// }
///
/// impl Payload for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
///
/// Payload fields serialized as null are removed from existing records when written with
/// `set`; skip them during serialization to leave the stored value untouched.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection records of this type are stored in.
    fn collection_name() -> &'static str;
}

/// Serialization helpers, implemented for every [`Payload`].
pub trait PayloadExt: Payload {
    /// Converts this payload to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the payload is not a map.
    fn to_document(&self) -> RecordStoreResult<Document>;

    /// Creates a payload from a BSON document.
    fn from_document(document: Document) -> RecordStoreResult<Self>;

    /// Converts this payload to a JSON value.
    fn to_json(&self) -> RecordStoreResult<Value>;

    /// Creates a payload from a JSON value.
    fn from_json(value: Value) -> RecordStoreResult<Self>;
}

impl<P: Payload> PayloadExt for P {
    fn to_document(&self) -> RecordStoreResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(RecordStoreError::InvalidDocument(format!(
                "Payload for {} must serialize to a map, got {other}",
                P::collection_name()
            ))),
        }
    }

    fn from_document(document: Document) -> RecordStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> RecordStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> RecordStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// A stored record: identifier, lifecycle timestamps and payload.
///
/// Serializes flat, e.g. `{ "id": "u1", "createTime": 1700000000000, "name": "Alice" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// The application-facing identifier.
    pub id: RecordId,
    /// Creation time in epoch milliseconds.
    #[serde(rename = "createTime", default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
    /// Time of the last merge-update in epoch milliseconds; absent until the first update.
    #[serde(rename = "updateTime", default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,
    /// The application payload.
    #[serde(flatten)]
    pub data: T,
}

impl<T: DeserializeOwned> Record<T> {
    /// Deserializes a restored document (see [`crate::id::restore_document`]) into a record.
    pub fn from_document(document: Document) -> RecordStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }
}

impl<T: Serialize> Record<T> {
    /// Converts this record to a JSON value.
    pub fn to_json(&self) -> RecordStoreResult<Value> {
        Ok(to_value(self)?)
    }
}

impl<T> Record<T> {
    /// Maps the payload, keeping identifier and timestamps.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Record<U> {
        Record {
            id: self.id,
            create_time: self.create_time,
            update_time: self.update_time,
            data: f(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Payload for Note {
        fn collection_name() -> &'static str {
            "notes"
        }
    }

    #[test]
    fn reads_flat_records() {
        let record = Record::<Note>::from_document(doc! {
            "id": "n1",
            "createTime": 10_i64,
            "text": "hello",
        })
        .unwrap();

        assert_eq!(record.id, RecordId::from("n1"));
        assert_eq!(record.create_time, Some(10));
        assert_eq!(record.update_time, None);
        assert_eq!(record.data, Note { text: "hello".into() });
    }

    #[test]
    fn writes_flat_json() {
        let record = Record {
            id: RecordId::from(7),
            create_time: Some(1),
            update_time: None,
            data: Note { text: "x".into() },
        };

        assert_eq!(
            record.to_json().unwrap(),
            serde_json::json!({ "id": 7, "createTime": 1, "text": "x" })
        );
    }

    #[test]
    fn payloads_must_be_maps() {
        let note = Note { text: "x".into() };

        assert_eq!(note.to_document().unwrap(), doc! { "text": "x" });
        assert_eq!(Note::from_document(doc! { "text": "y" }).unwrap(), Note { text: "y".into() });
    }
}
