//! Record identifiers and identity normalization.
//!
//! Backends store a record's identity under an internal field ([`INTERNAL_ID_FIELD`]) and may
//! generate opaque values for it (MongoDB `ObjectId`s, binary UUIDs). Callers never see either:
//! every document leaving the store passes through [`restore_document`], which moves the identity to
//! the application field [`ID_FIELD`] and renders opaque values as their canonical strings.
//!
//! Going the other way is the identity function. A caller always queries with the application
//! form of the identifier and the backend is trusted to match it against whatever it stored.

use bson::{Bson, Document, oid::ObjectId, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the identity field as seen by callers.
pub const ID_FIELD: &str = "id";

/// Name of the identity field as persisted by the backends.
pub const INTERNAL_ID_FIELD: &str = "_id";

/// Application-facing record identifier.
///
/// Identifiers are either strings or integers. Store-generated identities always surface as
/// [`RecordId::String`] holding their canonical string encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// A numeric identifier.
    Int(i64),
    /// A string identifier (including normalized store-generated identities).
    String(String),
}

impl RecordId {
    /// Generates a random (v4 UUID) string identifier for callers that assign ids client-side.
    pub fn new_uuid() -> Self {
        RecordId::String(uuid::Uuid::new_v4().to_string())
    }

    /// Converts this identifier into the BSON value used as a query key.
    pub fn to_bson(&self) -> Bson {
        match self {
            RecordId::Int(value) => Bson::Int64(*value),
            RecordId::String(value) => Bson::String(value.clone()),
        }
    }

    /// Builds an identifier from a stored identity value.
    ///
    /// The value is normalized first, so `ObjectId`s and binary UUIDs are accepted. Returns `None`
    /// for values that have no application-facing form (documents, arrays, floats, ...).
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match normalize_id(value.clone()) {
            Bson::String(value) => Some(RecordId::String(value)),
            Bson::Int32(value) => Some(RecordId::Int(value as i64)),
            Bson::Int64(value) => Some(RecordId::Int(value)),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(value) => write!(f, "{value}"),
            RecordId::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::String(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::String(value)
    }
}

impl From<&String> for RecordId {
    fn from(value: &String) -> Self {
        RecordId::String(value.clone())
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        RecordId::Int(value as i64)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<ObjectId> for RecordId {
    fn from(value: ObjectId) -> Self {
        RecordId::String(value.to_hex())
    }
}

impl From<bson::Uuid> for RecordId {
    fn from(value: bson::Uuid) -> Self {
        RecordId::String(value.to_string())
    }
}

impl From<&RecordId> for RecordId {
    fn from(value: &RecordId) -> Self {
        value.clone()
    }
}

impl From<RecordId> for Bson {
    fn from(value: RecordId) -> Self {
        value.to_bson()
    }
}

/// Converts an internal identity value to its application-facing form.
///
/// `ObjectId`s become their hex string and UUID binaries their hyphenated string; numbers, strings
/// and any other value are returned unchanged.
pub fn normalize_id(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::Binary(binary) if matches!(binary.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld) => {
            match <[u8; 16]>::try_from(binary.bytes.as_slice()) {
                Ok(bytes) => Bson::String(uuid::Uuid::from_bytes(bytes).to_string()),
                Err(_) => Bson::Binary(binary),
            }
        }
        other => other,
    }
}

/// Restores a raw backend document to the caller-facing shape.
///
/// The internal identity field is removed and re-inserted, normalized, as the leading
/// [`ID_FIELD`] entry. Documents without an internal identity (e.g. projected away) are returned
/// with their remaining fields untouched. Any stale [`ID_FIELD`] entry is overwritten.
pub fn restore_document(mut document: Document) -> Document {
    match document.remove(INTERNAL_ID_FIELD) {
        Some(id) => {
            document.remove(ID_FIELD);

            let mut restored = Document::new();
            restored.insert(ID_FIELD, normalize_id(id));
            for (key, value) in document {
                restored.insert(key, value);
            }
            restored
        }
        None => document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Binary, doc};

    #[test]
    fn object_ids_normalize_to_hex() {
        let oid = ObjectId::new();

        assert_eq!(normalize_id(Bson::ObjectId(oid)), Bson::String(oid.to_hex()));
        assert_eq!(RecordId::from_bson(&Bson::ObjectId(oid)), Some(RecordId::String(oid.to_hex())));
    }

    #[test]
    fn uuid_binaries_normalize_to_hyphenated_strings() {
        let uuid = uuid::Uuid::new_v4();
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: uuid.as_bytes().to_vec(),
        });

        assert_eq!(normalize_id(binary), Bson::String(uuid.to_string()));
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(normalize_id(Bson::Int32(7)), Bson::Int32(7));
        assert_eq!(normalize_id(Bson::String("abc".into())), Bson::String("abc".into()));
        assert_eq!(normalize_id(Bson::Boolean(true)), Bson::Boolean(true));
        assert_eq!(RecordId::from_bson(&Bson::Int32(7)), Some(RecordId::Int(7)));
        assert_eq!(RecordId::from_bson(&Bson::Double(1.5)), None);
    }

    #[test]
    fn restore_moves_identity_to_the_front() {
        let oid = ObjectId::new();
        let restored = restore_document(doc! { "x": 1, "_id": oid, "id": "stale" });

        assert_eq!(restored, doc! { "id": oid.to_hex(), "x": 1 });
        assert_eq!(restored.keys().next().map(String::as_str), Some(ID_FIELD));
    }

    #[test]
    fn restore_without_identity_keeps_fields() {
        assert_eq!(restore_document(doc! { "x": 1 }), doc! { "x": 1 });
    }

    #[test]
    fn ids_display_in_canonical_form() {
        assert_eq!(RecordId::from(42).to_string(), "42");
        assert_eq!(RecordId::from("user-1").to_string(), "user-1");
        assert_eq!(RecordId::from(42).to_bson(), Bson::Int64(42));
    }
}
