//! Query expression evaluation for in-memory record filtering and sorting.
//!
//! Field names are resolved the way a document store resolves them: dotted paths descend into
//! sub-documents and array indexes, and the application identity field resolves to the
//! normalized internal identity.

use bson::{Bson, Document, datetime::DateTime};
use std::{borrow::Cow, cmp::Ordering, collections::HashMap};

use recordlayer_core::{
    error::RecordStoreError,
    id::{ID_FIELD, INTERNAL_ID_FIELD, normalize_id},
    path::get_path,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Resolves a field of a stored document.
pub(crate) fn resolve<'a>(document: &'a Document, field: &str) -> Option<Cow<'a, Bson>> {
    if field == ID_FIELD || field == INTERNAL_ID_FIELD {
        return document
            .get(INTERNAL_ID_FIELD)
            .map(|id| Cow::Owned(normalize_id(id.clone())));
    }

    get_path(document, field).map(Cow::Borrowed)
}

/// Returns `true` when two stored identities denote the same record.
pub(crate) fn same_identity(left: &Bson, right: &Bson) -> bool {
    let left = normalize_id(left.clone());
    let right = normalize_id(right.clone());

    Comparable::from(&left) == Comparable::from(&right)
}

/// Type-erased, comparable representation of BSON values.
///
/// Integers compare exactly regardless of their width; floats only meet integers as `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no natural ordering (binaries, object ids, ...), compared by equality only.
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(i64::from(*value)),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> Comparable<'a> {
    // Cross-type ordering: null < numbers < strings < maps < arrays < opaque < booleans < dates.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Integer(_) | Comparable::Double(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Opaque(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting mixed-type values.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Double(a), Comparable::Double(b)) => a == b,
            (Comparable::Integer(a), Comparable::Double(b)) | (Comparable::Double(b), Comparable::Integer(a)) => {
                *a as f64 == *b
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Double(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Double(a), Comparable::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders two (possibly missing) field values; missing sorts like null.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.sort_cmp(&right)
}

/// Evaluates filter expressions against one stored document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, RecordStoreError> {
        self.visit_expr(expr)
    }

    /// Returns `true` when the document matches the optional filter.
    pub fn matches(document: &'a Document, filter: Option<&Expr>) -> Result<bool, RecordStoreError> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

// Equality with array fields matching any element, as document stores do.
fn equals(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    match field_value {
        Comparable::Array(items) if !matches!(value, Comparable::Array(_)) => items.iter().any(|item| item == value),
        _ => field_value == value,
    }
}

fn any_of(field_value: &Comparable<'_>, values: &Comparable<'_>) -> bool {
    match values {
        Comparable::Array(values) => values.iter().any(|value| equals(field_value, value)),
        single => equals(field_value, single),
    }
}

fn contains(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    match (field_value, value) {
        (Comparable::Array(items), value) => items.iter().any(|item| item == value),
        (Comparable::String(left), Comparable::String(right)) => left.contains(right),
        _ => false,
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = RecordStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(resolve(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let resolved = resolve(self.document, field);
        let expected = Comparable::from(value);

        let Some(field_value) = resolved.as_deref() else {
            // A missing field only matches negative operators and equality with null.
            return Ok(match op {
                FieldOp::Eq => expected == Comparable::Null,
                FieldOp::Ne => expected != Comparable::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                _ => false,
            });
        };
        let actual = Comparable::from(field_value);

        Ok(match op {
            FieldOp::Eq => equals(&actual, &expected),
            FieldOp::Ne => !equals(&actual, &expected),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => match actual.partial_cmp(&expected) {
                Some(ordering) => match op {
                    FieldOp::Gt => ordering == Ordering::Greater,
                    FieldOp::Gte => ordering != Ordering::Less,
                    FieldOp::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                },
                None => false,
            },
            FieldOp::Contains => contains(&actual, &expected),
            FieldOp::NotContains => !contains(&actual, &expected),
            FieldOp::StartsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_of(&actual, &expected),
            FieldOp::NoneOf => !any_of(&actual, &expected),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use recordlayer_core::query::Filter;

    fn matches(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::new(document).evaluate(&expr).unwrap()
    }

    #[test]
    fn resolves_the_identity_through_normalization() {
        let oid = ObjectId::new();
        let document = doc! { "_id": oid, "name": "Alice" };

        assert!(matches(&document, Filter::id(oid.to_hex())));
        assert!(!matches(&document, Filter::id("other")));
    }

    #[test]
    fn numbers_compare_across_widths() {
        let document = doc! { "_id": 7_i32, "age": 30_i64 };

        assert!(matches(&document, Filter::id(7_i64)));
        assert!(matches(&document, Filter::gte("age", 30)));
        assert!(!matches(&document, Filter::lt("age", 30.0)));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 1_234_567_890_123_456_789_i64;
        let document = doc! { "_id": big, "seq": big };

        assert!(!same_identity(&Bson::Int64(big), &Bson::Int64(big - 1)));
        assert!(same_identity(&Bson::Int64(big), &Bson::Int64(big)));
        assert!(!matches(&document, Filter::id(big - 1)));
        assert!(matches(&document, Filter::gt("seq", big - 1)));
        assert_eq!(
            compare_values(Some(&Bson::Int64(big)), Some(&Bson::Int64(big - 1))),
            Ordering::Greater
        );
    }

    #[test]
    fn walks_dotted_paths_and_arrays() {
        let document = doc! { "profile": { "city": "Oslo" }, "tags": ["a", "b"] };

        assert!(matches(&document, Filter::eq("profile.city", "Oslo")));
        assert!(matches(&document, Filter::eq("tags", "a")));
        assert!(matches(&document, Filter::any_of("tags", vec!["x", "b"])));
        assert!(matches(&document, Filter::none_of("tags", vec!["x", "y"])));
        assert!(matches(&document, Filter::not_exists("profile.zip")));
    }

    #[test]
    fn missing_fields_match_negations_only() {
        let document = doc! { "a": 1 };

        assert!(matches(&document, Filter::ne("b", 1)));
        assert!(matches(&document, Filter::eq("b", Bson::Null)));
        assert!(!matches(&document, Filter::gt("b", 0)));
        assert!(!matches(&document, Filter::eq("b", 1)));
    }

    #[test]
    fn sorts_mixed_types_by_rank() {
        assert_eq!(compare_values(None, Some(&Bson::Int32(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Int32(2)), Some(&Bson::Double(1.5))), Ordering::Greater);
        assert_eq!(compare_values(Some(&Bson::String("a".into())), Some(&Bson::Int32(5))), Ordering::Greater);
    }
}
