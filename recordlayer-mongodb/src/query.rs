//! Query translation from the recordlayer AST to MongoDB query syntax.
//!
//! The application identity field is renamed to `_id`. Identifier values that are the canonical
//! string form of an `ObjectId` or a UUID also match the stored binary value, so records whose
//! identity was generated by the server can be addressed by the string callers receive.

use bson::{Bson, Document, doc, oid::ObjectId};

use recordlayer_core::{
    error::{RecordStoreError, RecordStoreResult},
    id::{ID_FIELD, INTERNAL_ID_FIELD},
    query::{Expr, FieldOp, QueryVisitor, Sort},
};

/// Translates recordlayer query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches every document.
    pub fn filter(filter: Option<&Expr>) -> RecordStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }

    /// Translates sort keys, keeping their priority order.
    pub fn sort(sort: &[Sort]) -> Option<Document> {
        if sort.is_empty() {
            return None;
        }

        Some(
            sort.iter()
                .map(|key| (field_name(&key.field).to_string(), Bson::Int32(key.direction.value())))
                .collect(),
        )
    }

    /// Translates a projection. The identity is always returned.
    pub fn projection(fields: &[String]) -> Document {
        let mut projection = doc! { INTERNAL_ID_FIELD: 1 };

        for field in fields {
            projection.insert(field_name(field), 1);
        }

        projection
    }
}

fn field_name(field: &str) -> &str {
    match field {
        ID_FIELD => INTERNAL_ID_FIELD,
        other => other,
    }
}

/// Every stored form an application identifier may have.
fn identity_candidates(value: &Bson) -> Vec<Bson> {
    let mut candidates = vec![value.clone()];

    if let Bson::String(value) = value {
        if let Ok(oid) = ObjectId::parse_str(value) {
            candidates.push(Bson::ObjectId(oid));
        }

        if let Ok(uuid) = bson::Uuid::parse_str(value) {
            candidates.push(Bson::from(uuid));
        }
    }

    candidates
}

fn identity_list(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Array(values) => values.iter().flat_map(identity_candidates).collect(),
        single => identity_candidates(single),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = RecordStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        let negated = self.visit_expr(expr)?;

        Ok(doc! {
            "$nor": [negated],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field_name(field): { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        if field == ID_FIELD {
            match op {
                FieldOp::Eq => return Ok(doc! { INTERNAL_ID_FIELD: { "$in": identity_candidates(value) } }),
                FieldOp::Ne => return Ok(doc! { INTERNAL_ID_FIELD: { "$nin": identity_candidates(value) } }),
                FieldOp::AnyOf => return Ok(doc! { INTERNAL_ID_FIELD: { "$in": identity_list(value) } }),
                FieldOp::NoneOf => return Ok(doc! { INTERNAL_ID_FIELD: { "$nin": identity_list(value) } }),
                _ => {}
            }
        }

        Ok(doc! {
            field_name(field): match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": regex::escape(s) },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$all": [other] },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": regex::escape(s) } },
                    Bson::Array(arr) => doc! { "$not": { "$all": arr } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", regex::escape(s)) },
                    _ => return Err(RecordStoreError::InvalidArgument("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", regex::escape(s)) },
                    _ => return Err(RecordStoreError::InvalidArgument("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => match value {
                    Bson::Array(arr) => doc! { "$in": arr },
                    other => doc! { "$in": [other] },
                },
                FieldOp::NoneOf => match value {
                    Bson::Array(arr) => doc! { "$nin": arr },
                    other => doc! { "$nin": [other] },
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_core::query::{Filter, Query, SortDirection};

    #[test]
    fn identity_filters_match_every_stored_form() {
        let oid = ObjectId::new();
        let filter = MongoQueryTranslator::filter(Some(&Filter::id(oid.to_hex()))).unwrap();

        assert_eq!(filter, doc! { "_id": { "$in": [oid.to_hex(), oid] } });
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::id("u1"))).unwrap(),
            doc! { "_id": { "$in": ["u1"] } }
        );
    }

    #[test]
    fn translates_compound_filters() {
        let expr = Filter::eq("status", "active")
            .and(Filter::gte("age", 18))
            .and(Filter::starts_with("name", "a.b").not());

        assert_eq!(
            MongoQueryTranslator::filter(Some(&expr)).unwrap(),
            doc! {
                "$and": [
                    { "status": { "$eq": "active" } },
                    { "age": { "$gte": 18 } },
                    { "$nor": [{ "name": { "$regex": "^a\\.b" } }] },
                ]
            }
        );
        assert_eq!(MongoQueryTranslator::filter(None).unwrap(), Document::new());
    }

    #[test]
    fn sort_and_projection_use_the_internal_identity() {
        let query = Query::builder()
            .sort("createTime", SortDirection::Desc)
            .sort("id", SortDirection::Asc)
            .build();

        assert_eq!(
            MongoQueryTranslator::sort(&query.sort),
            Some(doc! { "createTime": -1, "_id": 1 })
        );
        assert_eq!(MongoQueryTranslator::sort(&[]), None);
        assert_eq!(
            MongoQueryTranslator::projection(&["id".to_string(), "name".to_string()]),
            doc! { "_id": 1, "name": 1 }
        );
    }

    #[test]
    fn substring_filters_match_literally() {
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::contains("title", "(c++) $5?"))).unwrap(),
            doc! { "title": { "$regex": "\\(c\\+\\+\\) \\$5\\?" } }
        );
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::ends_with("file", "[1].txt"))).unwrap(),
            doc! { "file": { "$regex": "\\[1\\]\\.txt$" } }
        );
    }

    #[test]
    fn rejects_prefix_matches_on_non_strings() {
        assert!(matches!(
            MongoQueryTranslator::filter(Some(&Filter::starts_with("n", 1))),
            Err(RecordStoreError::InvalidArgument(_))
        ));
    }
}
