//! Change sets and the update-directive compiler.
//!
//! A [`ChangeSet`] describes a partial, non-destructive modification of a record: fields to
//! replace, fields to remove, and structured directives (increment, append, append-unique,
//! remove-from-array). Compiling a change set yields an [`UpdateBundle`], one operand map per
//! mutation category, which backends apply as a single merge-update.
//!
//! Change sets are usually built explicitly:
//!
//! ```ignore
//! use recordlayer_core::change::ChangeSet;
//!
//! let changes = ChangeSet::new()
//!     .set("name", "Alice")
//!     .unset("nickname")
//!     .increment("logins", 1)
//!     .add_to_set("tags", "admin");
//! ```
//!
//! Flat change objects in the store's native operator syntax are also accepted through
//! [`ChangeSet::from_document`]; see its documentation for the classification rules.

use bson::{Bson, Document};

use crate::{
    error::{RecordStoreError, RecordStoreResult},
    id::{ID_FIELD, INTERNAL_ID_FIELD},
    path::{ALL_ELEMENTS, expand_all_elements, get_path, get_path_mut, paths_overlap, remove_path, set_path},
    record::{CREATE_TIME_FIELD, UPDATE_TIME_FIELD},
};

/// Prefix shared by every store-level operator name.
pub const DIRECTIVE_SIGIL: char = '$';

/// Store-level operator names, one per mutation category.
pub mod operator {
    pub const SET: &str = "$set";
    pub const UNSET: &str = "$unset";
    pub const INC: &str = "$inc";
    pub const PUSH: &str = "$push";
    pub const ADD_TO_SET: &str = "$addToSet";
    pub const PULL: &str = "$pull";
    /// Modifier turning a single append operand into a list of values.
    pub const EACH: &str = "$each";
    /// Condition matching any of a list of values in a remove-from-array operand.
    pub const IN: &str = "$in";
}

/// Fields managed by the store itself. They are stripped from every caller-supplied payload.
pub const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, INTERNAL_ID_FIELD, CREATE_TIME_FIELD, UPDATE_TIME_FIELD];

/// Returns `true` when `path` addresses a reserved field or one of its children.
pub fn is_reserved(path: &str) -> bool {
    let head = path.split('.').next().unwrap_or(path);
    RESERVED_FIELDS.contains(&head)
}

/// Mutation category of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveCategory {
    Replace,
    Remove,
    Increment,
    Append,
    AppendUnique,
    RemoveFromArray,
}

impl DirectiveCategory {
    /// Returns the store-level operator name for this category.
    pub fn operator(&self) -> &'static str {
        match self {
            DirectiveCategory::Replace => operator::SET,
            DirectiveCategory::Remove => operator::UNSET,
            DirectiveCategory::Increment => operator::INC,
            DirectiveCategory::Append => operator::PUSH,
            DirectiveCategory::AppendUnique => operator::ADD_TO_SET,
            DirectiveCategory::RemoveFromArray => operator::PULL,
        }
    }
}

/// A single entry of a change set.
///
/// Directive variants carry a `target field -> operand` map which is forwarded to the store
/// without inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Set a field to a value.
    Replace(String, Bson),
    /// Remove a field.
    Remove(String),
    /// Increment numeric fields by the given amounts.
    Increment(Document),
    /// Append values to array fields.
    Append(Document),
    /// Append values to array fields unless already present.
    AppendUnique(Document),
    /// Remove matching values from array fields.
    RemoveFromArray(Document),
}

impl Change {
    /// Returns the mutation category of this change.
    pub fn category(&self) -> DirectiveCategory {
        match self {
            Change::Replace(..) => DirectiveCategory::Replace,
            Change::Remove(_) => DirectiveCategory::Remove,
            Change::Increment(_) => DirectiveCategory::Increment,
            Change::Append(_) => DirectiveCategory::Append,
            Change::AppendUnique(_) => DirectiveCategory::AppendUnique,
            Change::RemoveFromArray(_) => DirectiveCategory::RemoveFromArray,
        }
    }

    /// Returns the field paths this change writes to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Change::Replace(field, _) | Change::Remove(field) => vec![field.as_str()],
            Change::Increment(operand)
            | Change::Append(operand)
            | Change::AppendUnique(operand)
            | Change::RemoveFromArray(operand) => operand.keys().map(String::as_str).collect(),
        }
    }

    fn operand_mut(&mut self) -> Option<&mut Document> {
        match self {
            Change::Increment(operand)
            | Change::Append(operand)
            | Change::AppendUnique(operand)
            | Change::RemoveFromArray(operand) => Some(operand),
            _ => None,
        }
    }
}

/// An ordered collection of [`Change`]s describing one merge-update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self { changes: Vec::new() }
    }

    /// Builds a change set from a flat change object.
    ///
    /// Entries are classified in this order:
    ///
    /// 1. `$inc`, `$push`, `$addToSet` and `$pull` become the matching directive, operand untouched;
    /// 2. any other entry whose value is null becomes a [`Change::Remove`];
    /// 3. entries whose name does not start with `$` become a [`Change::Replace`];
    /// 4. remaining `$`-prefixed entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidDocument`] when a directive operand is not a map.
    pub fn from_document(document: Document) -> RecordStoreResult<Self> {
        let mut changes = Vec::with_capacity(document.len());

        for (name, value) in document {
            let directive: Option<(&str, fn(Document) -> Change)> = match name.as_str() {
                operator::INC => Some(("increment", Change::Increment)),
                operator::PUSH => Some(("append", Change::Append)),
                operator::ADD_TO_SET => Some(("append-unique", Change::AppendUnique)),
                operator::PULL => Some(("remove-from-array", Change::RemoveFromArray)),
                _ => None,
            };

            match (directive, value) {
                (Some((_, directive)), Bson::Document(operand)) => changes.push(directive(operand)),
                (Some((category, _)), other) => {
                    return Err(RecordStoreError::InvalidDocument(format!(
                        "The {category} directive {name} takes a map of field paths to operands, got {other}"
                    )));
                }
                (None, Bson::Null) => changes.push(Change::Remove(name)),
                (None, value) if !name.starts_with(DIRECTIVE_SIGIL) => changes.push(Change::Replace(name, value)),
                (None, _) => {}
            }
        }

        Ok(Self { changes })
    }

    /// Returns the changes in insertion order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Returns `true` if the change set has no entries.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Appends an arbitrary change.
    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    /// Appends an arbitrary change in place.
    pub fn push_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Sets `field` to `value`.
    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with_change(Change::Replace(field.into(), value.into()))
    }

    /// Removes `field`.
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with_change(Change::Remove(field.into()))
    }

    /// Increments `field` by `amount`.
    pub fn increment(self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.directive(DirectiveCategory::Increment, field.into(), amount.into())
    }

    /// Appends `value` to the array `field`.
    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.directive(DirectiveCategory::Append, field.into(), value.into())
    }

    /// Appends every value to the array `field`.
    pub fn push_each<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.directive(DirectiveCategory::Append, field.into(), each(values))
    }

    /// Appends `value` to the array `field` unless it is already present.
    pub fn add_to_set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.directive(DirectiveCategory::AppendUnique, field.into(), value.into())
    }

    /// Appends every value not already present to the array `field`.
    pub fn add_each_to_set<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.directive(DirectiveCategory::AppendUnique, field.into(), each(values))
    }

    /// Removes every element equal to `value` from the array `field`.
    pub fn pull(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.directive(DirectiveCategory::RemoveFromArray, field.into(), value.into())
    }

    /// Removes every element equal to one of `values` from the array `field`.
    pub fn pull_any<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<Bson>>();
        let mut operand = Document::new();
        operand.insert(operator::IN, values);

        self.directive(DirectiveCategory::RemoveFromArray, field.into(), Bson::Document(operand))
    }

    // Builder entries of one category share a single operand map.
    fn directive(mut self, category: DirectiveCategory, field: String, value: Bson) -> Self {
        let existing = self
            .changes
            .iter_mut()
            .rev()
            .find(|change| change.category() == category)
            .and_then(Change::operand_mut);

        match existing {
            Some(operand) => {
                operand.insert(field, value);
            }
            None => {
                let mut operand = Document::new();
                operand.insert(field, value);

                self.changes.push(match category {
                    DirectiveCategory::Increment => Change::Increment(operand),
                    DirectiveCategory::Append => Change::Append(operand),
                    DirectiveCategory::AppendUnique => Change::AppendUnique(operand),
                    _ => Change::RemoveFromArray(operand),
                });
            }
        }

        self
    }

    /// Removes every entry addressing a reserved field.
    ///
    /// Directive operands lose their reserved targets; directives left without targets are dropped.
    pub fn strip_reserved(self) -> Self {
        let changes = self
            .changes
            .into_iter()
            .filter_map(|mut change| {
                let field_reserved = match &change {
                    Change::Replace(field, _) | Change::Remove(field) => Some(is_reserved(field)),
                    _ => None,
                };

                if let Some(reserved) = field_reserved {
                    return (!reserved).then_some(change);
                }

                let operand = change.operand_mut()?;
                let reserved = operand
                    .keys()
                    .filter(|key| is_reserved(key))
                    .cloned()
                    .collect::<Vec<_>>();

                for key in reserved {
                    operand.remove(&key);
                }

                (!operand.is_empty()).then_some(change)
            })
            .collect();

        Self { changes }
    }

    /// Removes every removal and every null-valued replacement.
    ///
    /// Used on the creation path, where there is nothing to remove yet and a record is never
    /// created with a null-valued field.
    pub fn drop_nulls(self) -> Self {
        let changes = self
            .changes
            .into_iter()
            .filter(|change| !matches!(change, Change::Remove(_) | Change::Replace(_, Bson::Null)))
            .collect();

        Self { changes }
    }

    /// Compiles the change set into an [`UpdateBundle`].
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::ConflictingChange`] when one field (or a field and one of its
    /// children) is targeted by two different categories, or by one category through two
    /// different overlapping paths.
    pub fn compile(self) -> RecordStoreResult<UpdateBundle> {
        let mut claimed: Vec<(String, DirectiveCategory)> = Vec::new();

        for change in &self.changes {
            let category = change.category();

            for target in change.targets() {
                let conflict = claimed.iter().any(|(path, other)| {
                    paths_overlap(path, target) && (*other != category || path != target)
                });

                if conflict {
                    return Err(RecordStoreError::ConflictingChange(target.to_string()));
                }

                claimed.push((target.to_string(), category));
            }
        }

        let mut bundle = UpdateBundle::default();

        for change in self.changes {
            match change {
                Change::Replace(field, value) => {
                    bundle.set.insert(field, value);
                }
                Change::Remove(field) => {
                    bundle.unset.insert(field, "");
                }
                Change::Increment(operand) => merge(&mut bundle.inc, operand),
                Change::Append(operand) => merge(&mut bundle.push, operand),
                Change::AppendUnique(operand) => merge(&mut bundle.add_to_set, operand),
                Change::RemoveFromArray(operand) => merge(&mut bundle.pull, operand),
            }
        }

        Ok(bundle)
    }
}

impl From<Change> for ChangeSet {
    fn from(change: Change) -> Self {
        Self { changes: vec![change] }
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        Self { changes: iter.into_iter().collect() }
    }
}

/// Conversion into a [`ChangeSet`], accepted by every write operation.
pub trait IntoChangeSet {
    fn into_change_set(self) -> RecordStoreResult<ChangeSet>;
}

impl IntoChangeSet for ChangeSet {
    fn into_change_set(self) -> RecordStoreResult<ChangeSet> {
        Ok(self)
    }
}

impl IntoChangeSet for Document {
    fn into_change_set(self) -> RecordStoreResult<ChangeSet> {
        ChangeSet::from_document(self)
    }
}

fn each<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
    let values = values.into_iter().map(Into::into).collect::<Vec<Bson>>();
    let mut operand = Document::new();
    operand.insert(operator::EACH, values);

    Bson::Document(operand)
}

fn merge(target: &mut Document, operand: Document) {
    for (field, value) in operand {
        target.insert(field, value);
    }
}

/// A compiled merge-update: one operand map per mutation category.
///
/// Empty categories are omitted when rendered with [`UpdateBundle::to_document`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBundle {
    pub set: Document,
    pub unset: Document,
    pub inc: Document,
    pub push: Document,
    pub add_to_set: Document,
    pub pull: Document,
}

impl UpdateBundle {
    /// Returns `true` when no category has any target.
    pub fn is_empty(&self) -> bool {
        self.categories()
            .iter()
            .all(|(_, operand)| operand.is_empty())
    }

    /// Adds the `updateTime` stamp to the replace category.
    pub fn stamp_update_time(&mut self, millis: i64) {
        self.set.insert(UPDATE_TIME_FIELD, Bson::Int64(millis));
    }

    /// Renders the bundle in the store's native update syntax, e.g.
    /// `{ "$set": { "a": 1 }, "$unset": { "b": "" } }`.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();

        for (name, operand) in self.categories() {
            if !operand.is_empty() {
                document.insert(name, operand.clone());
            }
        }

        document
    }

    fn categories(&self) -> [(&'static str, &Document); 6] {
        [
            (operator::SET, &self.set),
            (operator::UNSET, &self.unset),
            (operator::INC, &self.inc),
            (operator::PUSH, &self.push),
            (operator::ADD_TO_SET, &self.add_to_set),
            (operator::PULL, &self.pull),
        ]
    }

    /// Applies the bundle to `document` in place and reports whether anything changed.
    ///
    /// `$[]` segments address every element of an existing array. The other positional
    /// operators (`$`, `$[<id>]`) need a query or array filters and are not supported here.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidDocument`] when a directive meets a value of the wrong
    /// type (incrementing a string, appending to a non-array, ...) or a `$[]` segment meets a
    /// missing array, and [`RecordStoreError::InvalidArgument`] for the other positional paths.
    pub fn apply_to(&self, document: &mut Document) -> RecordStoreResult<bool> {
        for (_, operand) in self.categories() {
            let positional = operand.keys().find(|path| {
                path.split('.')
                    .any(|segment| segment.starts_with(DIRECTIVE_SIGIL) && segment != ALL_ELEMENTS)
            });

            if let Some(path) = positional {
                return Err(RecordStoreError::InvalidArgument(format!(
                    "Positional path {path} is not supported"
                )));
            }
        }

        let before = document.clone();

        for (path, value) in &self.set {
            for path in expand_all_elements(document, path)? {
                set_path(document, &path, value.clone())?;
            }
        }

        for path in self.unset.keys() {
            for path in expand_all_elements(document, path)? {
                remove_path(document, &path);
            }
        }

        for (path, amount) in expand(document, &self.inc)? {
            match get_path_mut(document, &path) {
                Some(current) => {
                    *current = add_numbers(current, amount).ok_or_else(|| {
                        RecordStoreError::InvalidDocument(format!(
                            "Cannot increment field {path} holding {current} by {amount}"
                        ))
                    })?;
                }
                None if is_number(amount) => set_path(document, &path, amount.clone())?,
                None => {
                    return Err(RecordStoreError::InvalidDocument(format!(
                        "Cannot increment field {path} by non-numeric {amount}"
                    )));
                }
            }
        }

        for (path, operand) in expand(document, &self.push)? {
            append(document, &path, operand, false)?;
        }

        for (path, operand) in expand(document, &self.add_to_set)? {
            append(document, &path, operand, true)?;
        }

        for (path, condition) in expand(document, &self.pull)? {
            match get_path_mut(document, &path) {
                Some(Bson::Array(items)) => items.retain(|item| !pull_matches(condition, item)),
                Some(other) => {
                    return Err(RecordStoreError::InvalidDocument(format!(
                        "Cannot remove from non-array field {path} holding {other}"
                    )));
                }
                None => {}
            }
        }

        Ok(*document != before)
    }
}

// Concrete (path, operand) pairs, with `$[]` resolved against the current document.
fn expand<'a>(document: &Document, operand: &'a Document) -> RecordStoreResult<Vec<(String, &'a Bson)>> {
    let mut expanded = Vec::new();

    for (path, value) in operand {
        for path in expand_all_elements(document, path)? {
            expanded.push((path, value));
        }
    }

    Ok(expanded)
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn add_numbers(current: &Bson, amount: &Bson) -> Option<Bson> {
    match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_add(*b)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        ),
        (Bson::Int32(a), Bson::Int64(b)) => (*a as i64).checked_add(*b).map(Bson::Int64),
        (Bson::Int64(a), Bson::Int32(b)) => a.checked_add(*b as i64).map(Bson::Int64),
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64),
        (Bson::Double(a), b) => as_f64(b).map(|b| Bson::Double(a + b)),
        (a, Bson::Double(b)) => as_f64(a).map(|a| Bson::Double(a + b)),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn append(document: &mut Document, path: &str, operand: &Bson, unique: bool) -> RecordStoreResult<()> {
    let values = match operand {
        Bson::Document(modifiers) if modifiers.contains_key(operator::EACH) => match modifiers.get(operator::EACH) {
            Some(Bson::Array(values)) => values.clone(),
            _ => {
                return Err(RecordStoreError::InvalidDocument(format!(
                    "{} for field {path} must be an array",
                    operator::EACH
                )));
            }
        },
        single => vec![single.clone()],
    };

    if get_path(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }

    match get_path_mut(document, path) {
        Some(Bson::Array(items)) => {
            for value in values {
                if !unique || !items.contains(&value) {
                    items.push(value);
                }
            }
            Ok(())
        }
        Some(other) => Err(RecordStoreError::InvalidDocument(format!(
            "Cannot append to non-array field {path} holding {other}"
        ))),
        None => Err(RecordStoreError::InvalidDocument(format!("Cannot create array field {path}"))),
    }
}

fn pull_matches(condition: &Bson, item: &Bson) -> bool {
    match condition {
        Bson::Document(modifiers) if modifiers.len() == 1 && modifiers.contains_key(operator::IN) => {
            match modifiers.get(operator::IN) {
                Some(Bson::Array(values)) => values.contains(item),
                _ => false,
            }
        }
        value => value == item,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn classifies_flat_change_objects() {
        let changes = ChangeSet::from_document(doc! {
            "name": "Alice",
            "nickname": Bson::Null,
            "$inc": { "logins": 1 },
            "$push": { "history": "login" },
            "$addToSet": { "tags": "admin" },
            "$pull": { "flags": "new" },
            "$rename": { "a": "b" },
        })
        .unwrap();

        assert_eq!(
            changes.changes(),
            &[
                Change::Replace("name".into(), "Alice".into()),
                Change::Remove("nickname".into()),
                Change::Increment(doc! { "logins": 1 }),
                Change::Append(doc! { "history": "login" }),
                Change::AppendUnique(doc! { "tags": "admin" }),
                Change::RemoveFromArray(doc! { "flags": "new" }),
            ]
        );
    }

    #[test]
    fn null_check_precedes_the_sigil_check() {
        let changes = ChangeSet::from_document(doc! { "$weird": Bson::Null }).unwrap();

        assert_eq!(changes.changes(), &[Change::Remove("$weird".into())]);
    }

    #[test]
    fn rejects_directive_operands_that_are_not_maps() {
        assert!(matches!(
            ChangeSet::from_document(doc! { "$inc": 1 }),
            Err(RecordStoreError::InvalidDocument(message)) if message.contains("increment directive $inc")
        ));
        assert!(matches!(
            ChangeSet::from_document(doc! { "$pull": "x" }),
            Err(RecordStoreError::InvalidDocument(message)) if message.contains("remove-from-array directive")
        ));
    }

    #[test]
    fn compiles_one_map_per_category() {
        let bundle = ChangeSet::new()
            .set("a", 1)
            .set("b", 2)
            .unset("c")
            .unset("d")
            .increment("n", 1)
            .increment("m", 5)
            .compile()
            .unwrap();

        assert_eq!(
            bundle.to_document(),
            doc! {
                "$set": { "a": 1, "b": 2 },
                "$unset": { "c": "", "d": "" },
                "$inc": { "n": 1, "m": 5 },
            }
        );
    }

    #[test]
    fn directive_operands_are_forwarded_verbatim() {
        let operand = doc! { "items.$[elem].qty": 2 };
        let bundle = ChangeSet::from(Change::Increment(operand.clone()))
            .compile()
            .unwrap();

        assert_eq!(bundle.inc, operand);
        assert!(bundle.set.is_empty());
    }

    #[test]
    fn rejects_replace_and_directive_on_the_same_field() {
        let result = ChangeSet::from_document(doc! { "count": 3, "$inc": { "count": 1 } })
            .unwrap()
            .compile();

        assert!(matches!(result, Err(RecordStoreError::ConflictingChange(field)) if field == "count"));
    }

    #[test]
    fn rejects_parent_and_child_paths() {
        let result = ChangeSet::new()
            .set("profile", doc! { "name": "x" })
            .unset("profile.age")
            .compile();

        assert!(matches!(result, Err(RecordStoreError::ConflictingChange(_))));
    }

    #[test]
    fn strips_reserved_fields_everywhere() {
        let changes = ChangeSet::from_document(doc! {
            "id": "forged",
            "_id": "forged",
            "createTime": 1,
            "updateTime": Bson::Null,
            "name": "x",
            "$inc": { "createTime": 1 },
            "$push": { "updateTime.x": 1, "log": 1 },
        })
        .unwrap()
        .strip_reserved();

        assert_eq!(
            changes.changes(),
            &[
                Change::Replace("name".into(), "x".into()),
                Change::Append(doc! { "log": 1 }),
            ]
        );
    }

    #[test]
    fn drop_nulls_keeps_only_non_null_values() {
        let changes = ChangeSet::new()
            .set("a", 1)
            .set("b", Bson::Null)
            .unset("c")
            .drop_nulls();

        assert_eq!(changes.changes(), &[Change::Replace("a".into(), 1.into())]);
    }

    #[test]
    fn applies_directives_to_documents() {
        let mut document = doc! { "n": 1, "tags": ["a"], "flags": ["x", "y", "x"], "gone": true };
        let bundle = ChangeSet::new()
            .set("profile.name", "Alice")
            .unset("gone")
            .increment("n", 2)
            .increment("fresh", 1.5)
            .push_each("log", ["one", "two"])
            .add_each_to_set("tags", ["a", "b"])
            .pull("flags", "x")
            .compile()
            .unwrap();

        assert!(bundle.apply_to(&mut document).unwrap());
        assert_eq!(
            document,
            doc! {
                "n": 3,
                "tags": ["a", "b"],
                "flags": ["y"],
                "profile": { "name": "Alice" },
                "fresh": 1.5,
                "log": ["one", "two"],
            }
        );
    }

    #[test]
    fn pull_any_removes_every_listed_value() {
        let mut document = doc! { "flags": [1, 2, 3, 2] };
        ChangeSet::new()
            .pull_any("flags", [2, 3])
            .compile()
            .unwrap()
            .apply_to(&mut document)
            .unwrap();

        assert_eq!(document, doc! { "flags": [1] });
    }

    #[test]
    fn refuses_to_increment_strings() {
        let mut document = doc! { "n": "one" };
        let bundle = ChangeSet::new()
            .increment("n", 1)
            .compile()
            .unwrap();

        assert!(matches!(bundle.apply_to(&mut document), Err(RecordStoreError::InvalidDocument(_))));
    }

    #[test]
    fn applies_directives_to_every_array_element() {
        let mut document = doc! { "items": [ { "qty": 1 }, { "qty": 4 } ] };
        let bundle = ChangeSet::from_document(doc! { "$inc": { "items.$[].qty": 1 } })
            .unwrap()
            .compile()
            .unwrap();

        assert!(bundle.apply_to(&mut document).unwrap());
        assert_eq!(document, doc! { "items": [ { "qty": 2 }, { "qty": 5 } ] });

        assert!(matches!(
            bundle.apply_to(&mut doc! {}),
            Err(RecordStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn refuses_filtered_positional_paths() {
        let bundle = ChangeSet::from_document(doc! { "$set": { "items.$[elem].qty": 0 } })
            .unwrap()
            .compile()
            .unwrap();

        assert!(matches!(
            bundle.apply_to(&mut doc! { "items": [] }),
            Err(RecordStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reports_unchanged_documents() {
        let mut document = doc! { "a": 1 };
        let bundle = ChangeSet::new()
            .set("a", 1)
            .unset("missing")
            .compile()
            .unwrap();

        assert!(!bundle.apply_to(&mut document).unwrap());
    }
}
