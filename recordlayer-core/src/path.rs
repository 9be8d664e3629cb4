//! Dotted field-path access on BSON documents.
//!
//! Paths use the document-store convention: segments separated by `.`, with numeric segments
//! indexing into arrays (`"items.0.name"`).

use bson::{Bson, Document};

use crate::error::{RecordStoreError, RecordStoreResult};

/// Largest number of null elements a single write may pad an array with.
pub const MAX_ARRAY_PADDING: usize = 1_500_000;

/// Returns the value stored at `path`, if any.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Returns a mutable reference to the value stored at `path`, if any.
pub fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get_mut(segment)?,
            Bson::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Stores `value` at `path`, creating intermediate documents as needed.
///
/// Array segments beyond the current length pad the array with nulls, up to
/// [`MAX_ARRAY_PADDING`] new elements.
///
/// # Errors
///
/// Returns [`RecordStoreError::InvalidDocument`] when an intermediate value is neither a document
/// nor an array, when an array is addressed with a non-numeric segment, or when the padding limit
/// would be exceeded.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> RecordStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(child) => set_in_value(child, head, rest, value),
                None => Err(RecordStoreError::InvalidDocument(format!("Cannot create field {head}"))),
            }
        }
    }
}

fn set_in_value(target: &mut Bson, parent: &str, path: &str, value: Bson) -> RecordStoreResult<()> {
    match target {
        Bson::Document(inner) => set_path(inner, path, value),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let index = head.parse::<usize>().map_err(|_| {
                RecordStoreError::InvalidDocument(format!("Cannot address array {parent} with field {head}"))
            })?;

            if index > items.len() + MAX_ARRAY_PADDING {
                return Err(RecordStoreError::InvalidDocument(format!(
                    "Cannot pad array {parent} from {} to index {index}",
                    items.len()
                )));
            }

            while items.len() <= index {
                items.push(Bson::Null);
            }

            match rest {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(rest) => {
                    if items[index] == Bson::Null {
                        items[index] = Bson::Document(Document::new());
                    }
                    set_in_value(&mut items[index], head, rest, value)
                }
            }
        }
        _ => Err(RecordStoreError::InvalidDocument(format!(
            "Cannot create field {path} in non-document value {parent}"
        ))),
    }
}

/// Removes the value stored at `path`, returning it.
///
/// Array elements are not spliced out; they are replaced by null, matching the store's
/// field-removal semantics.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.rsplit_once('.') {
        None => document.remove(path),
        Some((parent, last)) => match get_path_mut(document, parent)? {
            Bson::Document(inner) => inner.remove(last),
            Bson::Array(items) => {
                let slot = items.get_mut(last.parse::<usize>().ok()?)?;
                Some(std::mem::replace(slot, Bson::Null))
            }
            _ => None,
        },
    }
}

/// Segment addressing every element of an array.
pub const ALL_ELEMENTS: &str = "$[]";

/// Expands every `$[]` segment of `path` into the indexes of the array it addresses.
///
/// A path with no `$[]` segment expands to itself.
///
/// # Errors
///
/// Returns [`RecordStoreError::InvalidDocument`] when the value before a `$[]` segment is
/// missing or is not an array.
pub fn expand_all_elements(document: &Document, path: &str) -> RecordStoreResult<Vec<String>> {
    let Some((prefix, rest)) = split_at_all_elements(path) else {
        return Ok(vec![path.to_string()]);
    };

    let length = match get_path(document, prefix) {
        Some(Bson::Array(items)) => items.len(),
        _ => {
            return Err(RecordStoreError::InvalidDocument(format!(
                "The path {prefix} must exist in the document in order to apply array updates"
            )));
        }
    };

    let mut expanded = Vec::new();

    for index in 0..length {
        let concrete = match rest {
            Some(rest) => format!("{prefix}.{index}.{rest}"),
            None => format!("{prefix}.{index}"),
        };
        expanded.extend(expand_all_elements(document, &concrete)?);
    }

    Ok(expanded)
}

fn split_at_all_elements(path: &str) -> Option<(&str, Option<&str>)> {
    if let Some(rest) = path.strip_prefix(ALL_ELEMENTS) {
        // A leading `$[]` has no array to address.
        return (rest.is_empty() || rest.starts_with('.')).then_some(("", rest.strip_prefix('.')));
    }

    let marker = format!(".{ALL_ELEMENTS}");
    let start = path.match_indices(&marker).map(|(start, _)| start).find(|&start| {
        let end = start + marker.len();
        end == path.len() || path[end..].starts_with('.')
    })?;
    let rest = &path[start + marker.len()..];

    Some((&path[..start], rest.strip_prefix('.')))
}

/// Returns `true` when two paths address the same value or one contains the other.
pub fn paths_overlap(left: &str, right: &str) -> bool {
    fn contains(outer: &str, inner: &str) -> bool {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
    }

    left == right || contains(left, right) || contains(right, left)
}
