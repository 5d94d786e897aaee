//! Update operators for in-memory documents.
//!
//! Supported: `$set`, `$unset`, `$inc`, `$rename` and `$push`, each taking a
//! document of dotted field paths. An update is parsed completely before it is
//! applied to any document, so a malformed update never leaves a collection
//! half-modified.

use bson::{Bson, Document};

use docclient_core::{document::ID_FIELD, error::DriverError};

#[derive(Debug, Clone, PartialEq)]
enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
    Rename(String, String),
    Push(String, Bson),
}

/// A parsed update document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UpdatePlan {
    ops: Vec<UpdateOp>,
}

fn rejected(message: impl Into<String>) -> DriverError {
    DriverError::Rejected(message.into())
}

fn touches_id(path: &str) -> bool {
    path == ID_FIELD || path.starts_with("_id.")
}

impl UpdatePlan {
    pub fn parse(update: &Document) -> Result<Self, DriverError> {
        if update.is_empty() {
            return Err(rejected("update document must not be empty"));
        }

        let mut ops = Vec::new();

        for (operator, operand) in update {
            let fields = match (operator.starts_with('$'), operand) {
                (false, _) => {
                    return Err(rejected(format!(
                        "update must contain only operators, found field '{operator}'"
                    )));
                }
                (true, Bson::Document(fields)) => fields,
                (true, _) => return Err(rejected(format!("'{operator}' requires a document"))),
            };

            for (path, value) in fields {
                if touches_id(path) {
                    return Err(rejected(format!("'{operator}' would modify the immutable field '{ID_FIELD}'")));
                }

                let op = match operator.as_str() {
                    "$set" => UpdateOp::Set(path.clone(), value.clone()),
                    "$unset" => UpdateOp::Unset(path.clone()),
                    "$inc" => match value {
                        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => UpdateOp::Inc(path.clone(), value.clone()),
                        _ => return Err(rejected(format!("'$inc' requires a numeric amount for '{path}'"))),
                    },
                    "$rename" => match value {
                        Bson::String(target) if touches_id(target) => {
                            return Err(rejected(format!("'$rename' would modify the immutable field '{ID_FIELD}'")));
                        }
                        Bson::String(target) if target == path => {
                            return Err(rejected(format!("'$rename' source and target are both '{path}'")));
                        }
                        Bson::String(target) => UpdateOp::Rename(path.clone(), target.clone()),
                        _ => return Err(rejected(format!("'$rename' target for '{path}' must be a string"))),
                    },
                    "$push" => UpdateOp::Push(path.clone(), value.clone()),
                    other => return Err(rejected(format!("unsupported update operator '{other}'"))),
                };
                ops.push(op);
            }
        }

        Ok(Self { ops })
    }

    /// Applies every operation to `document` in order.
    pub fn apply(&self, document: &mut Document) -> Result<(), DriverError> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => set_path(document, path, value.clone())?,
                UpdateOp::Unset(path) => {
                    remove_path(document, path);
                }
                UpdateOp::Inc(path, amount) => {
                    let current = get_path(document, path).cloned();
                    let next = match current {
                        None => amount.clone(),
                        Some(current) => add(&current, amount).ok_or_else(|| {
                            rejected(format!("cannot apply '$inc' to non-numeric field '{path}'"))
                        })?,
                    };
                    set_path(document, path, next)?;
                }
                UpdateOp::Rename(from, to) => {
                    if let Some(value) = remove_path(document, from) {
                        set_path(document, to, value)?;
                    }
                }
                UpdateOp::Push(path, value) => {
                    let next = match get_path(document, path) {
                        None => vec![value.clone()],
                        Some(Bson::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            items
                        }
                        Some(_) => return Err(rejected(format!("cannot apply '$push' to non-array field '{path}'"))),
                    };
                    set_path(document, path, Bson::Array(next))?;
                }
            }
        }

        Ok(())
    }
}

fn add(current: &Bson, amount: &Bson) -> Option<Bson> {
    Some(match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a)? + b),
        _ => return None,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn get_path<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            _ => None,
        },
    }
}

/// Returns the document holding the last path segment, creating intermediate
/// documents when `create` is set.
fn parent_mut<'d, 'p>(
    document: &'d mut Document,
    path: &'p str,
    create: bool,
) -> Result<Option<(&'d mut Document, &'p str)>, DriverError> {
    let Some((head, rest)) = path.split_once('.') else {
        return Ok(Some((document, path)));
    };

    if create && !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(child)) => parent_mut(child, rest, create),
        Some(_) if create => Err(rejected(format!("cannot create field '{rest}' inside non-document field '{head}'"))),
        _ => Ok(None),
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), DriverError> {
    if let Some((parent, field)) = parent_mut(document, path, true)? {
        parent.insert(field, value);
    }

    Ok(())
}

fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match parent_mut(document, path, false) {
        Ok(Some((parent, field))) => parent.remove(field),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn apply(mut document: Document, update: Document) -> Result<Document, DriverError> {
        UpdatePlan::parse(&update)?.apply(&mut document)?;
        Ok(document)
    }

    #[test]
    fn set_and_unset_nested_fields() {
        let updated = apply(
            doc! { "_id": 1, "name": "Ann", "old": true },
            doc! { "$set": { "address.city": "Oslo", "name": "Anna" }, "$unset": { "old": "" } },
        )
        .unwrap();

        assert_eq!(updated, doc! { "_id": 1, "name": "Anna", "address": { "city": "Oslo" } });
    }

    #[test]
    fn inc_creates_and_promotes() {
        let updated = apply(
            doc! { "hits": 1, "big": i32::MAX, "ratio": 0.5 },
            doc! { "$inc": { "hits": 2, "big": 1, "ratio": 1, "fresh": 5_i64 } },
        )
        .unwrap();

        assert_eq!(updated.get_i32("hits").unwrap(), 3);
        assert_eq!(updated.get_i64("big").unwrap(), i32::MAX as i64 + 1);
        assert_eq!(updated.get_f64("ratio").unwrap(), 1.5);
        assert_eq!(updated.get_i64("fresh").unwrap(), 5);
    }

    #[test]
    fn rename_and_push() {
        let updated = apply(
            doc! { "nick": "a", "tags": ["x"] },
            doc! { "$rename": { "nick": "alias" }, "$push": { "tags": "y", "log": 1 } },
        )
        .unwrap();

        assert_eq!(updated, doc! { "tags": ["x", "y"], "alias": "a", "log": [1] });
    }

    #[test]
    fn malformed_updates_are_rejected() {
        for update in [
            doc! {},
            doc! { "name": "replacement" },
            doc! { "$set": 5 },
            doc! { "$inc": { "n": "one" } },
            doc! { "$rename": { "a": 1 } },
            doc! { "$pull": { "a": 1 } },
            doc! { "$set": { "_id": 2 } },
        ] {
            assert!(
                matches!(UpdatePlan::parse(&update), Err(DriverError::Rejected(_))),
                "{update}"
            );
        }
    }

    #[test]
    fn type_conflicts_are_rejected_at_apply() {
        assert!(apply(doc! { "n": "text" }, doc! { "$inc": { "n": 1 } }).is_err());
        assert!(apply(doc! { "n": 1 }, doc! { "$push": { "n": 1 } }).is_err());
        assert!(apply(doc! { "a": 1 }, doc! { "$set": { "a.b": 1 } }).is_err());
    }
}
