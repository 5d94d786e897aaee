//! Filter evaluation for in-memory documents.
//!
//! Filters arrive as documents, are parsed into an [`Expr`] and evaluated
//! against each stored document with a [`DocumentEvaluator`]. Matching follows
//! the document-store conventions:
//!
//! - a missing field compares equal to `null`
//! - an array field matches if the array itself or any of its elements matches
//! - ordering comparisons only match values of the same kind

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::cmp::Ordering;

use docclient_core::query::{Expr, FieldOp, QueryVisitor};

/// Comparable view of a BSON value.
///
/// Integers stay exact; integers and doubles compare by numeric value without
/// rounding either side. NaN sorts below every other number and equals itself.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    /// Embedded document, fields in stored order.
    Map(Vec<(&'a str, Comparable<'a>)>),
    /// Values without a natural ordering, compared structurally.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

/// Exact comparison of an integer with a finite or non-finite double.
fn cmp_int_double(int: i64, double: f64) -> Ordering {
    // 2^63; every finite double at or above it exceeds i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if double.is_nan() {
        return Ordering::Greater;
    }
    if double >= LIMIT {
        return Ordering::Less;
    }
    if double < -LIMIT {
        return Ordering::Greater;
    }

    let whole = double.trunc();
    // |whole| < 2^63, so the cast is exact.
    match int.cmp(&(whole as i64)) {
        Ordering::Equal if double > whole => Ordering::Less,
        Ordering::Equal if double < whole => Ordering::Greater,
        ordering => ordering,
    }
}

fn cmp_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // Neither is NaN, so the comparison is defined; 0.0 and -0.0 are equal.
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Comparable<'_> {
    /// Position in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Double(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    fn is_nan(&self) -> bool {
        matches!(self, Comparable::Double(value) if value.is_nan())
    }

    /// Numeric order, if both sides are numbers.
    fn cmp_numbers(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Int(a), Comparable::Int(b)) => Some(a.cmp(b)),
            (Comparable::Double(a), Comparable::Double(b)) => Some(cmp_doubles(*a, *b)),
            (Comparable::Int(a), Comparable::Double(b)) => Some(cmp_int_double(*a, *b)),
            (Comparable::Double(a), Comparable::Int(b)) => Some(cmp_int_double(*b, *a).reverse()),
            _ => None,
        }
    }

    /// Total order used for sorting: by kind first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b)
                .map(|((ka, va), (kb, vb))| va.sort_cmp(vb).then_with(|| ka.cmp(kb)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.cmp_numbers(other).unwrap_or(Ordering::Equal),
        })
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => self.cmp_numbers(other) == Some(Ordering::Equal),
        }
    }
}

/// Order used by range operators. Different kinds are unordered, and NaN only
/// compares with NaN.
impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ if self.is_nan() != other.is_nan() => None,
            _ => self.cmp_numbers(other),
        }
    }
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> bool {
        self.visit_expr(expr)
    }

    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        match field_value {
            None => expected == Comparable::Null,
            Some(found @ Bson::Array(items)) => {
                Comparable::from(found) == expected
                    || items.iter().any(|item| Comparable::from(item) == expected)
            }
            Some(found) => Comparable::from(found) == expected,
        }
    }

    fn compares(field_value: Option<&Bson>, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(value);
        let matches = |candidate: &Bson| {
            Comparable::from(candidate)
                .partial_cmp(&expected)
                .is_some_and(&accept)
        };

        match field_value {
            None => false,
            Some(Bson::Array(items)) => items.iter().any(matches),
            Some(found) => matches(found),
        }
    }

    fn any_of(field_value: Option<&Bson>, values: &Bson) -> bool {
        match values {
            Bson::Array(values) => values.iter().any(|value| Self::equals(field_value, value)),
            single => Self::equals(field_value, single),
        }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;

    fn visit_and(&mut self, exprs: &[Expr]) -> bool {
        exprs.iter().all(|expr| self.visit_expr(expr))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> bool {
        exprs.iter().any(|expr| self.visit_expr(expr))
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> bool {
        !self.visit_or(exprs)
    }

    fn visit_not(&mut self, expr: &Expr) -> bool {
        !self.visit_expr(expr)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> bool {
        lookup(self.document, field).is_some() == should_exist
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> bool {
        let found = lookup(self.document, field);

        match op {
            FieldOp::Eq => Self::equals(found, value),
            FieldOp::Ne => !Self::equals(found, value),
            FieldOp::Gt => Self::compares(found, value, |o| o == Ordering::Greater),
            FieldOp::Gte => Self::compares(found, value, |o| o != Ordering::Less),
            FieldOp::Lt => Self::compares(found, value, |o| o == Ordering::Less),
            FieldOp::Lte => Self::compares(found, value, |o| o != Ordering::Greater),
            FieldOp::AnyOf => Self::any_of(found, value),
            FieldOp::NoneOf => !Self::any_of(found, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docclient_core::query::Filter;

    fn matches(document: &Document, filter: Document) -> bool {
        let expr = Expr::from_document(&filter).unwrap();
        DocumentEvaluator::new(document).evaluate(&expr)
    }

    #[test]
    fn implicit_equality_and_numeric_normalization() {
        let doc = doc! { "name": "Ann", "age": 30_i64 };

        assert!(matches(&doc, doc! { "name": "Ann" }));
        assert!(matches(&doc, doc! { "age": 30 }));
        assert!(matches(&doc, doc! { "age": 30.0 }));
        assert!(!matches(&doc, doc! { "name": "Bob" }));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! { "a": 1 }, doc! {}));
        assert!(matches(&Document::new(), doc! {}));
    }

    #[test]
    fn missing_fields_compare_as_null() {
        let doc = doc! { "a": 1 };

        assert!(matches(&doc, doc! { "b": Bson::Null }));
        assert!(matches(&doc, doc! { "b": { "$ne": 1 } }));
        assert!(!matches(&doc, doc! { "b": { "$gt": 0 } }));
        assert!(matches(&doc, doc! { "b": { "$nin": [1, 2] } }));
    }

    #[test]
    fn ranges_only_match_same_kind() {
        let doc = doc! { "age": 30, "name": "Ann" };

        assert!(matches(&doc, doc! { "age": { "$gte": 18, "$lt": 65 } }));
        assert!(!matches(&doc, doc! { "age": { "$gt": "10" } }));
        assert!(matches(&doc, doc! { "name": { "$lt": "Bob" } }));
    }

    #[test]
    fn arrays_match_any_element() {
        let doc = doc! { "tags": ["red", "blue"], "scores": [3, 9] };

        assert!(matches(&doc, doc! { "tags": "blue" }));
        assert!(matches(&doc, doc! { "tags": ["red", "blue"] }));
        assert!(matches(&doc, doc! { "scores": { "$gt": 8 } }));
        assert!(matches(&doc, doc! { "tags": { "$in": ["green", "red"] } }));
        assert!(!matches(&doc, doc! { "tags": { "$nin": ["red"] } }));
    }

    #[test]
    fn dotted_paths_reach_nested_values() {
        let doc = doc! { "address": { "city": "Oslo", "zip": 150 }, "items": [{ "sku": "a" }] };

        assert!(matches(&doc, doc! { "address.city": "Oslo" }));
        assert!(matches(&doc, doc! { "items.0.sku": "a" }));
        assert!(matches(&doc, doc! { "address.street": { "$exists": false } }));
        assert!(!matches(&doc, doc! { "address.zip": { "$lt": 100 } }));
    }

    #[test]
    fn logical_operators() {
        let doc = doc! { "status": "active", "age": 17 };

        assert!(matches(&doc, doc! { "$or": [{ "status": "gone" }, { "age": 17 }] }));
        assert!(!matches(&doc, doc! { "$and": [{ "status": "active" }, { "age": { "$gte": 18 } }] }));
        assert!(matches(&doc, doc! { "$nor": [{ "status": "gone" }] }));
        assert!(matches(&doc, doc! { "age": { "$not": { "$gte": 18 } } }));
    }

    #[test]
    fn builder_expressions_evaluate_directly() {
        let doc = doc! { "status": "active", "age": 40 };
        let expr = Filter::eq("status", "active").and(Filter::any_of("age", [30, 40]));

        assert!(DocumentEvaluator::new(&doc).evaluate(&expr));
        assert!(!DocumentEvaluator::new(&doc).evaluate(&expr.not()));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let doc = doc! { "_id": 9_007_199_254_740_993_i64 };

        assert!(matches(&doc, doc! { "_id": 9_007_199_254_740_993_i64 }));
        assert!(!matches(&doc, doc! { "_id": 9_007_199_254_740_992_i64 }));
        assert!(!matches(&doc, doc! { "_id": 9_007_199_254_740_992.0 }));
        assert!(matches(&doc, doc! { "_id": { "$gt": 9_007_199_254_740_992.0 } }));
        assert!(matches(&doc, doc! { "_id": { "$lt": i64::MAX } }));
    }

    #[test]
    fn integers_and_doubles_compare_by_value() {
        let doc = doc! { "n": 3 };

        assert!(matches(&doc, doc! { "n": 3.0 }));
        assert!(matches(&doc, doc! { "n": { "$gt": 2.5, "$lt": 3.5 } }));
        assert!(!matches(&doc, doc! { "n": { "$gt": 3.0 } }));
        assert!(matches(&doc, doc! { "n": { "$lt": f64::INFINITY } }));
        assert!(matches(&doc, doc! { "n": { "$gt": f64::NEG_INFINITY } }));
    }

    #[test]
    fn nan_matches_only_nan() {
        let doc = doc! { "v": f64::NAN };

        assert!(matches(&doc, doc! { "v": f64::NAN }));
        assert!(!matches(&doc, doc! { "v": { "$lt": 0 } }));
        assert!(!matches(&doc, doc! { "v": { "$gt": 0 } }));
        assert!(!matches(&doc! { "v": 1 }, doc! { "v": f64::NAN }));
    }

    #[test]
    fn nan_sorts_below_every_number() {
        let nan = Bson::Double(f64::NAN);
        let low = Bson::Int64(i64::MIN);
        let neg_inf = Bson::Double(f64::NEG_INFINITY);

        assert_eq!(Comparable::from(&nan).sort_cmp(&Comparable::from(&low)), Ordering::Less);
        assert_eq!(Comparable::from(&nan).sort_cmp(&Comparable::from(&neg_inf)), Ordering::Less);
        assert_eq!(Comparable::from(&nan).sort_cmp(&Comparable::from(&nan)), Ordering::Equal);
        assert_eq!(Comparable::from(&low).sort_cmp(&Comparable::from(&nan)), Ordering::Greater);
    }

    #[test]
    fn embedded_documents_compare_in_field_order() {
        let doc = doc! { "size": { "h": 14, "w": 21 } };

        assert!(matches(&doc, doc! { "size": { "h": 14, "w": 21 } }));
        assert!(!matches(&doc, doc! { "size": { "w": 21, "h": 14 } }));
    }

    #[test]
    fn sort_order_ranks_kinds_before_values() {
        let null = Bson::Null;
        let one = Bson::Int32(1);
        let two = Bson::Double(2.0);
        let text = Bson::String("a".into());

        assert_eq!(Comparable::from(&null).sort_cmp(&Comparable::from(&one)), Ordering::Less);
        assert_eq!(Comparable::from(&one).sort_cmp(&Comparable::from(&two)), Ordering::Less);
        assert_eq!(Comparable::from(&text).sort_cmp(&Comparable::from(&two)), Ordering::Greater);
    }
}
