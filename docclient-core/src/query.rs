//! Filter expressions and find options.
//!
//! Filters travel to drivers as plain documents in the MongoDB query dialect.
//! This module adds a typed layer on top of that dialect:
//!
//! - [`Expr`] - a filter expression tree, built with [`Filter`]
//! - [`Expr::to_document`] - renders an expression into a filter document
//! - [`Expr::from_document`] - parses a filter document back into an expression,
//!   for drivers that evaluate filters themselves
//! - [`QueryVisitor`] - walks an expression tree
//! - [`FindOptions`] - sort, limit and skip for `find_many`
//!
//! # Example
//!
//! ```ignore
//! use docclient::query::{Filter, FindOptions, SortDirection};
//!
//! let filter = Filter::eq("status", "active").and(Filter::gte("age", 18));
//! let options = FindOptions::builder()
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! Supported operators: `$eq $ne $gt $gte $lt $lte $in $nin $exists $not`
//! at field level and `$and $or $nor` at the top level. A field mapped to a
//! plain value is an implicit `$eq`.

use bson::{Bson, Document, doc};
use thiserror::Error;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by. Dotted paths address nested fields.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (`$eq`).
    Eq,
    /// Not equal to (`$ne`).
    Ne,
    /// Greater than (`$gt`).
    Gt,
    /// Greater than or equal to (`$gte`).
    Gte,
    /// Less than (`$lt`).
    Lt,
    /// Less than or equal to (`$lte`).
    Lte,
    /// Equal to any of the listed values (`$in`).
    AnyOf,
    /// Equal to none of the listed values (`$nin`).
    NoneOf,
}

impl FieldOp {
    /// The operator keyword in the filter dialect.
    pub fn keyword(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::AnyOf,
            "$nin" => FieldOp::NoneOf,
            _ => return None,
        })
    }
}

/// A filter expression.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Nor`, `Not`)
/// to build complex predicates.
///
/// # Example
///
/// ```ignore
/// use docclient::query::Filter;
///
/// let expr = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All expressions must match. An empty list matches every document.
    And(Vec<Expr>),
    /// At least one expression must match.
    Or(Vec<Expr>),
    /// No expression may match.
    Nor(Vec<Expr>),
    /// Inverts the result of an expression.
    Not(Box<Expr>),
    /// Checks whether a field is present.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name (dotted paths address nested fields).
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// An expression matching every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Renders this expression as a filter document.
    pub fn to_document(&self) -> Document {
        FilterRenderer.visit_expr(self)
    }

    /// Parses a filter document into an expression.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] for unknown operators or malformed operands.
    pub fn from_document(filter: &Document) -> Result<Expr, FilterError> {
        let mut exprs = filter
            .iter()
            .map(|(key, value)| parse_entry(key, value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }
}

impl From<Expr> for Document {
    fn from(expr: Expr) -> Self {
        expr.to_document()
    }
}

/// A filter document the parser does not understand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),
    #[error("operator '{operator}' {reason}")]
    MalformedOperand { operator: String, reason: String },
}

fn malformed(operator: &str, reason: &str) -> FilterError {
    FilterError::MalformedOperand {
        operator: operator.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_entry(key: &str, value: &Bson) -> Result<Expr, FilterError> {
    match key {
        "$and" | "$or" | "$nor" => {
            let clauses = value
                .as_array()
                .ok_or_else(|| malformed(key, "requires an array of documents"))?
                .iter()
                .map(|clause| match clause {
                    Bson::Document(clause) => Expr::from_document(clause),
                    _ => Err(malformed(key, "requires an array of documents")),
                })
                .collect::<Result<Vec<_>, _>>()?;

            if clauses.is_empty() {
                return Err(malformed(key, "requires a non-empty array"));
            }

            Ok(match key {
                "$and" => Expr::And(clauses),
                "$or" => Expr::Or(clauses),
                _ => Expr::Nor(clauses),
            })
        }
        _ if key.starts_with('$') => Err(FilterError::UnsupportedOperator(key.to_string())),
        field => match value {
            Bson::Document(ops) if is_operator_document(ops) => parse_field_ops(field, ops),
            literal => Ok(Expr::field(field.to_string(), FieldOp::Eq, literal.clone())),
        },
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_field_ops(field: &str, ops: &Document) -> Result<Expr, FilterError> {
    let mut exprs = Vec::with_capacity(ops.len());

    for (operator, operand) in ops {
        let expr = match operator.as_str() {
            "$exists" => Expr::Exists(field.to_string(), truthy(operand)),
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    parse_field_ops(field, inner)?.not()
                }
                _ => return Err(malformed(operator, "requires a document of operators")),
            },
            keyword => {
                let op = FieldOp::from_keyword(keyword)
                    .ok_or_else(|| FilterError::UnsupportedOperator(keyword.to_string()))?;
                if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf) && operand.as_array().is_none() {
                    return Err(malformed(keyword, "requires an array"));
                }
                Expr::field(field.to_string(), op, operand.clone())
            }
        };
        exprs.push(expr);
    }

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
///
/// # Example
///
/// ```ignore
/// use docclient::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value (including
    /// documents without the field).
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents that have the field.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents that lack the field.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// No expression may match.
    pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Nor(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// Sort, limit and skip applied by `find_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
}

impl FindOptions {
    /// Creates a new options builder.
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::new()
    }

    /// The sort keys as a sort document (`{field: 1 | -1}`).
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }

        Some(
            self.sort
                .iter()
                .map(|sort| {
                    let direction = match sort.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    };
                    (sort.field.clone(), Bson::Int32(direction))
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn new() -> Self {
        FindOptionsBuilder { options: FindOptions::default() }
    }

    /// Adds a sort key. Keys added first take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Walks an expression tree, producing one output per node.
pub trait QueryVisitor {
    type Output;

    fn visit_and(&mut self, exprs: &[Expr]) -> Self::Output;
    fn visit_or(&mut self, exprs: &[Expr]) -> Self::Output;
    fn visit_nor(&mut self, exprs: &[Expr]) -> Self::Output;
    fn visit_not(&mut self, expr: &Expr) -> Self::Output;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Self::Output;
    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Self::Output;

    fn visit_expr(&mut self, expr: &Expr) -> Self::Output {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Nor(exprs) => self.visit_nor(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
        }
    }
}

/// Renders expressions into filter documents.
struct FilterRenderer;

impl FilterRenderer {
    fn clauses(&mut self, exprs: &[Expr]) -> Vec<Bson> {
        exprs
            .iter()
            .map(|expr| Bson::Document(self.visit_expr(expr)))
            .collect()
    }
}

impl QueryVisitor for FilterRenderer {
    type Output = Document;

    fn visit_and(&mut self, exprs: &[Expr]) -> Document {
        match exprs {
            [] => Document::new(),
            [single] => self.visit_expr(single),
            _ => doc! { "$and": self.clauses(exprs) },
        }
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Document {
        doc! { "$or": self.clauses(exprs) }
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> Document {
        doc! { "$nor": self.clauses(exprs) }
    }

    fn visit_not(&mut self, expr: &Expr) -> Document {
        // `$not` only applies to a single field's operators; anything else becomes `$nor`.
        match expr {
            Expr::Field { field, op, value } => doc! {
                field.as_str(): { "$not": { op.keyword(): value.clone() } },
            },
            Expr::Exists(field, should_exist) => doc! {
                field.as_str(): { "$exists": !should_exist },
            },
            _ => doc! { "$nor": [self.visit_expr(expr)] },
        }
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Document {
        doc! { field: { "$exists": should_exist } }
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Document {
        doc! { field: { op.keyword(): value.clone() } }
    }
}
