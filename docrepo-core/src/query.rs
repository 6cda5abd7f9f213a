//! Query construction for repository reads.
//!
//! A [`Query`] describes the pipeline a read applies to the items of a collection or
//! partition: an optional filter, followed by any number of composition stages
//! (further filtering, ordering, skip/take, or an arbitrary shaping function).
//!
//! Filters can be plain closures or structured [`Expr`] trees built with [`Filter`].
//! Structured filters are evaluated against the JSON form of each item, which makes
//! them usable by any backend that can walk an [`Expr`] with a [`QueryVisitor`].
//!
//! # Example
//!
//! ```ignore
//! use docrepo::query::{Query, Filter, SortDirection};
//!
//! let query = Query::<Order>::builder()
//!     .filter(|order| order.total > 100)
//!     .and_where_expr(Filter::eq("status", "open"))
//!     .order_by_desc(|order| order.total)
//!     .take(10)
//!     .build();
//! ```

use serde_json::Value;
use std::{cmp::Ordering, fmt, sync::Arc};

use crate::error::RepositoryError;

/// A boxed item predicate.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A boxed item comparator.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// A boxed shaping function over the whole intermediate sequence.
pub type Shaper<T> = Box<dyn FnOnce(Vec<T>) -> Vec<T> + Send>;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort order on a named field of the item's JSON form.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field matches any of the values.
    AnyOf,
    /// Field matches none of the values.
    NoneOf,
}

/// A structured filter expression.
///
/// Field names may address nested values with dots (`"address.city"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression.
    Not(Box<Expr>),
    /// Checks if a field exists (and is not null) or doesn't.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        field: String,
        op: FieldOp,
        value: Value,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Value) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
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
}

/// Constructors for [`Expr`] values.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    pub fn any_of(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

/// A filter: either a closure over the typed item or a structured expression.
pub enum Condition<T> {
    Predicate(Predicate<T>),
    Expr(Expr),
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        match self {
            Condition::Predicate(predicate) => Condition::Predicate(Arc::clone(predicate)),
            Condition::Expr(expr) => Condition::Expr(expr.clone()),
        }
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
            Condition::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
        }
    }
}

/// One query-composition step, applied in order after the filter.
pub enum Stage<T> {
    Where(Condition<T>),
    OrderBy(Comparator<T>),
    SortField(Sort),
    Skip(usize),
    Take(usize),
    Shape(Shaper<T>),
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Where(condition) => f.debug_tuple("Where").field(condition).finish(),
            Stage::OrderBy(_) => f.write_str("OrderBy(..)"),
            Stage::SortField(sort) => f.debug_tuple("SortField").field(sort).finish(),
            Stage::Skip(count) => f.debug_tuple("Skip").field(count).finish(),
            Stage::Take(count) => f.debug_tuple("Take").field(count).finish(),
            Stage::Shape(_) => f.write_str("Shape(..)"),
        }
    }
}

/// A read pipeline over items of type `T`.
///
/// The empty query matches every item in its natural storage order.
pub struct Query<T> {
    /// Optional filter applied before any stage.
    pub filter: Option<Condition<T>>,
    /// Composition stages, applied in order.
    pub stages: Vec<Stage<T>>,
}

impl<T> Query<T> {
    /// Creates a query that matches every item.
    pub fn new() -> Self {
        Query { filter: None, stages: Vec::new() }
    }

    /// Creates a query with a closure filter and no stages.
    pub fn filtered(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Query { filter: Some(Condition::Predicate(Arc::new(predicate))), stages: Vec::new() }
    }

    /// Creates a query with a structured filter and no stages.
    pub fn matching(expr: Expr) -> Self {
        Query { filter: Some(Condition::Expr(expr)), stages: Vec::new() }
    }

    /// Creates a new query builder.
    pub fn builder() -> QueryBuilder<T> {
        QueryBuilder::new()
    }

    /// Returns `true` if the query has neither a filter nor stages.
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.stages.is_empty()
    }

    /// Returns `true` if any part of the query uses a structured expression.
    pub fn uses_expressions(&self) -> bool {
        matches!(self.filter, Some(Condition::Expr(_)))
            || self.stages.iter().any(|stage| {
                matches!(stage, Stage::Where(Condition::Expr(_)) | Stage::SortField(_))
            })
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("stages", &self.stages)
            .finish()
    }
}

/// Fluent builder for [`Query`].
pub struct QueryBuilder<T> {
    query: Query<T>,
}

impl<T> QueryBuilder<T> {
    pub fn new() -> Self {
        QueryBuilder { query: Query::new() }
    }

    /// Sets the closure filter, replacing any previous filter.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.query.filter = Some(Condition::Predicate(Arc::new(predicate)));
        self
    }

    /// Sets a structured filter, replacing any previous filter.
    pub fn filter_expr(mut self, expr: Expr) -> Self {
        self.query.filter = Some(Condition::Expr(expr));
        self
    }

    /// Appends a filtering stage.
    pub fn and_where(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.query.stages.push(Stage::Where(Condition::Predicate(Arc::new(predicate))));
        self
    }

    /// Appends a structured filtering stage.
    pub fn and_where_expr(mut self, expr: Expr) -> Self {
        self.query.stages.push(Stage::Where(Condition::Expr(expr)));
        self
    }

    /// Appends a stable ascending sort on a key extracted from each item.
    pub fn order_by<K, F>(mut self, key: F) -> Self
    where
        T: 'static,
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.query.stages.push(Stage::OrderBy(Arc::new(move |a: &T, b: &T| key(a).cmp(&key(b)))));
        self
    }

    /// Appends a stable descending sort on a key extracted from each item.
    pub fn order_by_desc<K, F>(mut self, key: F) -> Self
    where
        T: 'static,
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.query.stages.push(Stage::OrderBy(Arc::new(move |a: &T, b: &T| key(b).cmp(&key(a)))));
        self
    }

    /// Appends a stable sort on a named field of the item's JSON form.
    pub fn sort_by_field(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.stages.push(Stage::SortField(Sort { field: field.into(), direction }));
        self
    }

    /// Appends a stage skipping the first `count` items.
    pub fn skip(mut self, count: usize) -> Self {
        self.query.stages.push(Stage::Skip(count));
        self
    }

    /// Appends a stage keeping at most `count` items.
    pub fn take(mut self, count: usize) -> Self {
        self.query.stages.push(Stage::Take(count));
        self
    }

    /// Appends an arbitrary shaping function over the whole sequence.
    pub fn shape(mut self, shaper: impl FnOnce(Vec<T>) -> Vec<T> + Send + 'static) -> Self {
        self.query.stages.push(Stage::Shape(Box::new(shaper)));
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query<T> {
        self.query
    }
}

impl<T> Default for QueryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks a structured [`Expr`].
///
/// Backends implement this to evaluate or translate filter expressions.
pub trait QueryVisitor {
    type Output;
    type Error: Into<RepositoryError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
