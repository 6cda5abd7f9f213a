//! Query expression evaluation for in-memory filtering.
//!
//! This module evaluates structured filter expressions and field sorts against the JSON
//! form of stored items.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use docrepo_core::{
    error::{RepositoryError, RepositoryResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of JSON values.
///
/// All numbers are normalized to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(number) => number
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(values) => Comparable::Array(
                values
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Map(_) => 5,
        }
    }

    /// Total order for sorting: values rank by type (null, bool, number, string, array,
    /// object), then by value within a scalar type. Arrays and objects tie.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Resolves a dotted field path (`"address.city"`) inside a JSON object.
pub(crate) fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

/// Orders two items by a named field. Missing and null fields sort first, and fields of
/// different JSON types order by type.
pub(crate) fn compare_by_field(left: &Value, right: &Value, sort: &Sort) -> Ordering {
    let left = lookup(left, &sort.field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);
    let right = lookup(right, &sort.field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);

    let ordering = left.sort_cmp(&right);

    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Value,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> RepositoryResult<bool> {
        self.visit_expr(expr)
    }
}

fn any_match(haystack: &[Comparable<'_>], needle: &Comparable<'_>) -> bool {
    haystack.iter().any(|item| item == needle)
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = RepositoryError;

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
        let exists = lookup(self.document, field)
            .map(|value| !value.is_null())
            .unwrap_or(false);

        Ok(exists == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let field_value = match lookup(self.document, field) {
            Some(field_value) => Comparable::from(field_value),
            None => return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf)),
        };
        let value = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => field_value == value,
            FieldOp::Ne => field_value != value,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match field_value.partial_cmp(&value) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains | FieldOp::NotContains => {
                let contains = match (&field_value, &value) {
                    (Comparable::Array(array), needle) => any_match(array, needle),
                    (Comparable::String(left), Comparable::String(right)) => left.contains(right),
                    _ => false,
                };

                if matches!(op, FieldOp::Contains) { contains } else { !contains }
            }
            FieldOp::StartsWith => match (&field_value, &value) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&field_value, &value) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let any = match (&field_value, &value) {
                    (Comparable::Array(array), Comparable::Array(values)) => {
                        values.iter().any(|candidate| any_match(array, candidate))
                    }
                    (Comparable::Array(array), single) => any_match(array, single),
                    (single, Comparable::Array(values)) => any_match(values, single),
                    (single, other) => single == other,
                };

                if matches!(op, FieldOp::AnyOf) { any } else { !any }
            }
        })
    }
}
