//! Query description and in-process evaluation
//!
//! Both backends scan a collection and hand the documents to [`Query::run`],
//! so filtering and ordering behave the same everywhere.

use super::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// Equality filter on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name
    pub field: String,
    /// Required value
    pub value: Value,
}

/// One ordering clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Field name
    pub field: String,
    /// Direction
    pub direction: Direction,
}

/// Collection query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional equality filter
    pub filter: Option<Filter>,
    /// Ordering clauses, applied in order
    pub order_by: Vec<OrderBy>,
    /// Maximum number of documents
    pub limit: Option<usize>,
}

impl Query {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep documents whose `field` equals `value`
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    /// Add an ordering clause
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Cap the result size
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if `doc` passes the filter
    pub fn matches(&self, doc: &Document) -> bool {
        match &self.filter {
            Some(filter) => doc.fields.get(&filter.field) == Some(&filter.value),
            None => true,
        }
    }

    /// Filter, sort and truncate a scanned collection.
    ///
    /// Equal sort keys fall back to the document ID, in the direction of the
    /// last ordering clause, so the result is a total order.
    pub fn run(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|doc| self.matches(doc)).collect();

        let tie_direction = self
            .order_by
            .last()
            .map(|clause| clause.direction)
            .unwrap_or(Direction::Ascending);

        out.sort_by(|a, b| {
            for clause in &self.order_by {
                let ord = compare_values(a.fields.get(&clause.field), b.fields.get(&clause.field));
                let ord = directed(ord, clause.direction);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            directed(a.id.cmp(&b.id), tie_direction)
        });

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn directed(ord: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ord,
        Direction::Descending => ord.reverse(),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < others
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (x.as_i64(), y.as_i64()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => {
                        let x = x.as_f64().unwrap_or(f64::NAN);
                        let y = y.as_f64().unwrap_or(f64::NAN);
                        x.total_cmp(&y)
                    }
                },
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
