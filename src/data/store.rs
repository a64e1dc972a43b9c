//! Persistence collaborator contract
//!
//! The feed core only ever talks to storage through [`Persistence`]:
//! table-oriented insert/update/delete/select/count with simple
//! column predicates. Adapters live in `rest` (remote table API) and
//! `memory` (in-process).

use std::cmp::Ordering;
use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{Row, Table};
use crate::error::AppError;

/// Comparison applied to one column
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(Value),
    Gt(Value),
    Lt(Value),
    In(Vec<Value>),
}

/// Single column predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
}

/// Conjunction of column predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, column: &str, op: Op) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Eq(value.into()))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gt(value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lt(value.into()))
    }

    pub fn is_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(column, Op::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a row
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|condition| {
            let actual = row.get(&condition.column).unwrap_or(&Value::Null);
            match &condition.op {
                Op::Eq(expected) => compare_values(actual, expected) == Some(Ordering::Equal),
                Op::Gt(bound) => compare_values(actual, bound) == Some(Ordering::Greater),
                Op::Lt(bound) => compare_values(actual, bound) == Some(Ordering::Less),
                Op::In(candidates) => candidates
                    .iter()
                    .any(|candidate| compare_values(actual, candidate) == Some(Ordering::Equal)),
            }
        })
    }
}

/// Compare two JSON scalars
///
/// Strings that both parse as RFC 3339 timestamps compare as instants,
/// so `+00:00` and `Z` spellings of the same time are equal.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => {
            match (parse_timestamp(l), parse_timestamp(r)) {
                (Some(l), Some(r)) => Some(l.cmp(&r)),
                _ => Some(l.cmp(r)),
            }
        }
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Sort order
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Select query
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: Table,
    /// Projected columns; empty means all
    pub columns: Vec<String>,
    pub filter: Filter,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filter: Filter::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn newest_first(mut self, column: &str) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn maybe_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Table-oriented persistence service
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert a row and return it as stored (with generated columns)
    async fn insert(&self, table: Table, row: Row) -> Result<Row, AppError>;

    /// Apply a patch to every row matching the filter
    async fn update(&self, table: Table, patch: Row, filter: &Filter) -> Result<(), AppError>;

    /// Delete every row matching the filter
    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), AppError>;

    /// Select rows
    async fn select(&self, query: &Select) -> Result<Vec<Row>, AppError>;

    /// Count rows matching the filter
    async fn count(&self, table: Table, filter: &Filter) -> Result<u64, AppError>;
}

/// Run a store call with logging and metrics
pub(crate) async fn instrumented<T, F>(
    operation: &'static str,
    table: Table,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    use crate::metrics::{REMOTE_CALL_DURATION_SECONDS, REMOTE_CALLS_TOTAL};

    let started = Instant::now();
    let result = call.await;
    let elapsed = started.elapsed();

    REMOTE_CALL_DURATION_SECONDS
        .with_label_values(&[operation, table.as_str()])
        .observe(elapsed.as_secs_f64());

    match &result {
        Ok(_) => {
            REMOTE_CALLS_TOTAL
                .with_label_values(&[operation, table.as_str(), "ok"])
                .inc();
            tracing::debug!(
                operation,
                table = %table,
                elapsed_ms = elapsed.as_millis() as u64,
                "Store call completed"
            );
        }
        Err(error) => {
            REMOTE_CALLS_TOTAL
                .with_label_values(&[operation, table.as_str(), "error"])
                .inc();
            tracing::warn!(
                operation,
                table = %table,
                %error,
                "Store call failed"
            );
        }
    }

    result
}
