//! In-process persistence
//!
//! Behaves like the remote table store closely enough to drive the feed
//! core without a network: generated ids and timestamps, unique
//! constraints on the relation tables, and like counters maintained the
//! way database triggers maintain them remotely. Failures and latency can
//! be injected per table and operation, and every call is recorded.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::models::{EntityId, Row, SubjectKind, Table};
use super::store::{Filter, Persistence, Select, compare_values, instrumented};
use crate::error::AppError;

/// Store operation, used for call recording and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    Update,
    Delete,
    Select,
    Count,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
            Self::Count => "count",
        }
    }
}

fn unique_columns(table: Table) -> Option<&'static [&'static str]> {
    match table {
        Table::PostLikes => Some(&["post_id", "user_id"]),
        Table::StatusLikes => Some(&["status_id", "user_id"]),
        Table::UserFollows => Some(&["follower_id", "following_id"]),
        Table::Profiles => Some(&["id"]),
        _ => None,
    }
}

/// Like relation -> subject kind whose counter it maintains
fn counted_subject(table: Table) -> Option<SubjectKind> {
    match table {
        Table::PostLikes => Some(SubjectKind::Post),
        Table::StatusLikes => Some(SubjectKind::Status),
        _ => None,
    }
}

/// In-memory table store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    failures: Mutex<HashSet<(Table, StoreOp)>>,
    calls: Mutex<Vec<(StoreOp, Table)>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put rows into a table without recording a call
    pub async fn seed(&self, table: Table, rows: Vec<Row>) {
        let mut tables = self.tables.write().await;
        tables.entry(table).or_default().extend(rows);
    }

    /// Snapshot of a table
    pub async fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every `op` on `table` fail until [`MemoryStore::recover`]
    pub fn fail_on(&self, table: Table, op: StoreOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert((table, op));
        }
    }

    /// Remove all injected failures
    pub fn recover(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of recorded calls of `op` on `table`
    pub fn call_count(&self, op: StoreOp, table: Table) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| **c == (op, table)).count())
            .unwrap_or(0)
    }

    /// Number of recorded calls of any kind
    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    async fn enter(&self, op: StoreOp, table: Table) -> Result<(), AppError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((op, table));
        }

        let latency = self.latency.lock().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failures
            .lock()
            .map(|failures| failures.contains(&(table, op)))
            .unwrap_or(false);
        if failing {
            return Err(AppError::Remote(format!(
                "injected failure: {} on {}",
                op.as_str(),
                table
            )));
        }
        Ok(())
    }

    fn adjust_counter(tables: &mut HashMap<Table, Vec<Row>>, relation: Table, like: &Row, delta: i64) {
        let Some(kind) = counted_subject(relation) else {
            return;
        };
        let Some(subject_id) = like.get(kind.like_column()).cloned() else {
            return;
        };
        if let Some(subjects) = tables.get_mut(&kind.table()) {
            for subject in subjects.iter_mut() {
                if subject.get("id") == Some(&subject_id) {
                    let current = subject
                        .get("like_count")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    subject.insert(
                        "like_count".to_string(),
                        Value::from((current + delta).max(0)),
                    );
                }
            }
        }
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|column| row.get(column).map(|v| (column.clone(), v.clone())))
        .collect()
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, AppError> {
        instrumented("insert", table, async {
            self.enter(StoreOp::Insert, table).await?;

            let now = Value::from(Utc::now().to_rfc3339());
            row.entry("id".to_string())
                .or_insert_with(|| Value::from(EntityId::new().0));
            row.entry("created_at".to_string())
                .or_insert_with(|| now.clone());
            match table {
                Table::Posts | Table::StatusUpdates => {
                    row.entry("like_count".to_string())
                        .or_insert_with(|| Value::from(0));
                }
                Table::Notes => {
                    row.entry("updated_at".to_string()).or_insert(now);
                }
                _ => {}
            }

            let mut tables = self.tables.write().await;
            if let Some(columns) = unique_columns(table) {
                let duplicate = tables.get(&table).is_some_and(|rows| {
                    rows.iter()
                        .any(|existing| columns.iter().all(|c| existing.get(*c) == row.get(*c)))
                });
                if duplicate {
                    return Err(AppError::Remote(format!(
                        "duplicate key value violates unique constraint on {table}"
                    )));
                }
            }

            tables.entry(table).or_default().push(row.clone());
            Self::adjust_counter(&mut tables, table, &row, 1);
            Ok(row)
        })
        .await
    }

    async fn update(&self, table: Table, patch: Row, filter: &Filter) -> Result<(), AppError> {
        instrumented("update", table, async {
            self.enter(StoreOp::Update, table).await?;

            let mut tables = self.tables.write().await;
            if let Some(rows) = tables.get_mut(&table) {
                for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                    for (column, value) in &patch {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), AppError> {
        instrumented("delete", table, async {
            self.enter(StoreOp::Delete, table).await?;

            let mut tables = self.tables.write().await;
            let removed: Vec<Row> = match tables.get_mut(&table) {
                Some(rows) => {
                    let (removed, kept): (Vec<Row>, Vec<Row>) =
                        rows.drain(..).partition(|row| filter.matches(row));
                    *rows = kept;
                    removed
                }
                None => Vec::new(),
            };
            for row in &removed {
                Self::adjust_counter(&mut tables, table, row, -1);
            }
            Ok(())
        })
        .await
    }

    async fn select(&self, query: &Select) -> Result<Vec<Row>, AppError> {
        instrumented("select", query.table, async {
            self.enter(StoreOp::Select, query.table).await?;

            let tables = self.tables.read().await;
            let mut rows: Vec<Row> = tables
                .get(&query.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| query.filter.matches(row))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            if let Some(order) = &query.order {
                rows.sort_by(|a, b| {
                    let a = a.get(&order.column).unwrap_or(&Value::Null);
                    let b = b.get(&order.column).unwrap_or(&Value::Null);
                    let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                    if order.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                });
            }

            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }

            Ok(rows
                .iter()
                .map(|row| project(row, &query.columns))
                .collect())
        })
        .await
    }

    async fn count(&self, table: Table, filter: &Filter) -> Result<u64, AppError> {
        instrumented("count", table, async {
            self.enter(StoreOp::Count, table).await?;

            let tables = self.tables.read().await;
            Ok(tables
                .get(&table)
                .map(|rows| rows.iter().filter(|row| filter.matches(row)).count() as u64)
                .unwrap_or(0))
        })
        .await
    }
}
