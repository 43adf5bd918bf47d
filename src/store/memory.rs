//! In-memory record store
//!
//! Enforces the same unique keys and update preconditions as the database
//! schema, so the reconciler behaves identically against it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{record_id, Filter, Order, Record, RecordStore, StoreError, StoreResult, Table};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<Table, Vec<Record>>>>,
    interleave: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that yields to the scheduler before every call, so concurrent
    /// callers on the same task interleave the way remote calls do.
    pub fn interleaved() -> Self {
        Self { interleave: true, ..Self::default() }
    }

    /// Number of rows currently held in `table`
    pub fn len(&self, table: Table) -> usize {
        self.lock()
            .map(|tables| tables.get(&table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    async fn suspend(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<Table, Vec<Record>>>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".to_string()))
    }

    fn do_insert(&self, table: Table, record: Record) -> StoreResult<Record> {
        let id = record_id(&record)
            .ok_or_else(|| StoreError::Rejected(format!("row for {} has no valid id", table)))?;
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        if rows.iter().any(|row| record_id(row) == Some(id)) {
            return Err(StoreError::Conflict {
                table: table.name(),
                constraint: format!("{}_pkey", table.name()),
            });
        }
        check_unique(table, rows, &record, id)?;
        rows.push(record.clone());
        Ok(record)
    }

    fn do_update(
        &self,
        table: Table,
        id: Uuid,
        patch: Record,
        precondition: Option<Filter>,
    ) -> StoreResult<Record> {
        if patch.is_empty() {
            return Err(StoreError::Rejected("empty patch".to_string()));
        }
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        let index = rows
            .iter()
            .position(|row| record_id(row) == Some(id))
            .ok_or(StoreError::NotFound(table.name()))?;

        if let Some(precondition) = precondition {
            if !precondition.matches(&rows[index]) {
                return Err(StoreError::PreconditionFailed { table: table.name(), id });
            }
        }

        let mut updated = rows[index].clone();
        for (column, value) in patch {
            updated.insert(column, value);
        }
        check_unique(table, rows, &updated, id)?;
        rows[index] = updated.clone();
        Ok(updated)
    }
}

/// Reject `candidate` if it collides with another row on any unique key
fn check_unique(table: Table, rows: &[Record], candidate: &Record, id: Uuid) -> StoreResult<()> {
    for key in table.unique_keys() {
        let key_of = |row: &Record| -> Option<Vec<Value>> {
            if let Some((column, value)) = key.unless {
                if row.get(column).and_then(Value::as_str) == Some(value) {
                    return None;
                }
            }
            if let Some(column) = key.only_if_null {
                if !matches!(row.get(column), None | Some(Value::Null)) {
                    return None;
                }
            }
            key.columns
                .iter()
                .map(|column| match row.get(*column) {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(v.clone()),
                })
                .collect()
        };

        let Some(candidate_key) = key_of(candidate) else {
            continue;
        };
        let collides = rows
            .iter()
            .filter(|row| record_id(row) != Some(id))
            .any(|row| key_of(row).as_ref() == Some(&candidate_key));
        if collides {
            return Err(StoreError::Conflict {
                table: table.name(),
                constraint: key.name.to_string(),
            });
        }
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        // Nulls sort last, as in PostgreSQL ascending order
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: Table, record: Record) -> StoreResult<Record> {
        self.suspend().await;
        self.do_insert(table, record)
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> StoreResult<Record> {
        self.suspend().await;
        let tables = self.lock()?;
        tables
            .get(&table)
            .and_then(|rows| rows.iter().find(|row| filter.matches(row)))
            .cloned()
            .ok_or(StoreError::NotFound(table.name()))
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<Order>,
    ) -> StoreResult<Vec<Record>> {
        self.suspend().await;
        let mut rows: Vec<Record> = {
            let tables = self.lock()?;
            tables
                .get(&table)
                .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
                .unwrap_or_default()
        };
        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        Ok(rows)
    }

    async fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Record,
        precondition: Option<Filter>,
    ) -> StoreResult<Record> {
        self.suspend().await;
        self.do_update(table, id, patch, precondition)
    }

    async fn delete(&self, table: Table, id: Uuid) -> StoreResult<()> {
        self.suspend().await;
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|row| record_id(row) != Some(id));
        if rows.len() == before {
            return Err(StoreError::NotFound(table.name()));
        }
        Ok(())
    }
}
