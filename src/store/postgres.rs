//! PostgreSQL record store (sqlx)
//!
//! Rows travel as `jsonb`: inserts and patches go through
//! `jsonb_populate_record`, reads come back through `to_jsonb`. Column names
//! are always bound as parameters or validated identifiers, never spliced
//! from user input.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, Pool, Postgres};
use uuid::Uuid;

use super::{Filter, Order, Record, RecordStore, StoreError, StoreResult, Table};
use crate::config::StoreConfig;

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_millis(config.request_timeout_ms))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to database: {}", e)))?;
        tracing::info!("Connected to database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Apply embedded schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to run database migrations: {}", e)))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn exists(&self, table: Table, id: Uuid) -> StoreResult<bool> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table.name());
        sqlx::query_scalar::<_, bool>(&query)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))
    }
}

/// Append `(to_jsonb(t) -> $n) = $n+1` conditions, returning the next free index
fn push_conditions(sql: &mut String, filter: &Filter, mut idx: usize, joiner: &str) -> usize {
    for _ in filter.conditions() {
        sql.push_str(joiner);
        sql.push_str(&format!("(to_jsonb(t) -> ${}) = ${}", idx, idx + 1));
        idx += 2;
    }
    idx
}

/// Only plain snake_case identifiers may be used as patch columns
fn checked_column(column: &str) -> StoreResult<&str> {
    let valid = !column.is_empty()
        && column
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(column)
    } else {
        Err(StoreError::Rejected(format!("invalid column name {:?}", column)))
    }
}

fn map_sqlx_error(table: Table, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => StoreError::Conflict {
            table: table.name(),
            constraint: db.constraint().unwrap_or("unique").to_string(),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::RowNotFound => StoreError::NotFound(table.name()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn into_record(Json(value): Json<Value>) -> StoreResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!("expected a row object, got {}", other))),
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, table: Table, record: Record) -> StoreResult<Record> {
        let query = format!(
            r#"
            WITH ins AS (
                INSERT INTO {t} SELECT * FROM jsonb_populate_record(NULL::{t}, $1)
                RETURNING *
            )
            SELECT to_jsonb(ins) FROM ins
            "#,
            t = table.name()
        );
        let row = sqlx::query_scalar::<_, Json<Value>>(&query)
            .bind(Json(Value::Object(record)))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        into_record(row)
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> StoreResult<Record> {
        let mut query = format!("SELECT to_jsonb(t) FROM {} t WHERE TRUE", table.name());
        push_conditions(&mut query, filter, 1, " AND ");
        query.push_str(" LIMIT 1");

        let mut builder = sqlx::query_scalar::<_, Json<Value>>(&query);
        for (column, value) in filter.conditions() {
            builder = builder.bind(column.as_str()).bind(Json(value.clone()));
        }
        let row = builder
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?
            .ok_or(StoreError::NotFound(table.name()))?;
        into_record(row)
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<Order>,
    ) -> StoreResult<Vec<Record>> {
        let mut query = format!("SELECT to_jsonb(t) FROM {} t WHERE TRUE", table.name());
        let idx = push_conditions(&mut query, filter, 1, " AND ");
        if let Some(ref order) = order {
            let direction = if order.descending { "DESC" } else { "ASC" };
            query.push_str(&format!(" ORDER BY to_jsonb(t) -> ${} {}", idx, direction));
        }

        let mut builder = sqlx::query_scalar::<_, Json<Value>>(&query);
        for (column, value) in filter.conditions() {
            builder = builder.bind(column.as_str()).bind(Json(value.clone()));
        }
        if let Some(order) = order {
            builder = builder.bind(order.column);
        }
        let rows = builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        rows.into_iter().map(into_record).collect()
    }

    async fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Record,
        precondition: Option<Filter>,
    ) -> StoreResult<Record> {
        if patch.is_empty() {
            return Err(StoreError::Rejected("empty patch".to_string()));
        }
        let assignments = patch
            .keys()
            .map(|column| checked_column(column).map(|c| format!("\"{c}\" = p.\"{c}\"")))
            .collect::<StoreResult<Vec<_>>>()?;

        let precondition = precondition.unwrap_or_default();
        let mut query = format!(
            "WITH upd AS (UPDATE {t} t SET {sets} FROM jsonb_populate_record(NULL::{t}, $1) p WHERE t.id = $2",
            t = table.name(),
            sets = assignments.join(", ")
        );
        push_conditions(&mut query, &precondition, 3, " AND ");
        query.push_str(" RETURNING t.*) SELECT to_jsonb(upd) FROM upd");

        let mut builder = sqlx::query_scalar::<_, Json<Value>>(&query)
            .bind(Json(Value::Object(patch)))
            .bind(id);
        for (column, value) in precondition.conditions() {
            builder = builder.bind(column.as_str()).bind(Json(value.clone()));
        }

        let row = builder
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        if let Some(row) = row {
            return into_record(row);
        }

        // Nothing written: tell a missing row from a stale precondition
        if self.exists(table, id).await? {
            Err(StoreError::PreconditionFailed { table: table.name(), id })
        } else {
            Err(StoreError::NotFound(table.name()))
        }
    }

    async fn delete(&self, table: Table, id: Uuid) -> StoreResult<()> {
        let query = format!("DELETE FROM {} WHERE id = $1", table.name());
        let result = sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(table.name()));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_conditions_numbers_parameters() {
        let filter = Filter::all().equals("visitor_id", "v").equals("event_id", "e");
        let mut sql = String::from("SELECT 1 WHERE TRUE");
        let next = push_conditions(&mut sql, &filter, 3, " AND ");
        assert_eq!(next, 7);
        assert_eq!(
            sql,
            "SELECT 1 WHERE TRUE AND (to_jsonb(t) -> $3) = $4 AND (to_jsonb(t) -> $5) = $6"
        );
    }

    #[test]
    fn test_checked_column() {
        assert!(checked_column("registration_count").is_ok());
        assert!(checked_column("status\" = 'x'; --").is_err());
        assert!(checked_column("").is_err());
    }
}
