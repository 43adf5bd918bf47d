//! Record store abstraction over the hosted relational database
//!
//! The core never talks SQL or HTTP directly: it reads and writes JSON rows
//! by table name through [`RecordStore`]. Three adapters are provided:
//! PostgreSQL (sqlx), a PostgREST-style REST endpoint (reqwest) and an
//! in-memory store used by tests and local development.

pub mod memory;
pub mod postgres;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};

/// A stored row, keyed by column name
pub type Record = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub const VISITORS_PHONE_KEY: &str = "visitors_phone_key";
pub const VISITORS_EMAIL_KEY: &str = "visitors_email_key";
pub const REGISTRATIONS_CODE_KEY: &str = "registrations_confirmation_code_key";
pub const REGISTRATIONS_ACTIVE_KEY: &str = "registrations_visitor_event_active_key";

/// Tables known to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Events,
    Visitors,
    Registrations,
}

/// A uniqueness constraint enforced by the store.
///
/// Rows with a null in any key column, matching `unless`, or with a value
/// in the `only_if_null` column are exempt (partial unique index semantics).
#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unless: Option<(&'static str, &'static str)>,
    pub only_if_null: Option<&'static str>,
}

const VISITOR_KEYS: &[UniqueKey] = &[
    UniqueKey {
        name: VISITORS_PHONE_KEY,
        columns: &["phone"],
        unless: None,
        only_if_null: None,
    },
    // Visitors without a phone are identified by their normalized email
    UniqueKey {
        name: VISITORS_EMAIL_KEY,
        columns: &["email"],
        unless: None,
        only_if_null: Some("phone"),
    },
];

const REGISTRATION_KEYS: &[UniqueKey] = &[
    UniqueKey {
        name: REGISTRATIONS_CODE_KEY,
        columns: &["confirmation_code"],
        unless: None,
        only_if_null: None,
    },
    UniqueKey {
        name: REGISTRATIONS_ACTIVE_KEY,
        columns: &["visitor_id", "event_id"],
        unless: Some(("status", "cancelled")),
        only_if_null: None,
    },
];

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Events => "events",
            Table::Visitors => "visitors",
            Table::Registrations => "registrations",
        }
    }

    pub fn unique_keys(&self) -> &'static [UniqueKey] {
        match self {
            Table::Events => &[],
            Table::Visitors => VISITOR_KEYS,
            Table::Registrations => REGISTRATION_KEYS,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Conjunction of column equality conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::all().equals("id", id.to_string())
    }

    pub fn equals(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| record.get(column).unwrap_or(&Value::Null) == value)
    }
}

/// Sort order for `select_many`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self { column: column.to_string(), descending: false }
    }

    pub fn desc(column: &str) -> Self {
        Self { column: column.to_string(), descending: true }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("no matching row in {0}")]
    NotFound(&'static str),

    #[error("unique constraint {constraint} violated on {table}")]
    Conflict { table: &'static str, constraint: String },

    #[error("precondition failed updating {table} row {id}")]
    PreconditionFailed { table: &'static str, id: Uuid },

    #[error("store request timed out")]
    Timeout,

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed row: {0}")]
    Decode(String),

    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether the caller may retry the operation as is
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout | StoreError::Backend(_) | StoreError::PreconditionFailed { .. }
        )
    }

    pub fn is_conflict_on(&self, key: &str) -> bool {
        matches!(self, StoreError::Conflict { constraint, .. } if constraint == key)
    }
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// Tabular record store.
///
/// Every call may suspend on the remote service and may fail for
/// infrastructure reasons, independently of the request being valid.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a row. Fails with [`StoreError::Conflict`] on a unique key violation.
    async fn insert(&self, table: Table, record: Record) -> StoreResult<Record>;

    /// Fetch the first row matching `filter`, or [`StoreError::NotFound`].
    async fn select_one(&self, table: Table, filter: &Filter) -> StoreResult<Record>;

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<Order>,
    ) -> StoreResult<Vec<Record>>;

    /// Patch the row `id`. When `precondition` is given the row must match it
    /// at write time, otherwise [`StoreError::PreconditionFailed`] is returned
    /// and nothing is written.
    async fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Record,
        precondition: Option<Filter>,
    ) -> StoreResult<Record>;

    async fn delete(&self, table: Table, id: Uuid) -> StoreResult<()>;

    /// Cheap connectivity check
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Build the store adapter selected in configuration
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Postgres => {
            let store = postgres::PgStore::connect(config).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Rest => Arc::new(rest::RestStore::new(config)?),
        StoreBackend::Memory => Arc::new(memory::MemoryStore::new()),
    };
    tracing::info!(backend = ?config.backend, "record store ready");
    Ok(store)
}

/// Serialize a model into a row
pub fn to_record<T: Serialize>(value: &T) -> StoreResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Decode(format!("expected an object, got {}", other))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

/// Deserialize a row into a model
pub fn from_record<T: DeserializeOwned>(record: Record) -> StoreResult<T> {
    serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Read the `id` column of a row
pub fn record_id(record: &Record) -> Option<Uuid> {
    record
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}
