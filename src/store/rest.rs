//! Hosted database REST store (PostgREST dialect)
//!
//! Filters become `column=eq.value` query parameters, writes ask for
//! `Prefer: return=representation` so the stored row comes back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use super::{Filter, Order, Record, RecordStore, StoreError, StoreResult, Table};
use crate::config::StoreConfig;

const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StoreError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, table.name()));
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, table: Table, builder: RequestBuilder) -> StoreResult<Vec<Record>> {
        let response = builder.send().await.map_err(map_reqwest_error)?;
        read_rows(table, response).await
    }
}

/// Render a filter value the way PostgREST expects it after `eq.`
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|(column, value)| {
            let op = match value {
                Value::Null => "is.null".to_string(),
                v => format!("eq.{}", scalar_text(v)),
            };
            (column.clone(), op)
        })
        .collect()
}

/// Pull the constraint name out of a PostgreSQL duplicate-key message
fn constraint_name(message: &str) -> Option<String> {
    let start = message.find("constraint \"")? + "constraint \"".len();
    let end = message[start..].find('"')?;
    Some(message[start..start + end].to_string())
}

fn map_reqwest_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Backend(err.to_string())
    }
}

async fn read_rows(table: Table, response: Response) -> StoreResult<Vec<Record>> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(StoreError::Conflict {
            table: table.name(),
            constraint: constraint_name(message).unwrap_or_else(|| "unique".to_string()),
        });
    }
    if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
        return Err(StoreError::Timeout);
    }
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Rejected(format!("{}: {}", status, body)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Backend(format!("{}: {}", status, body)));
    }

    let rows: Vec<Value> = response.json().await.map_err(map_reqwest_error)?;
    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Decode(format!("expected a row object, got {}", other))),
        })
        .collect()
}

#[async_trait]
impl RecordStore for RestStore {
    async fn insert(&self, table: Table, record: Record) -> StoreResult<Record> {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&Value::Object(record));
        self.send(table, builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> StoreResult<Record> {
        let builder = self
            .request(Method::GET, table)
            .query(&filter_params(filter))
            .query(&[("limit", "1")]);
        self.send(table, builder)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound(table.name()))
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<Order>,
    ) -> StoreResult<Vec<Record>> {
        let mut builder = self.request(Method::GET, table).query(&filter_params(filter));
        if let Some(order) = order {
            let direction = if order.descending { "desc" } else { "asc" };
            builder = builder.query(&[("order", format!("{}.{}", order.column, direction))]);
        }
        self.send(table, builder).await
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
        let mut guard = Filter::by_id(id);
        if let Some(precondition) = precondition {
            for (column, value) in precondition.conditions() {
                guard = guard.equals(column, value.clone());
            }
        }
        let builder = self
            .request(Method::PATCH, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&filter_params(&guard))
            .json(&Value::Object(patch));

        if let Some(row) = self.send(table, builder).await?.into_iter().next() {
            return Ok(row);
        }
        match self.select_one(table, &Filter::by_id(id)).await {
            Ok(_) => Err(StoreError::PreconditionFailed { table: table.name(), id }),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, table: Table, id: Uuid) -> StoreResult<()> {
        let builder = self
            .request(Method::DELETE, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&filter_params(&Filter::by_id(id)));
        if self.send(table, builder).await?.is_empty() {
            return Err(StoreError::NotFound(table.name()));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let builder = self.request(Method::GET, Table::Events).query(&[("limit", "0")]);
        self.send(Table::Events, builder).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_params() {
        let filter = Filter::all()
            .equals("phone", "+33 6 12")
            .equals("capacity", 40)
            .equals("email", Value::Null);
        assert_eq!(
            filter_params(&filter),
            vec![
                ("phone".to_string(), "eq.+33 6 12".to_string()),
                ("capacity".to_string(), "eq.40".to_string()),
                ("email".to_string(), "is.null".to_string()),
            ]
        );
    }

    #[test]
    fn test_constraint_name() {
        let message = "duplicate key value violates unique constraint \"visitors_phone_key\"";
        assert_eq!(constraint_name(message), Some("visitors_phone_key".to_string()));
        assert_eq!(constraint_name("something else"), None);
    }
}
