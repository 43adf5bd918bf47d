//! Visitors repository

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::{find_one, not_found};
use crate::{
    error::AppResult,
    models::visitor::Visitor,
    store::{from_record, to_record, Filter, RecordStore, Table},
};

#[derive(Clone)]
pub struct VisitorsRepository {
    store: Arc<dyn RecordStore>,
}

impl VisitorsRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Visitor> {
        let record = self
            .store
            .select_one(Table::Visitors, &Filter::by_id(id))
            .await
            .map_err(|e| not_found(e, || format!("Visitor {} not found", id)))?;
        Ok(from_record(record)?)
    }

    /// Find a returning visitor by normalized phone number
    pub async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Visitor>> {
        let filter = Filter::all().equals("phone", phone);
        Ok(find_one(self.store.as_ref(), Table::Visitors, &filter).await?)
    }

    /// Find a visitor registered without a phone by normalized email
    pub async fn find_phoneless_by_email(&self, email: &str) -> AppResult<Option<Visitor>> {
        let filter = Filter::all().equals("email", email).equals("phone", Value::Null);
        Ok(find_one(self.store.as_ref(), Table::Visitors, &filter).await?)
    }

    /// Insert a visitor. A duplicate phone, or a duplicate email among
    /// visitors without a phone, surfaces as a store conflict.
    pub async fn create(&self, visitor: &Visitor) -> AppResult<Visitor> {
        let record = self.store.insert(Table::Visitors, to_record(visitor)?).await?;
        Ok(from_record(record)?)
    }
}
