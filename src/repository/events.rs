//! Events repository

use std::sync::Arc;

use uuid::Uuid;

use super::not_found;
use crate::{
    error::AppResult,
    models::event::Event,
    store::{from_record, to_record, Filter, Order, Record, RecordStore, Table},
};

#[derive(Clone)]
pub struct EventsRepository {
    store: Arc<dyn RecordStore>,
}

impl EventsRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// List events, optionally restricted to one category, by date
    pub async fn list(&self, category: Option<&str>) -> AppResult<Vec<Event>> {
        let filter = match category {
            Some(category) => Filter::all().equals("category", category),
            None => Filter::all(),
        };
        let rows = self
            .store
            .select_many(Table::Events, &filter, Some(Order::asc("event_date")))
            .await?;
        let events = rows
            .into_iter()
            .map(from_record::<Event>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Get event by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Event> {
        let record = self
            .store
            .select_one(Table::Events, &Filter::by_id(id))
            .await
            .map_err(|e| not_found(e, || format!("Event {} not found", id)))?;
        Ok(from_record(record)?)
    }

    /// Create an event
    pub async fn create(&self, event: &Event) -> AppResult<Event> {
        let record = self.store.insert(Table::Events, to_record(event)?).await?;
        Ok(from_record(record)?)
    }

    /// Apply a column patch to an event
    pub async fn update(&self, id: Uuid, patch: Record) -> AppResult<Event> {
        let record = self
            .store
            .update(Table::Events, id, patch, None)
            .await
            .map_err(|e| not_found(e, || format!("Event {} not found", id)))?;
        Ok(from_record(record)?)
    }

    /// Delete an event
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.store
            .delete(Table::Events, id)
            .await
            .map_err(|e| not_found(e, || format!("Event {} not found", id)))
    }

    /// Set the registration counter of `observed` to `new`, only if neither
    /// the counter nor its version moved since `observed` was read.
    ///
    /// A stale read surfaces as `StoreError::PreconditionFailed`.
    pub async fn swap_registration_count(&self, observed: &Event, new: i32) -> AppResult<Event> {
        let mut patch = Record::new();
        patch.insert("registration_count".to_string(), new.into());
        patch.insert("counter_version".to_string(), (observed.counter_version + 1).into());
        let precondition = Filter::all()
            .equals("registration_count", observed.registration_count)
            .equals("counter_version", observed.counter_version);

        let record = self
            .store
            .update(Table::Events, observed.id, patch, Some(precondition))
            .await
            .map_err(|e| not_found(e, || format!("Event {} not found", observed.id)))?;
        Ok(from_record(record)?)
    }
}
